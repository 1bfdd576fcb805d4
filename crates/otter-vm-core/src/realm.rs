//! Realms and the activation stack

use crate::object::ObjectId;

/// Handle to a realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RealmId(u32);

impl RealmId {
    /// Create from a realm-table index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Realm-table index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// A realm.
#[derive(Debug, Clone)]
pub struct RealmData {
    /// Debug name
    pub name: String,
}

/// What pushed an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A Baseline IC stub that is about to call out. `pc` is the IC site.
    BaselineStub {
        /// Bytecode offset of the IC site
        pc: u32,
    },
    /// An effectful call made from Warp code. `resume_pc` is the
    /// bytecode offset of the call's resume point.
    WarpCall {
        /// Bytecode offset the resume point resumes after
        resume_pc: u32,
    },
    /// A scripted function body.
    Scripted {
        /// Callee
        callee: ObjectId,
    },
    /// A native function body.
    Native {
        /// Callee
        callee: ObjectId,
    },
}

/// One activation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Kind
    pub kind: FrameKind,
    /// Realm that was current when the frame was pushed
    pub realm: RealmId,
}
