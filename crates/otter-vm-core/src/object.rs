//! Object storage
//!
//! Objects live in the [`Runtime`](crate::Runtime) heap and are addressed by
//! [`ObjectId`]. Slot and element layout mirrors what stub code assumes:
//! byte offsets into the fixed-slot area start after a two-word header, and
//! dynamic-slot offsets are relative to the out-of-line slot vector.

use bitflags::bitflags;

use crate::function::FunctionData;
use crate::proxy::ProxyData;
use crate::realm::RealmId;
use crate::shape::ShapeId;
use crate::types::GroupId;
use crate::value::Value;

/// Handle to a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ObjectId(u32);

impl ObjectId {
    /// Create from a heap index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Heap index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Handle to a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ClassId(u32);

impl ClassId {
    /// Ordinary objects
    pub const PLAIN_OBJECT: ClassId = ClassId(0);
    /// Arrays
    pub const ARRAY: ClassId = ClassId(1);
    /// Functions
    pub const FUNCTION: ClassId = ClassId(2);
    /// Proxies
    pub const PROXY: ClassId = ClassId(3);
    /// Mapped arguments objects
    pub const MAPPED_ARGUMENTS: ClassId = ClassId(4);
    /// Unmapped arguments objects
    pub const UNMAPPED_ARGUMENTS: ClassId = ClassId(5);

    /// Create from a class-table index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Class-table index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

bitflags! {
    /// Class flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassFlags: u8 {
        /// Instances are proxies
        const IS_PROXY = 1 << 0;
        /// Instances are DOM objects
        const IS_DOM = 1 << 1;
        /// Instances are callable
        const IS_CALLABLE = 1 << 2;
    }
}

/// A registered class.
#[derive(Debug, Clone)]
pub struct ClassData {
    /// Class name
    pub name: String,
    /// Flags
    pub flags: ClassFlags,
}

bitflags! {
    /// Flags stored in the elements header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ElementsFlags: u8 {
        /// Some element below the initialized length may be a hole
        const NON_PACKED = 1 << 0;
        /// Elements may not be added
        const NOT_EXTENSIBLE = 1 << 1;
    }
}

/// Dense elements.
///
/// `values.len()` is the initialized length. Holes are the
/// `ElementsHole` magic value.
#[derive(Debug, Clone, Default)]
pub struct Elements {
    /// Initialized elements
    pub values: Vec<Value>,
    /// Allocated capacity
    pub capacity: u32,
    /// Array `length` (arrays only)
    pub length: u32,
    /// Header flags
    pub flags: ElementsFlags,
}

impl Elements {
    /// Initialized length.
    #[inline]
    pub fn initialized_length(&self) -> u32 {
        self.values.len() as u32
    }

    /// Whether no element below the initialized length is a hole.
    #[inline]
    pub fn is_packed(&self) -> bool {
        !self.flags.contains(ElementsFlags::NON_PACKED)
    }
}

/// Kind-specific object payload.
#[derive(Clone)]
pub enum ObjectKind {
    /// Plain object or array
    Ordinary,
    /// Function
    Function(FunctionData),
    /// Proxy
    Proxy(ProxyData),
}

impl std::fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Ordinary => f.write_str("Ordinary"),
            ObjectKind::Function(fun) => write!(f, "Function({:?}, nargs={})", fun.kind, fun.nargs),
            ObjectKind::Proxy(_) => f.write_str("Proxy"),
        }
    }
}

/// A heap object.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// Shape
    pub shape: ShapeId,
    /// Type-inference group
    pub group: GroupId,
    /// Realm the object was created in
    pub realm: RealmId,
    /// Inline slots (length == shape's fixed-slot count)
    pub fixed_slots: Vec<Value>,
    /// Out-of-line slots (length == allocated capacity)
    pub dynamic_slots: Vec<Value>,
    /// Dense elements
    pub elements: Elements,
    /// Kind-specific payload
    pub kind: ObjectKind,
    /// Allocated in the nursery and not yet tenured
    pub in_nursery: bool,
}

impl ObjectData {
    /// Function payload.
    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(fun) => Some(fun),
            _ => None,
        }
    }

    /// Proxy payload.
    pub fn as_proxy(&self) -> Option<&ProxyData> {
        match &self.kind {
            ObjectKind::Proxy(proxy) => Some(proxy),
            _ => None,
        }
    }
}

/// Slot byte-offset arithmetic shared by stub generators and consumers.
pub mod layout {
    /// Byte offset of fixed slot 0 (after the shape and group words).
    pub const FIXED_SLOTS_START: u32 = 16;
    /// Size of one slot.
    pub const SLOT_SIZE: u32 = 8;

    /// Byte offset of fixed slot `slot`.
    #[inline]
    pub const fn fixed_slot_offset(slot: u32) -> u32 {
        FIXED_SLOTS_START + slot * SLOT_SIZE
    }

    /// Fixed slot index for a byte offset.
    #[inline]
    pub const fn fixed_slot_index(offset: u32) -> usize {
        ((offset - FIXED_SLOTS_START) / SLOT_SIZE) as usize
    }

    /// Byte offset of dynamic slot `index` (relative to the slot vector).
    #[inline]
    pub const fn dynamic_slot_offset(index: u32) -> u32 {
        index * SLOT_SIZE
    }

    /// Dynamic slot index for a byte offset.
    #[inline]
    pub const fn dynamic_slot_index(offset: u32) -> usize {
        (offset / SLOT_SIZE) as usize
    }
}
