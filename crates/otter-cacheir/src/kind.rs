//! Cache kinds and stub engines

use serde::{Deserialize, Serialize};

use crate::operand::OperandType;

/// Which IC a CacheIR program was generated for. Fixes the number and
/// types of the program's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum CacheKind {
    /// `obj.name`
    GetProp,
    /// `obj[key]`
    GetElem,
    /// Unqualified name lookup
    GetName,
    /// `obj.name = rhs`
    SetProp,
    /// `obj[key] = rhs`
    SetElem,
    /// `obj.hasOwnProperty(key)`
    HasOwn,
    /// `key in obj`
    In,
    /// `callee(...)`
    Call,
    /// `lhs <op> rhs`
    Compare,
    /// `!!v`
    ToBool,
    /// `-v`, `~v`, `++v`, `--v`
    UnaryArith,
    /// `lhs <op> rhs` arithmetic
    BinaryArith,
    /// `typeof v`
    TypeOf,
    /// Intrinsic lookup
    GetIntrinsic,
}

impl CacheKind {
    /// Every kind.
    pub const ALL: [CacheKind; 14] = [
        CacheKind::GetProp,
        CacheKind::GetElem,
        CacheKind::GetName,
        CacheKind::SetProp,
        CacheKind::SetElem,
        CacheKind::HasOwn,
        CacheKind::In,
        CacheKind::Call,
        CacheKind::Compare,
        CacheKind::ToBool,
        CacheKind::UnaryArith,
        CacheKind::BinaryArith,
        CacheKind::TypeOf,
        CacheKind::GetIntrinsic,
    ];

    /// Number of input operands.
    pub const fn num_inputs(self) -> usize {
        match self {
            CacheKind::GetIntrinsic => 0,
            CacheKind::GetProp
            | CacheKind::GetName
            | CacheKind::Call
            | CacheKind::ToBool
            | CacheKind::UnaryArith
            | CacheKind::TypeOf => 1,
            CacheKind::GetElem
            | CacheKind::SetProp
            | CacheKind::HasOwn
            | CacheKind::In
            | CacheKind::Compare
            | CacheKind::BinaryArith => 2,
            CacheKind::SetElem => 3,
        }
    }

    /// Static type of input `index`. Call's single input is the argument
    /// count; everything else starts out as a boxed value.
    pub const fn input_type(self, index: usize) -> OperandType {
        match (self, index) {
            (CacheKind::Call, 0) => OperandType::Int32,
            (CacheKind::GetName, 0) => OperandType::Object,
            _ => OperandType::Value,
        }
    }

    /// Whether stubs of this kind write to the heap.
    pub const fn is_set(self) -> bool {
        matches!(self, CacheKind::SetProp | CacheKind::SetElem)
    }

    /// Name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            CacheKind::GetProp => "GetProp",
            CacheKind::GetElem => "GetElem",
            CacheKind::GetName => "GetName",
            CacheKind::SetProp => "SetProp",
            CacheKind::SetElem => "SetElem",
            CacheKind::HasOwn => "HasOwn",
            CacheKind::In => "In",
            CacheKind::Call => "Call",
            CacheKind::Compare => "Compare",
            CacheKind::ToBool => "ToBool",
            CacheKind::UnaryArith => "UnaryArith",
            CacheKind::BinaryArith => "BinaryArith",
            CacheKind::TypeOf => "TypeOf",
            CacheKind::GetIntrinsic => "GetIntrinsic",
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which tier a stub is compiled for. Part of the stub-code cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ICStubEngine {
    /// Baseline IC stubs
    Baseline,
    /// Optimizing-tier IC stubs
    IonIC,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_counts() {
        assert_eq!(CacheKind::SetElem.num_inputs(), 3);
        assert_eq!(CacheKind::Call.num_inputs(), 1);
        assert_eq!(CacheKind::Call.input_type(0), OperandType::Int32);
        assert_eq!(CacheKind::GetIntrinsic.num_inputs(), 0);
        assert!(CacheKind::ALL.iter().filter(|k| k.is_set()).count() == 2);
    }
}
