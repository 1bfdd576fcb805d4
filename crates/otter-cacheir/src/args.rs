//! Argument kinds and their encodings
//!
//! Every opcode argument is one of a closed set of kinds. Operand ids and
//! stub-field references take one byte; stub fields are referenced by word
//! index and surfaced to handlers as byte offsets into the stub data.
//! Small enums take one byte, 32-bit immediates four.

use otter_vm_core::{
    ClassId, GroupId, ObjectId, PropertyKey, ShapeId, StringId, SymbolId, Value, ValueType,
};

use crate::error::{CacheIRError, Result};
use crate::flags::{CallFlags, GuardClassKind, JSOp, UnaryMathFunction};
use crate::operand::{
    BigIntOperandId, BooleanOperandId, Int32OperandId, NumberOperandId, ObjOperandId,
    OperandIdType, OperandType, StringOperandId, SymbolOperandId, ValOperandId,
};
use crate::stub_info::StubFieldType;

/// Kind of one opcode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    /// Value operand
    ValId,
    /// Object operand
    ObjId,
    /// String operand
    StrId,
    /// Symbol operand
    SymId,
    /// BigInt operand
    BigIntId,
    /// Boolean operand
    BoolId,
    /// Int32 operand
    Int32Id,
    /// Number operand
    NumId,
    /// Shape stub field
    ShapeField,
    /// Group stub field
    GroupField,
    /// Object stub field
    ObjectField,
    /// Class stub field
    ClassField,
    /// Atom stub field
    StringField,
    /// Symbol stub field
    SymbolField,
    /// Raw 32-bit stub field (offsets, counts)
    RawWordField,
    /// Raw 64-bit stub field
    RawInt64Field,
    /// Boxed value stub field
    ValueField,
    /// Property key stub field
    IdField,
    /// One-byte immediate
    Byte,
    /// Boolean immediate
    Bool,
    /// Signed 32-bit immediate
    Int32Imm,
    /// Unsigned 32-bit immediate
    UInt32Imm,
    /// Comparison operator
    JSOp,
    /// Builtin class kind
    GuardClassKind,
    /// Value type tag
    ValueType,
    /// Call flags
    CallFlags,
    /// Math function
    MathFunction,
}

impl ArgKind {
    /// Operand type, for operand-id arguments.
    pub const fn operand_type(self) -> Option<OperandType> {
        Some(match self {
            ArgKind::ValId => OperandType::Value,
            ArgKind::ObjId => OperandType::Object,
            ArgKind::StrId => OperandType::String,
            ArgKind::SymId => OperandType::Symbol,
            ArgKind::BigIntId => OperandType::BigInt,
            ArgKind::BoolId => OperandType::Boolean,
            ArgKind::Int32Id => OperandType::Int32,
            ArgKind::NumId => OperandType::Number,
            _ => return None,
        })
    }

    /// Stub-field type, for stub-field arguments.
    pub const fn field_type(self) -> Option<StubFieldType> {
        Some(match self {
            ArgKind::ShapeField => StubFieldType::Shape,
            ArgKind::GroupField => StubFieldType::Group,
            ArgKind::ObjectField => StubFieldType::Object,
            ArgKind::ClassField => StubFieldType::Class,
            ArgKind::StringField => StubFieldType::String,
            ArgKind::SymbolField => StubFieldType::Symbol,
            ArgKind::RawWordField => StubFieldType::RawWord,
            ArgKind::RawInt64Field => StubFieldType::RawInt64,
            ArgKind::ValueField => StubFieldType::Value,
            ArgKind::IdField => StubFieldType::Id,
            _ => return None,
        })
    }

    /// Encoded size in the opcode stream.
    pub const fn encoded_len(self) -> usize {
        match self {
            ArgKind::Int32Imm | ArgKind::UInt32Imm => 4,
            _ => 1,
        }
    }
}

/// Conversion of a writer argument to its raw bits.
pub trait ArgBits {
    /// Raw bits: operand id, stub-field payload or immediate.
    fn into_arg_bits(self) -> u64;
}

/// Conversion of decoded raw bits to a handler argument.
pub trait FromArgBits: Sized {
    /// Convert, rejecting out-of-range enum immediates.
    fn from_arg_bits(bits: u64) -> Result<Self>;
}

macro_rules! impl_operand_arg {
    ($($ty:ty),*) => {
        $(
            impl ArgBits for $ty {
                #[inline]
                fn into_arg_bits(self) -> u64 {
                    self.raw() as u64
                }
            }

            impl FromArgBits for $ty {
                #[inline]
                fn from_arg_bits(bits: u64) -> Result<Self> {
                    Ok(<$ty>::from_raw(bits as u16))
                }
            }
        )*
    };
}

impl_operand_arg!(
    ValOperandId,
    ObjOperandId,
    StringOperandId,
    SymbolOperandId,
    BigIntOperandId,
    BooleanOperandId,
    Int32OperandId,
    NumberOperandId
);

macro_rules! impl_index_arg {
    ($($ty:ty),*) => {
        $(
            impl ArgBits for $ty {
                #[inline]
                fn into_arg_bits(self) -> u64 {
                    self.index() as u64
                }
            }
        )*
    };
}

impl_index_arg!(ShapeId, GroupId, ObjectId, ClassId, StringId, SymbolId);

impl ArgBits for u8 {
    fn into_arg_bits(self) -> u64 {
        self as u64
    }
}

impl FromArgBits for u8 {
    fn from_arg_bits(bits: u64) -> Result<Self> {
        Ok(bits as u8)
    }
}

impl ArgBits for bool {
    fn into_arg_bits(self) -> u64 {
        self as u64
    }
}

impl FromArgBits for bool {
    fn from_arg_bits(bits: u64) -> Result<Self> {
        match bits {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(CacheIRError::InvalidImmediate {
                what: "bool",
                byte: bits as u8,
            }),
        }
    }
}

impl ArgBits for i32 {
    fn into_arg_bits(self) -> u64 {
        self as u32 as u64
    }
}

impl FromArgBits for i32 {
    fn from_arg_bits(bits: u64) -> Result<Self> {
        Ok(bits as u32 as i32)
    }
}

impl ArgBits for u32 {
    fn into_arg_bits(self) -> u64 {
        self as u64
    }
}

impl FromArgBits for u32 {
    fn from_arg_bits(bits: u64) -> Result<Self> {
        Ok(bits as u32)
    }
}

impl ArgBits for u64 {
    fn into_arg_bits(self) -> u64 {
        self
    }
}

impl ArgBits for Value {
    fn into_arg_bits(self) -> u64 {
        self.to_bits()
    }
}

impl ArgBits for PropertyKey {
    fn into_arg_bits(self) -> u64 {
        self.to_bits()
    }
}

macro_rules! impl_enum_arg {
    ($($ty:ty => $what:literal, $encode:expr, $decode:expr;)*) => {
        $(
            impl ArgBits for $ty {
                fn into_arg_bits(self) -> u64 {
                    let encode: fn($ty) -> u8 = $encode;
                    encode(self) as u64
                }
            }

            impl FromArgBits for $ty {
                fn from_arg_bits(bits: u64) -> Result<Self> {
                    let decode: fn(u8) -> Option<$ty> = $decode;
                    decode(bits as u8).ok_or(CacheIRError::InvalidImmediate {
                        what: $what,
                        byte: bits as u8,
                    })
                }
            }
        )*
    };
}

impl_enum_arg! {
    JSOp => "JSOp", |op| op as u8, JSOp::from_u8;
    GuardClassKind => "GuardClassKind", |kind| kind as u8, GuardClassKind::from_u8;
    ValueType => "ValueType", |ty| ty as u8, ValueType::from_u8;
    CallFlags => "CallFlags", CallFlags::to_byte, CallFlags::from_byte;
    UnaryMathFunction => "MathFunction", |fun| fun as u8, UnaryMathFunction::from_u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::ArgFormat;

    #[test]
    fn test_enum_immediates_are_checked() {
        assert_eq!(JSOp::from_arg_bits(JSOp::Ge.into_arg_bits()), Ok(JSOp::Ge));
        assert!(matches!(
            JSOp::from_arg_bits(99),
            Err(CacheIRError::InvalidImmediate { what: "JSOp", .. })
        ));
        let flags = CallFlags::new(ArgFormat::FunCall);
        assert_eq!(CallFlags::from_arg_bits(flags.into_arg_bits()), Ok(flags));
        assert!(bool::from_arg_bits(2).is_err());
    }

    #[test]
    fn test_negative_int32_immediate() {
        assert_eq!(i32::from_arg_bits((-7i32).into_arg_bits()), Ok(-7));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(ArgKind::NumId.operand_type(), Some(OperandType::Number));
        assert_eq!(ArgKind::IdField.field_type(), Some(StubFieldType::Id));
        assert_eq!(ArgKind::Int32Imm.encoded_len(), 4);
        assert!(ArgKind::Byte.field_type().is_none());
    }
}
