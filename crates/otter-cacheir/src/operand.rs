//! Operand ids
//!
//! Operands are numbered in definition order. Each typed id is a view of the
//! same number: a guard that narrows `ValOperandId(3)` to an object hands
//! back `ObjOperandId(3)`, and both backends update what lives under 3.

use serde::{Deserialize, Serialize};

/// Static type of an operand, as far as CacheIR knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandType {
    /// Any boxed value
    Value,
    /// Object
    Object,
    /// String
    String,
    /// Symbol
    Symbol,
    /// BigInt
    BigInt,
    /// Boolean
    Boolean,
    /// Int32
    Int32,
    /// Int32 or double
    Number,
}

impl OperandType {
    /// Name for diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Value => "Value",
            Self::Object => "Object",
            Self::String => "String",
            Self::Symbol => "Symbol",
            Self::BigInt => "BigInt",
            Self::Boolean => "Boolean",
            Self::Int32 => "Int32",
            Self::Number => "Number",
        }
    }

    /// Whether an operand known to be `self` may be used where `wanted` is
    /// expected.
    pub const fn satisfies(self, wanted: OperandType) -> bool {
        match wanted {
            OperandType::Value => true,
            OperandType::Number => matches!(self, OperandType::Number | OperandType::Int32),
            _ => self as u8 == wanted as u8,
        }
    }
}

/// Common behaviour of typed operand ids.
pub trait OperandIdType: Copy {
    /// Type this id view asserts.
    const TYPE: OperandType;

    /// View a raw id.
    fn from_raw(id: u16) -> Self;

    /// Raw id.
    fn raw(self) -> u16;
}

macro_rules! define_operand_id {
    ($(#[$meta:meta])* $name:ident => $ty:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u16);

        impl $name {
            /// Create from a raw id.
            #[inline]
            pub const fn new(id: u16) -> Self {
                Self(id)
            }

            /// Raw id.
            #[inline]
            pub const fn id(self) -> u16 {
                self.0
            }
        }

        impl OperandIdType for $name {
            const TYPE: OperandType = OperandType::$ty;

            #[inline]
            fn from_raw(id: u16) -> Self {
                Self(id)
            }

            #[inline]
            fn raw(self) -> u16 {
                self.0
            }
        }

        impl From<$name> for TypedOperandId {
            fn from(id: $name) -> Self {
                TypedOperandId {
                    id: id.0,
                    ty: OperandType::$ty,
                }
            }
        }
    };
}

define_operand_id!(
    /// Boxed value operand
    ValOperandId => Value
);
define_operand_id!(
    /// Object operand
    ObjOperandId => Object
);
define_operand_id!(
    /// String operand
    StringOperandId => String
);
define_operand_id!(
    /// Symbol operand
    SymbolOperandId => Symbol
);
define_operand_id!(
    /// BigInt operand
    BigIntOperandId => BigInt
);
define_operand_id!(
    /// Boolean operand
    BooleanOperandId => Boolean
);
define_operand_id!(
    /// Int32 operand
    Int32OperandId => Int32
);
define_operand_id!(
    /// Int32-or-double operand
    NumberOperandId => Number
);

/// An operand id together with the type it is used at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypedOperandId {
    /// Raw id
    pub id: u16,
    /// Type
    pub ty: OperandType,
}

macro_rules! impl_as_value {
    ($($name:ident),*) => {
        $(
            impl $name {
                /// The same operand viewed as a boxed value.
                #[inline]
                pub const fn as_value(self) -> ValOperandId {
                    ValOperandId(self.0)
                }
            }
        )*
    };
}

impl_as_value!(
    ObjOperandId,
    StringOperandId,
    SymbolOperandId,
    BigIntOperandId,
    BooleanOperandId,
    Int32OperandId,
    NumberOperandId
);

impl Int32OperandId {
    /// The same operand viewed as a number.
    #[inline]
    pub const fn as_number(self) -> NumberOperandId {
        NumberOperandId(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_satisfies() {
        assert!(OperandType::Int32.satisfies(OperandType::Number));
        assert!(OperandType::Object.satisfies(OperandType::Value));
        assert!(!OperandType::Value.satisfies(OperandType::Object));
        assert!(!OperandType::Number.satisfies(OperandType::Int32));
    }

    #[test]
    fn test_typed_views_share_ids() {
        let v = ValOperandId::new(2);
        let o = ObjOperandId::from_raw(v.raw());
        assert_eq!(o.as_value(), v);
        assert_eq!(TypedOperandId::from(o).ty, OperandType::Object);
    }
}
