//! Immediate operand types: call flags, comparison ops, class kinds, math
//! functions

use otter_vm_core::ClassId;
use serde::{Deserialize, Serialize};

/// How a call site passes its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ArgFormat {
    /// Not known (never written by a valid generator)
    Unknown = 0,
    /// `f(a, b)`
    Standard = 1,
    /// `f(...arr)`
    Spread = 2,
    /// `f.call(this, a, b)`
    FunCall = 3,
    /// `f.apply(this, arguments)`
    FunApplyArgs = 4,
    /// `f.apply(this, array)`
    FunApplyArray = 5,
}

impl ArgFormat {
    /// Decode the low bits of a [`CallFlags`] byte.
    pub const fn from_u8(bits: u8) -> Option<Self> {
        Some(match bits {
            0 => Self::Unknown,
            1 => Self::Standard,
            2 => Self::Spread,
            3 => Self::FunCall,
            4 => Self::FunApplyArgs,
            5 => Self::FunApplyArray,
            _ => return None,
        })
    }
}

/// Call-site flags, packed into one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallFlags {
    format: ArgFormat,
    is_constructing: bool,
    is_same_realm: bool,
}

impl CallFlags {
    const FORMAT_MASK: u8 = 0x7;
    const IS_CONSTRUCTING: u8 = 0x20;
    const IS_SAME_REALM: u8 = 0x40;

    /// Flags for a non-constructing call.
    pub const fn new(format: ArgFormat) -> Self {
        Self {
            format,
            is_constructing: false,
            is_same_realm: false,
        }
    }

    /// Flags for a `new` call.
    pub const fn constructing(format: ArgFormat) -> Self {
        Self {
            format,
            is_constructing: true,
            is_same_realm: false,
        }
    }

    /// Mark the callee as known to be in the caller's realm.
    pub const fn with_same_realm(mut self) -> Self {
        self.is_same_realm = true;
        self
    }

    /// Argument format.
    pub const fn arg_format(self) -> ArgFormat {
        self.format
    }

    /// Whether this is a `new` call.
    pub const fn is_constructing(self) -> bool {
        self.is_constructing
    }

    /// Whether no realm switch is needed.
    pub const fn is_same_realm(self) -> bool {
        self.is_same_realm
    }

    /// Encoded byte.
    pub const fn to_byte(self) -> u8 {
        let mut bits = self.format as u8;
        if self.is_constructing {
            bits |= Self::IS_CONSTRUCTING;
        }
        if self.is_same_realm {
            bits |= Self::IS_SAME_REALM;
        }
        bits
    }

    /// Decode a byte written by [`CallFlags::to_byte`].
    pub const fn from_byte(byte: u8) -> Option<Self> {
        let Some(format) = ArgFormat::from_u8(byte & Self::FORMAT_MASK) else {
            return None;
        };
        Some(Self {
            format,
            is_constructing: byte & Self::IS_CONSTRUCTING != 0,
            is_same_realm: byte & Self::IS_SAME_REALM != 0,
        })
    }
}

/// Comparison operator of a compare IC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum JSOp {
    /// `==`
    Eq = 0,
    /// `!=`
    Ne = 1,
    /// `===`
    StrictEq = 2,
    /// `!==`
    StrictNe = 3,
    /// `<`
    Lt = 4,
    /// `<=`
    Le = 5,
    /// `>`
    Gt = 6,
    /// `>=`
    Ge = 7,
}

impl JSOp {
    /// Decode.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Eq,
            1 => Self::Ne,
            2 => Self::StrictEq,
            3 => Self::StrictNe,
            4 => Self::Lt,
            5 => Self::Le,
            6 => Self::Gt,
            7 => Self::Ge,
            _ => return None,
        })
    }

    /// Whether the result is true when the operands are equal.
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::StrictEq)
    }

    /// Evaluate the operator on an ordering result. `None` means unordered
    /// (a NaN was involved).
    pub fn eval(self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        match (self, ordering) {
            (Self::Ne | Self::StrictNe, None) => true,
            (_, None) => false,
            (Self::Eq | Self::StrictEq, Some(o)) => o == Equal,
            (Self::Ne | Self::StrictNe, Some(o)) => o != Equal,
            (Self::Lt, Some(o)) => o == Less,
            (Self::Le, Some(o)) => o != Greater,
            (Self::Gt, Some(o)) => o == Greater,
            (Self::Ge, Some(o)) => o != Less,
        }
    }
}

/// Builtin classes `GuardClass` can test without a stub field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GuardClassKind {
    /// Arrays
    Array = 0,
    /// Plain objects
    PlainObject = 1,
    /// Mapped arguments objects
    MappedArguments = 2,
    /// Unmapped arguments objects
    UnmappedArguments = 3,
    /// Functions
    JSFunction = 4,
}

impl GuardClassKind {
    /// Decode.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Array,
            1 => Self::PlainObject,
            2 => Self::MappedArguments,
            3 => Self::UnmappedArguments,
            4 => Self::JSFunction,
            _ => return None,
        })
    }

    /// The class this kind stands for.
    pub const fn class_id(self) -> ClassId {
        match self {
            Self::Array => ClassId::ARRAY,
            Self::PlainObject => ClassId::PLAIN_OBJECT,
            Self::MappedArguments => ClassId::MAPPED_ARGUMENTS,
            Self::UnmappedArguments => ClassId::UNMAPPED_ARGUMENTS,
            Self::JSFunction => ClassId::FUNCTION,
        }
    }
}

/// `Math` functions with a double-to-double fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UnaryMathFunction {
    /// `Math.sin`
    Sin = 0,
    /// `Math.cos`
    Cos = 1,
    /// `Math.tan`
    Tan = 2,
    /// `Math.log`
    Log = 3,
    /// `Math.exp`
    Exp = 4,
    /// `Math.atan`
    ATan = 5,
    /// `Math.cbrt`
    Cbrt = 6,
    /// `Math.floor`
    Floor = 7,
    /// `Math.ceil`
    Ceil = 8,
    /// `Math.trunc`
    Trunc = 9,
    /// `Math.round`
    Round = 10,
}

impl UnaryMathFunction {
    /// Decode.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Sin,
            1 => Self::Cos,
            2 => Self::Tan,
            3 => Self::Log,
            4 => Self::Exp,
            5 => Self::ATan,
            6 => Self::Cbrt,
            7 => Self::Floor,
            8 => Self::Ceil,
            9 => Self::Trunc,
            10 => Self::Round,
            _ => return None,
        })
    }

    /// Name as in `Math.<name>`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Log => "log",
            Self::Exp => "exp",
            Self::ATan => "atan",
            Self::Cbrt => "cbrt",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Trunc => "trunc",
            Self::Round => "round",
        }
    }

    /// Evaluate. Both tiers call this so they round identically.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Log => x.ln(),
            Self::Exp => x.exp(),
            Self::ATan => x.atan(),
            Self::Cbrt => x.cbrt(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Trunc => x.trunc(),
            Self::Round => js_round(x),
        }
    }
}

/// `Math.round`: halfway cases go towards +Infinity, and -0 survives.
fn js_round(x: f64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    if (-0.5..0.0).contains(&x) {
        return -0.0;
    }
    (x + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_flags_byte() {
        let flags = CallFlags::constructing(ArgFormat::Spread).with_same_realm();
        let byte = flags.to_byte();
        assert_eq!(byte, 0x62);
        assert_eq!(CallFlags::from_byte(byte), Some(flags));
        assert_eq!(CallFlags::from_byte(0x07), None);
    }

    #[test]
    fn test_jsop_eval_nan() {
        assert!(!JSOp::Lt.eval(None));
        assert!(JSOp::Ne.eval(None));
        assert!(JSOp::Le.eval(Some(std::cmp::Ordering::Equal)));
    }

    #[test]
    fn test_round() {
        let round = UnaryMathFunction::Round;
        assert_eq!(round.apply(2.5), 3.0);
        assert_eq!(round.apply(-2.5), -2.0);
        assert!(round.apply(-0.2).is_sign_negative());
        assert_eq!(round.apply(0.49999), 0.0);
    }
}
