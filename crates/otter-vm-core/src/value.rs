//! JavaScript values with NaN-boxing
//!
//! NaN-boxing encodes JS values in 64 bits using the IEEE 754 NaN space.
//! Stub code moves these words between registers, the machine stack and
//! object slots without knowing what they contain; guards inspect the tag.
//!
//! ## Encoding Scheme
//!
//! ```text
//! - Double:     stored directly (NaN canonicalized)
//! - NaN:        0x7FFA_0000_0000_0000 (canonical NaN, distinct from undefined)
//! - Undefined:  0x7FF8_0000_0000_0000
//! - Null:       0x7FF8_0000_0000_0001
//! - True:       0x7FF8_0000_0000_0002
//! - False:      0x7FF8_0000_0000_0003
//! - Int32:      0x7FF8_0001_XXXX_XXXX (32-bit signed in lower bits)
//! - Magic:      0x7FF8_0002_0000_00XX (JSWhyMagic in the low byte)
//! - Object:     0x7FFC_XXXX_XXXX_XXXX (heap index)
//! - String:     0x7FFD_XXXX_XXXX_XXXX
//! - Symbol:     0x7FFE_XXXX_XXXX_XXXX
//! - BigInt:     0x7FFF_XXXX_XXXX_XXXX
//! ```

use serde::{Deserialize, Serialize};

use crate::object::ObjectId;
use crate::string::{BigIntId, StringId, SymbolId};

const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

const TAG_UNDEFINED: u64 = 0x7FF8_0000_0000_0000;
const TAG_NULL: u64 = 0x7FF8_0000_0000_0001;
const TAG_TRUE: u64 = 0x7FF8_0000_0000_0002;
const TAG_FALSE: u64 = 0x7FF8_0000_0000_0003;
const TAG_INT32: u64 = 0x7FF8_0001_0000_0000;
const TAG_MAGIC: u64 = 0x7FF8_0002_0000_0000;
const TAG_NAN: u64 = 0x7FFA_0000_0000_0000;
const TAG_OBJECT: u64 = 0x7FFC_0000_0000_0000;
const TAG_STRING: u64 = 0x7FFD_0000_0000_0000;
const TAG_SYMBOL: u64 = 0x7FFE_0000_0000_0000;
const TAG_BIGINT: u64 = 0x7FFF_0000_0000_0000;

/// The dynamic type of a [`Value`], as seen by a tag test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    /// IEEE 754 double
    Double = 0,
    /// 32-bit signed integer
    Int32 = 1,
    /// `true` or `false`
    Boolean = 2,
    /// `undefined`
    Undefined = 3,
    /// `null`
    Null = 4,
    /// Engine-internal magic value
    Magic = 5,
    /// String
    String = 6,
    /// Symbol
    Symbol = 7,
    /// BigInt
    BigInt = 8,
    /// Object (including functions and proxies)
    Object = 9,
}

impl ValueType {
    /// Decode from the byte used in CacheIR streams.
    pub const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Double,
            1 => Self::Int32,
            2 => Self::Boolean,
            3 => Self::Undefined,
            4 => Self::Null,
            5 => Self::Magic,
            6 => Self::String,
            7 => Self::Symbol,
            8 => Self::BigInt,
            9 => Self::Object,
            _ => return None,
        })
    }

    /// Whether values of this type point into the GC heap.
    pub const fn is_gc_thing(self) -> bool {
        matches!(
            self,
            Self::String | Self::Symbol | Self::BigInt | Self::Object
        )
    }
}

/// Reasons for a magic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum JSWhyMagic {
    /// A hole in a dense elements vector
    ElementsHole = 0,
    /// `this` slot of a constructing call before the object exists
    IsConstructing = 1,
    /// Optimized-out value
    OptimizedOut = 2,
}

impl JSWhyMagic {
    const fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::ElementsHole,
            1 => Self::IsConstructing,
            2 => Self::OptimizedOut,
            _ => return None,
        })
    }
}

/// A JavaScript value using NaN-boxing.
///
/// Values are plain words: heap things are referenced by index into the
/// [`Runtime`](crate::Runtime) tables, so a value is `Copy` and can be
/// stored in stub data and machine registers as-is.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(u64);

impl Value {
    /// `undefined`
    pub const UNDEFINED: Value = Value(TAG_UNDEFINED);
    /// `null`
    pub const NULL: Value = Value(TAG_NULL);
    /// `true`
    pub const TRUE: Value = Value(TAG_TRUE);
    /// `false`
    pub const FALSE: Value = Value(TAG_FALSE);
    /// Canonical NaN
    pub const NAN: Value = Value(TAG_NAN);

    /// Reinterpret raw bits as a value.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Value(bits)
    }

    /// Raw bits of this value.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Box an int32.
    #[inline]
    pub const fn int32(n: i32) -> Self {
        Value(TAG_INT32 | (n as u32 as u64))
    }

    /// Box a double without changing its representation.
    #[inline]
    pub fn double(n: f64) -> Self {
        if n.is_nan() {
            Value(TAG_NAN)
        } else {
            Value(n.to_bits())
        }
    }

    /// Box a number, preferring the int32 representation when exact.
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && !(n == 0.0 && n.is_sign_negative())
        {
            Value::int32(n as i32)
        } else {
            Value::double(n)
        }
    }

    /// Box a boolean.
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        if b { Value(TAG_TRUE) } else { Value(TAG_FALSE) }
    }

    /// Box an object reference.
    #[inline]
    pub const fn object(id: ObjectId) -> Self {
        Value(TAG_OBJECT | (id.index() as u64 & PAYLOAD_MASK))
    }

    /// Box a string reference.
    #[inline]
    pub const fn string(id: StringId) -> Self {
        Value(TAG_STRING | (id.index() as u64 & PAYLOAD_MASK))
    }

    /// Box a symbol reference.
    #[inline]
    pub const fn symbol(id: SymbolId) -> Self {
        Value(TAG_SYMBOL | (id.index() as u64 & PAYLOAD_MASK))
    }

    /// Box a bigint reference.
    #[inline]
    pub const fn bigint(id: BigIntId) -> Self {
        Value(TAG_BIGINT | (id.index() as u64 & PAYLOAD_MASK))
    }

    /// Box a magic value.
    #[inline]
    pub const fn magic(why: JSWhyMagic) -> Self {
        Value(TAG_MAGIC | why as u64)
    }

    /// Rebuild a value from its type and unboxed payload word.
    ///
    /// Doubles carry their bits as the payload.
    pub fn from_payload(ty: ValueType, payload: u64) -> Self {
        match ty {
            ValueType::Double => Value::double(f64::from_bits(payload)),
            ValueType::Int32 => Value::int32(payload as u32 as i32),
            ValueType::Boolean => Value::boolean(payload != 0),
            ValueType::Undefined => Value::UNDEFINED,
            ValueType::Null => Value::NULL,
            ValueType::Magic => Value(TAG_MAGIC | (payload & 0xFF)),
            ValueType::String => Value(TAG_STRING | (payload & PAYLOAD_MASK)),
            ValueType::Symbol => Value(TAG_SYMBOL | (payload & PAYLOAD_MASK)),
            ValueType::BigInt => Value(TAG_BIGINT | (payload & PAYLOAD_MASK)),
            ValueType::Object => Value(TAG_OBJECT | (payload & PAYLOAD_MASK)),
        }
    }

    /// The unboxed payload word. Int32 payloads are zero-extended.
    pub fn payload(self) -> u64 {
        match self.value_type() {
            ValueType::Double => self.0,
            ValueType::Int32 => self.0 & 0xFFFF_FFFF,
            ValueType::Boolean => (self.0 == TAG_TRUE) as u64,
            ValueType::Undefined | ValueType::Null => 0,
            ValueType::Magic => self.0 & 0xFF,
            _ => self.0 & PAYLOAD_MASK,
        }
    }

    /// Tag test.
    pub fn value_type(self) -> ValueType {
        match self.0 >> 48 {
            0x7FF8 => match self.0 {
                TAG_UNDEFINED => ValueType::Undefined,
                TAG_NULL => ValueType::Null,
                TAG_TRUE | TAG_FALSE => ValueType::Boolean,
                bits if bits >> 32 == TAG_INT32 >> 32 => ValueType::Int32,
                bits if bits >> 32 == TAG_MAGIC >> 32 => ValueType::Magic,
                _ => ValueType::Double,
            },
            0x7FFC => ValueType::Object,
            0x7FFD => ValueType::String,
            0x7FFE => ValueType::Symbol,
            0x7FFF => ValueType::BigInt,
            _ => ValueType::Double,
        }
    }

    /// Is this `undefined`?
    #[inline]
    pub fn is_undefined(self) -> bool {
        self.0 == TAG_UNDEFINED
    }

    /// Is this `null`?
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == TAG_NULL
    }

    /// Is this `null` or `undefined`?
    #[inline]
    pub fn is_null_or_undefined(self) -> bool {
        self.is_null() || self.is_undefined()
    }

    /// Is this an int32 or a double?
    #[inline]
    pub fn is_number(self) -> bool {
        matches!(self.value_type(), ValueType::Int32 | ValueType::Double)
    }

    /// Is this an object?
    #[inline]
    pub fn is_object(self) -> bool {
        self.0 >> 48 == TAG_OBJECT >> 48
    }

    /// Is this the magic value `why`?
    #[inline]
    pub fn is_magic(self, why: JSWhyMagic) -> bool {
        self.0 == Value::magic(why).0
    }

    /// Int32 payload, if this is an int32.
    pub fn as_int32(self) -> Option<i32> {
        (self.value_type() == ValueType::Int32).then_some(self.0 as u32 as i32)
    }

    /// Double payload, if this is a double.
    pub fn as_double(self) -> Option<f64> {
        (self.value_type() == ValueType::Double).then(|| f64::from_bits(self.0))
    }

    /// Numeric value of an int32 or double.
    pub fn as_number(self) -> Option<f64> {
        match self.value_type() {
            ValueType::Int32 => Some(self.0 as u32 as i32 as f64),
            ValueType::Double => Some(f64::from_bits(self.0)),
            _ => None,
        }
    }

    /// Boolean payload.
    pub fn as_boolean(self) -> Option<bool> {
        match self.0 {
            TAG_TRUE => Some(true),
            TAG_FALSE => Some(false),
            _ => None,
        }
    }

    /// Object payload.
    pub fn as_object(self) -> Option<ObjectId> {
        self.is_object()
            .then(|| ObjectId::new((self.0 & PAYLOAD_MASK) as u32))
    }

    /// String payload.
    pub fn as_string(self) -> Option<StringId> {
        (self.0 >> 48 == TAG_STRING >> 48).then(|| StringId::new((self.0 & PAYLOAD_MASK) as u32))
    }

    /// Symbol payload.
    pub fn as_symbol(self) -> Option<SymbolId> {
        (self.0 >> 48 == TAG_SYMBOL >> 48).then(|| SymbolId::new((self.0 & PAYLOAD_MASK) as u32))
    }

    /// BigInt payload.
    pub fn as_bigint(self) -> Option<BigIntId> {
        (self.0 >> 48 == TAG_BIGINT >> 48).then(|| BigIntId::new((self.0 & PAYLOAD_MASK) as u32))
    }

    /// Magic payload.
    pub fn as_magic(self) -> Option<JSWhyMagic> {
        if self.value_type() == ValueType::Magic {
            JSWhyMagic::from_u8((self.0 & 0xFF) as u8)
        } else {
            None
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::UNDEFINED
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value_type() {
            ValueType::Double => write!(f, "{}", f64::from_bits(self.0)),
            ValueType::Int32 => write!(f, "{}i", self.0 as u32 as i32),
            ValueType::Boolean => write!(f, "{}", self.0 == TAG_TRUE),
            ValueType::Undefined => f.write_str("undefined"),
            ValueType::Null => f.write_str("null"),
            ValueType::Magic => write!(f, "magic({:?})", self.as_magic()),
            ValueType::String => write!(f, "string#{}", self.0 & PAYLOAD_MASK),
            ValueType::Symbol => write!(f, "symbol#{}", self.0 & PAYLOAD_MASK),
            ValueType::BigInt => write!(f, "bigint#{}", self.0 & PAYLOAD_MASK),
            ValueType::Object => write!(f, "object#{}", self.0 & PAYLOAD_MASK),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(Value::UNDEFINED.value_type(), ValueType::Undefined);
        assert_eq!(Value::NULL.value_type(), ValueType::Null);
        assert_eq!(Value::TRUE.value_type(), ValueType::Boolean);
        assert_eq!(Value::int32(-7).value_type(), ValueType::Int32);
        assert_eq!(Value::int32(-7).as_int32(), Some(-7));
        assert_eq!(Value::double(1.5).value_type(), ValueType::Double);
        assert_eq!(Value::double(f64::NAN).to_bits(), Value::NAN.to_bits());
        assert_eq!(Value::double(f64::INFINITY).as_double(), Some(f64::INFINITY));
        assert_eq!(
            Value::magic(JSWhyMagic::ElementsHole).as_magic(),
            Some(JSWhyMagic::ElementsHole)
        );
        let obj = Value::object(ObjectId::new(42));
        assert_eq!(obj.value_type(), ValueType::Object);
        assert_eq!(obj.as_object(), Some(ObjectId::new(42)));
    }

    #[test]
    fn test_number_prefers_int32() {
        assert_eq!(Value::number(5.0), Value::int32(5));
        assert_eq!(Value::number(-0.0).value_type(), ValueType::Double);
        assert_eq!(Value::number(0.5).value_type(), ValueType::Double);
    }

    #[test]
    fn test_payload_reboxing() {
        for v in [
            Value::int32(-1),
            Value::TRUE,
            Value::FALSE,
            Value::NULL,
            Value::object(ObjectId::new(3)),
            Value::string(StringId::new(9)),
            Value::double(-2.25),
        ] {
            assert_eq!(Value::from_payload(v.value_type(), v.payload()), v);
        }
    }
}
