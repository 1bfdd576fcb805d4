//! Object groups and property type sets
//!
//! Every object belongs to a group. When type inference is enabled, a group
//! records, per property (and once for all elements), the set of value types
//! that have been stored. Stores performed by stubs must keep those sets
//! complete; that is what the type-update IC is for.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::object::{ClassId, ObjectId};
use crate::shape::PropertyKey;
use crate::value::{Value, ValueType};

bitflags! {
    /// A set of primitive types plus "any object".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        /// `undefined`
        const UNDEFINED = 1 << 0;
        /// `null`
        const NULL = 1 << 1;
        /// booleans
        const BOOLEAN = 1 << 2;
        /// int32 numbers
        const INT32 = 1 << 3;
        /// double numbers
        const DOUBLE = 1 << 4;
        /// strings
        const STRING = 1 << 5;
        /// symbols
        const SYMBOL = 1 << 6;
        /// bigints
        const BIGINT = 1 << 7;
        /// magic values (holes)
        const MAGIC = 1 << 8;
        /// any object
        const ANY_OBJECT = 1 << 9;
    }
}

impl TypeFlags {
    /// The flag describing a single value type.
    pub fn from_value_type(ty: ValueType) -> TypeFlags {
        match ty {
            ValueType::Double => TypeFlags::DOUBLE,
            ValueType::Int32 => TypeFlags::INT32,
            ValueType::Boolean => TypeFlags::BOOLEAN,
            ValueType::Undefined => TypeFlags::UNDEFINED,
            ValueType::Null => TypeFlags::NULL,
            ValueType::Magic => TypeFlags::MAGIC,
            ValueType::String => TypeFlags::STRING,
            ValueType::Symbol => TypeFlags::SYMBOL,
            ValueType::BigInt => TypeFlags::BIGINT,
            ValueType::Object => TypeFlags::ANY_OBJECT,
        }
    }

    /// The flag describing `value`.
    pub fn from_value(value: Value) -> TypeFlags {
        Self::from_value_type(value.value_type())
    }

    /// Whether a value of this type is already accounted for.
    pub fn has_value(self, value: Value) -> bool {
        self.contains(Self::from_value(value))
    }
}

/// Handle to an object group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct GroupId(u32);

impl GroupId {
    /// Create from a table index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Table index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// What a type set describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKey {
    /// A named property
    Property(PropertyKey),
    /// All dense elements
    Elements,
}

/// Group contents.
#[derive(Debug, Clone)]
pub struct ObjectGroupData {
    /// Class of members
    pub class: ClassId,
    /// Prototype of members
    pub proto: Option<ObjectId>,
    property_types: FxHashMap<TypeKey, TypeFlags>,
}

impl ObjectGroupData {
    /// Recorded types for `key`.
    pub fn types(&self, key: TypeKey) -> TypeFlags {
        self.property_types.get(&key).copied().unwrap_or_default()
    }
}

/// Owner of all groups.
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: Vec<ObjectGroupData>,
    defaults: FxHashMap<(ClassId, Option<ObjectId>), GroupId>,
}

impl GroupTable {
    /// The shared default group for `(class, proto)`.
    pub fn default_group(&mut self, class: ClassId, proto: Option<ObjectId>) -> GroupId {
        if let Some(&id) = self.defaults.get(&(class, proto)) {
            return id;
        }
        let id = self.new_group(class, proto);
        self.defaults.insert((class, proto), id);
        id
    }

    /// A fresh, unshared group.
    pub fn new_group(&mut self, class: ClassId, proto: Option<ObjectId>) -> GroupId {
        self.groups.push(ObjectGroupData {
            class,
            proto,
            property_types: FxHashMap::default(),
        });
        GroupId::new(self.groups.len() as u32 - 1)
    }

    /// Group contents.
    pub fn get(&self, id: GroupId) -> &ObjectGroupData {
        &self.groups[id.index() as usize]
    }

    /// Add the type of `value` to the set for `key`.
    pub fn add_type(&mut self, id: GroupId, key: TypeKey, value: Value) {
        let group = &mut self.groups[id.index() as usize];
        *group.property_types.entry(key).or_default() |= TypeFlags::from_value(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_type() {
        let mut groups = GroupTable::default();
        let g = groups.default_group(ClassId::PLAIN_OBJECT, None);
        assert_eq!(groups.default_group(ClassId::PLAIN_OBJECT, None), g);

        let key = TypeKey::Elements;
        assert!(groups.get(g).types(key).is_empty());
        groups.add_type(g, key, Value::int32(1));
        assert!(groups.get(g).types(key).has_value(Value::int32(9)));
        assert!(!groups.get(g).types(key).has_value(Value::double(0.5)));
    }
}
