//! Shapes (hidden classes)
//!
//! A shape fixes an object's class, prototype, fixed-slot count and the
//! ordered list of its own properties. Adding a property follows a
//! memoised transition, so objects built the same way share a shape and a
//! single `GuardShape` covers all of them.

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::object::{ClassId, ObjectId};
use crate::string::{StringId, SymbolId};

/// Handle to a shape in the [`ShapeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ShapeId(u32);

impl ShapeId {
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

/// Property key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String-keyed property
    Atom(StringId),
    /// Symbol-keyed property
    Symbol(SymbolId),
    /// Array index
    Index(u32),
}

impl PropertyKey {
    /// Pack into one stub-data word.
    pub fn to_bits(self) -> u64 {
        match self {
            PropertyKey::Atom(id) => id.index() as u64,
            PropertyKey::Symbol(id) => (1 << 32) | id.index() as u64,
            PropertyKey::Index(index) => (2 << 32) | index as u64,
        }
    }

    /// Unpack a stub-data word written by [`PropertyKey::to_bits`].
    pub fn from_bits(bits: u64) -> Option<Self> {
        let low = bits as u32;
        match bits >> 32 {
            0 => Some(PropertyKey::Atom(StringId::new(low))),
            1 => Some(PropertyKey::Symbol(SymbolId::new(low))),
            2 => Some(PropertyKey::Index(low)),
            _ => None,
        }
    }
}

bitflags! {
    /// Property attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyAttrs: u8 {
        /// `[[Writable]]`
        const WRITABLE = 1 << 0;
        /// `[[Enumerable]]`
        const ENUMERABLE = 1 << 1;
        /// `[[Configurable]]`
        const CONFIGURABLE = 1 << 2;
    }
}

impl Default for PropertyAttrs {
    fn default() -> Self {
        PropertyAttrs::all()
    }
}

/// Where a property's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyStorage {
    /// Data property in the given slot
    Slot(u32),
    /// Accessor pair
    Accessor {
        /// Getter function
        getter: Option<ObjectId>,
        /// Setter function
        setter: Option<ObjectId>,
    },
}

/// One own property of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    /// Key
    pub key: PropertyKey,
    /// Storage
    pub storage: PropertyStorage,
    /// Attributes
    pub attrs: PropertyAttrs,
}

/// Shape contents.
#[derive(Debug, Clone)]
pub struct ShapeData {
    /// Class of objects with this shape
    pub class: ClassId,
    /// Prototype of objects with this shape
    pub proto: Option<ObjectId>,
    /// Number of inline slots
    pub num_fixed_slots: u32,
    /// Own properties in insertion order
    pub properties: SmallVec<[PropertyInfo; 8]>,
    /// Shape this one transitioned from
    pub parent: Option<ShapeId>,
}

impl ShapeData {
    /// Look up an own property.
    pub fn lookup(&self, key: PropertyKey) -> Option<&PropertyInfo> {
        self.properties.iter().rev().find(|p| p.key == key)
    }

    /// Number of slots in use.
    pub fn slot_span(&self) -> u32 {
        self.properties
            .iter()
            .filter(|p| matches!(p.storage, PropertyStorage::Slot(_)))
            .count() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TransitionKey {
    from: ShapeId,
    key: PropertyKey,
    storage: Option<PropertyStorage>,
    attrs: PropertyAttrs,
}

/// Owner of all shapes.
#[derive(Debug, Default)]
pub struct ShapeTable {
    shapes: Vec<ShapeData>,
    initial: FxHashMap<(ClassId, Option<ObjectId>, u32), ShapeId>,
    transitions: FxHashMap<TransitionKey, ShapeId>,
}

impl ShapeTable {
    /// Empty shape for `(class, proto, num_fixed_slots)`, shared.
    pub fn initial_shape(
        &mut self,
        class: ClassId,
        proto: Option<ObjectId>,
        num_fixed_slots: u32,
    ) -> ShapeId {
        if let Some(&id) = self.initial.get(&(class, proto, num_fixed_slots)) {
            return id;
        }
        let id = self.push(ShapeData {
            class,
            proto,
            num_fixed_slots,
            properties: SmallVec::new(),
            parent: None,
        });
        self.initial.insert((class, proto, num_fixed_slots), id);
        id
    }

    /// Shape reached by adding a data property. Its slot is the current span.
    pub fn add_data_property(
        &mut self,
        from: ShapeId,
        key: PropertyKey,
        attrs: PropertyAttrs,
    ) -> ShapeId {
        self.transition(from, key, None, attrs)
    }

    /// Shape reached by adding an accessor property.
    pub fn add_accessor_property(
        &mut self,
        from: ShapeId,
        key: PropertyKey,
        getter: Option<ObjectId>,
        setter: Option<ObjectId>,
    ) -> ShapeId {
        let storage = PropertyStorage::Accessor { getter, setter };
        self.transition(from, key, Some(storage), PropertyAttrs::CONFIGURABLE)
    }

    fn transition(
        &mut self,
        from: ShapeId,
        key: PropertyKey,
        storage: Option<PropertyStorage>,
        attrs: PropertyAttrs,
    ) -> ShapeId {
        let tkey = TransitionKey {
            from,
            key,
            storage,
            attrs,
        };
        if let Some(&id) = self.transitions.get(&tkey) {
            return id;
        }

        let parent = self.get(from);
        let storage = storage.unwrap_or(PropertyStorage::Slot(parent.slot_span()));
        let mut properties = parent.properties.clone();
        properties.push(PropertyInfo {
            key,
            storage,
            attrs,
        });
        let data = ShapeData {
            class: parent.class,
            proto: parent.proto,
            num_fixed_slots: parent.num_fixed_slots,
            properties,
            parent: Some(from),
        };
        let id = self.push(data);
        self.transitions.insert(tkey, id);
        id
    }

    fn push(&mut self, data: ShapeData) -> ShapeId {
        self.shapes.push(data);
        ShapeId::new(self.shapes.len() as u32 - 1)
    }

    /// Shape contents.
    pub fn get(&self, id: ShapeId) -> &ShapeData {
        &self.shapes[id.index() as usize]
    }

    /// Number of shapes created so far.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Whether no shape exists yet.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_shared() {
        let mut table = ShapeTable::default();
        let root = table.initial_shape(ClassId::PLAIN_OBJECT, None, 4);
        let x = PropertyKey::Atom(StringId::new(0));
        let y = PropertyKey::Atom(StringId::new(1));

        let a = table.add_data_property(root, x, PropertyAttrs::default());
        let b = table.add_data_property(root, x, PropertyAttrs::default());
        assert_eq!(a, b);

        let ab = table.add_data_property(a, y, PropertyAttrs::default());
        assert_eq!(table.get(ab).lookup(y).map(|p| p.storage), Some(PropertyStorage::Slot(1)));
        assert_eq!(table.get(ab).parent, Some(a));
        assert_eq!(table.get(ab).slot_span(), 2);
    }

    #[test]
    fn test_accessors_take_no_slot() {
        let mut table = ShapeTable::default();
        let root = table.initial_shape(ClassId::PLAIN_OBJECT, None, 2);
        let g = PropertyKey::Atom(StringId::new(0));
        let s = table.add_accessor_property(root, g, Some(ObjectId::new(1)), None);
        assert_eq!(table.get(s).slot_span(), 0);
        let x = table.add_data_property(s, PropertyKey::Index(0), PropertyAttrs::default());
        assert_eq!(
            table.get(x).lookup(PropertyKey::Index(0)).map(|p| p.storage),
            Some(PropertyStorage::Slot(0))
        );
    }
}
