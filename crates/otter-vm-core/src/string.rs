//! Interned strings, symbols and bigints
//!
//! Every string the stubs see is an atom: equal contents share one
//! [`StringId`], so `GuardSpecificAtom` is a word compare.

use std::sync::Arc;

use num_bigint::BigInt;
use rustc_hash::FxHashMap;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
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
    };
}

define_handle!(
    /// Handle to an interned string
    StringId
);
define_handle!(
    /// Handle to a symbol
    SymbolId
);
define_handle!(
    /// Handle to a bigint
    BigIntId
);

/// Atom table.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<Arc<str>>,
    lookup: FxHashMap<Arc<str>, StringId>,
}

impl StringTable {
    /// Intern `s`, returning the existing atom when present.
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&id) = self.lookup.get(s) {
            return id;
        }
        let id = StringId::new(self.strings.len() as u32);
        let atom: Arc<str> = Arc::from(s);
        self.strings.push(Arc::clone(&atom));
        self.lookup.insert(atom, id);
        id
    }

    /// Contents of an atom.
    pub fn get(&self, id: StringId) -> &str {
        &self.strings[id.index() as usize]
    }

    /// Length in UTF-16 code units.
    pub fn length(&self, id: StringId) -> usize {
        self.get(id).encode_utf16().count()
    }

    /// UTF-16 code unit at `index`.
    pub fn char_code_at(&self, id: StringId, index: usize) -> Option<u16> {
        self.get(id).encode_utf16().nth(index)
    }

    /// Number of atoms.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

/// Symbol and bigint storage.
#[derive(Debug, Default)]
pub struct SymbolTable {
    descriptions: Vec<Option<StringId>>,
    bigints: Vec<BigInt>,
}

impl SymbolTable {
    /// Create a fresh symbol.
    pub fn new_symbol(&mut self, description: Option<StringId>) -> SymbolId {
        self.descriptions.push(description);
        SymbolId::new(self.descriptions.len() as u32 - 1)
    }

    /// Description of a symbol.
    pub fn description(&self, id: SymbolId) -> Option<StringId> {
        self.descriptions[id.index() as usize]
    }

    /// Store a bigint.
    pub fn new_bigint(&mut self, value: BigInt) -> BigIntId {
        self.bigints.push(value);
        BigIntId::new(self.bigints.len() as u32 - 1)
    }

    /// Read a bigint.
    pub fn bigint(&self, id: BigIntId) -> &BigInt {
        &self.bigints[id.index() as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedups() {
        let mut table = StringTable::default();
        let a = table.intern("length");
        let b = table.intern("length");
        let c = table.intern("x");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.get(c), "x");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_utf16_units() {
        let mut table = StringTable::default();
        let s = table.intern("a\u{1F600}");
        assert_eq!(table.length(s), 3);
        assert_eq!(table.char_code_at(s, 0), Some(b'a' as u16));
        assert_eq!(table.char_code_at(s, 3), None);
    }
}
