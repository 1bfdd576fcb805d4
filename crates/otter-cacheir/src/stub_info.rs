//! Stub fields and the stub-data layout shared by stubs of one shape

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::kind::{CacheKind, ICStubEngine};

/// Size of one stub field in the stub data.
pub const STUB_FIELD_SIZE: u32 = 8;

/// Type of one stub field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StubFieldType {
    /// 32-bit integer (offsets, counts, nargs-and-flags)
    RawWord,
    /// 64-bit integer
    RawInt64,
    /// Shape handle
    Shape,
    /// Object group handle
    Group,
    /// Object handle
    Object,
    /// Class handle
    Class,
    /// Atom handle
    String,
    /// Symbol handle
    Symbol,
    /// Property key
    Id,
    /// Boxed value
    Value,
}

impl StubFieldType {
    /// Whether the field holds a GC thing that stubs must trace.
    pub const fn is_gc_pointer(self) -> bool {
        !matches!(
            self,
            StubFieldType::RawWord | StubFieldType::RawInt64 | StubFieldType::Class
        )
    }
}

/// One stub field recorded by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StubField {
    /// Type
    pub ty: StubFieldType,
    /// Payload bits
    pub data: u64,
}

impl StubField {
    /// Create a field.
    pub const fn new(ty: StubFieldType, data: u64) -> Self {
        Self { ty, data }
    }
}

/// Layout of the stub data of every stub compiled from the same CacheIR
/// code bytes.
///
/// Created once per distinct program shape and shared (through `Arc`) by
/// the stub-code cache, every attached stub and Warp snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheIRStubInfo {
    kind: CacheKind,
    engine: ICStubEngine,
    makes_gc_calls: bool,
    code: Box<[u8]>,
    field_types: Box<[StubFieldType]>,
}

impl CacheIRStubInfo {
    /// Build the shared info for a program.
    pub fn new(
        kind: CacheKind,
        engine: ICStubEngine,
        makes_gc_calls: bool,
        code: &[u8],
        field_types: &[StubFieldType],
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            engine,
            makes_gc_calls,
            code: code.into(),
            field_types: field_types.into(),
        })
    }

    /// Cache kind.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Engine.
    pub fn engine(&self) -> ICStubEngine {
        self.engine
    }

    /// Whether the compiled code may call into the GC.
    pub fn makes_gc_calls(&self) -> bool {
        self.makes_gc_calls
    }

    /// CacheIR code bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Field types in order.
    pub fn field_types(&self) -> &[StubFieldType] {
        &self.field_types
    }

    /// Type of the field at byte `offset`.
    pub fn field_type_at(&self, offset: u32) -> Option<StubFieldType> {
        self.field_types.get((offset / STUB_FIELD_SIZE) as usize).copied()
    }

    /// Size in bytes of the stub data.
    pub fn stub_data_size(&self) -> usize {
        self.field_types.len() * STUB_FIELD_SIZE as usize
    }

    /// Read the 8-byte field at `offset`. Out-of-range reads yield 0.
    pub fn get_stub_raw_int64(&self, stub_data: &[u8], offset: u32) -> u64 {
        read_stub_word(stub_data, offset)
    }

    /// Read the field at `offset` as a 32-bit word.
    pub fn get_stub_raw_word(&self, stub_data: &[u8], offset: u32) -> u32 {
        read_stub_word(stub_data, offset) as u32
    }

    /// Whether two stubs' data are identical field by field. Value fields
    /// compare by bits, so `NaN` equals itself and `-0` differs from `+0`.
    pub fn stub_data_equals(&self, a: &[u8], b: &[u8]) -> bool {
        a.len() == b.len()
            && (0..self.field_types.len() as u32)
                .all(|i| read_stub_word(a, i * STUB_FIELD_SIZE) == read_stub_word(b, i * STUB_FIELD_SIZE))
    }
}

/// Read the little-endian word at `offset` in a stub-data buffer.
pub fn read_stub_word(stub_data: &[u8], offset: u32) -> u64 {
    let start = offset as usize;
    let mut word = [0u8; 8];
    if let Some(bytes) = stub_data.get(start..start + 8) {
        word.copy_from_slice(bytes);
    }
    u64::from_le_bytes(word)
}

/// Overwrite the word at `offset` in a stub-data buffer.
pub fn write_stub_word(stub_data: &mut [u8], offset: u32, word: u64) {
    let start = offset as usize;
    if let Some(bytes) = stub_data.get_mut(start..start + 8) {
        bytes.copy_from_slice(&word.to_le_bytes());
    }
}

/// Serialize fields into a stub-data buffer.
pub fn encode_stub_data(fields: &[StubField]) -> Vec<u8> {
    fields.iter().flat_map(|f| f.data.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_and_reads() {
        let fields = [
            StubField::new(StubFieldType::Shape, 7),
            StubField::new(StubFieldType::RawWord, 16),
            StubField::new(StubFieldType::RawInt64, u64::MAX - 1),
        ];
        let info = CacheIRStubInfo::new(
            CacheKind::GetProp,
            ICStubEngine::Baseline,
            false,
            &[0, 1, 2],
            &fields.iter().map(|f| f.ty).collect::<Vec<_>>(),
        );
        let data = encode_stub_data(&fields);
        assert_eq!(info.stub_data_size(), 24);
        assert_eq!(info.get_stub_raw_word(&data, 8), 16);
        assert_eq!(info.get_stub_raw_int64(&data, 16), u64::MAX - 1);
        assert_eq!(info.field_type_at(8), Some(StubFieldType::RawWord));
        assert_eq!(info.field_type_at(24), None);
    }

    #[test]
    fn test_stub_data_equals_by_bits() {
        let info = CacheIRStubInfo::new(
            CacheKind::Compare,
            ICStubEngine::Baseline,
            false,
            &[],
            &[StubFieldType::Value],
        );
        let pos_zero = 0.0f64.to_bits().to_le_bytes();
        let neg_zero = (-0.0f64).to_bits().to_le_bytes();
        assert!(info.stub_data_equals(&pos_zero, &pos_zero));
        assert!(!info.stub_data_equals(&pos_zero, &neg_zero));
    }

    #[test]
    fn test_serde_roundtrip() {
        let info = CacheIRStubInfo::new(
            CacheKind::SetProp,
            ICStubEngine::Baseline,
            true,
            &[4, 0, 0],
            &[StubFieldType::Shape, StubFieldType::Value],
        );
        let json = serde_json::to_string(&*info).unwrap();
        let back: CacheIRStubInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, *info);
        assert!(back.makes_gc_calls());
    }

    #[test]
    fn test_write_word() {
        let mut data = encode_stub_data(&[StubField::new(StubFieldType::RawWord, 1)]);
        write_stub_word(&mut data, 0, 9);
        assert_eq!(read_stub_word(&data, 0), 9);
        write_stub_word(&mut data, 8, 3);
        assert_eq!(data.len(), 8);
    }
}
