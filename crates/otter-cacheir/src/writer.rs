//! CacheIR writer
//!
//! Stub generators build programs through the per-opcode methods generated
//! in [`crate::ops`]; this file holds the encoding primitives they share.

use smallvec::SmallVec;

use crate::args::ArgKind;
use crate::error::{CacheIRError, Result};
use crate::kind::CacheKind;
use crate::operand::{Int32OperandId, ObjOperandId, ValOperandId};
use crate::ops::CacheOp;
use crate::stub_info::{StubField, StubFieldType, encode_stub_data};
use crate::validate::ValidatedCacheIR;

/// Largest operand id or stub-field index the one-byte encoding allows.
const MAX_ENCODED_INDEX: usize = u8::MAX as usize;

/// Append-only builder for one CacheIR program.
#[derive(Debug, Clone)]
pub struct CacheIRWriter {
    kind: CacheKind,
    buffer: Vec<u8>,
    stub_fields: SmallVec<[StubField; 8]>,
    next_operand_id: u16,
    num_instructions: u32,
    operand_last_used: Vec<u32>,
    too_large: bool,
}

impl CacheIRWriter {
    /// Start a program for `kind`. Its inputs are operands `0..num_inputs`.
    pub fn new(kind: CacheKind) -> Self {
        let num_inputs = kind.num_inputs();
        Self {
            kind,
            buffer: Vec::with_capacity(32),
            stub_fields: SmallVec::new(),
            next_operand_id: num_inputs as u16,
            num_instructions: 0,
            operand_last_used: vec![0; num_inputs],
            too_large: false,
        }
    }

    /// Cache kind.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Input `index` as a boxed value.
    pub fn input_val(&self, index: usize) -> ValOperandId {
        debug_assert!(index < self.kind.num_inputs());
        ValOperandId::new(index as u16)
    }

    /// Input `index` as an object (`GetName`'s environment).
    pub fn input_obj(&self, index: usize) -> ObjOperandId {
        debug_assert!(index < self.kind.num_inputs());
        ObjOperandId::new(index as u16)
    }

    /// The argument count of a `Call` IC.
    pub fn input_argc(&self) -> Int32OperandId {
        debug_assert_eq!(self.kind, CacheKind::Call);
        Int32OperandId::new(0)
    }

    pub(crate) fn write_op(&mut self, op: CacheOp) {
        self.buffer.push(op as u8);
        self.num_instructions += 1;
    }

    pub(crate) fn new_operand_id(&mut self) -> u16 {
        let id = self.next_operand_id;
        self.next_operand_id += 1;
        self.operand_last_used.push(self.num_instructions.saturating_sub(1));
        if id as usize > MAX_ENCODED_INDEX {
            self.too_large = true;
        }
        id
    }

    pub(crate) fn write_arg(&mut self, kind: ArgKind, bits: u64) {
        if kind.operand_type().is_some() {
            self.write_operand_id(bits as u16);
        } else if let Some(ty) = kind.field_type() {
            self.add_stub_field(ty, bits);
        } else {
            match kind.encoded_len() {
                4 => self.buffer.extend_from_slice(&(bits as u32).to_le_bytes()),
                _ => self.buffer.push(bits as u8),
            }
        }
    }

    fn write_operand_id(&mut self, id: u16) {
        if id as usize > MAX_ENCODED_INDEX {
            self.too_large = true;
        }
        self.buffer.push(id as u8);
        if let Some(last) = self.operand_last_used.get_mut(id as usize) {
            *last = self.num_instructions.saturating_sub(1);
        }
    }

    fn add_stub_field(&mut self, ty: StubFieldType, data: u64) {
        let index = self.stub_fields.len();
        if index > MAX_ENCODED_INDEX {
            self.too_large = true;
        }
        self.stub_fields.push(StubField::new(ty, data));
        self.buffer.push(index as u8);
    }

    /// Encoded opcode stream.
    pub fn code(&self) -> &[u8] {
        &self.buffer
    }

    /// Stub fields in order.
    pub fn stub_fields(&self) -> &[StubField] {
        &self.stub_fields
    }

    /// Stub-field types in order.
    pub fn stub_field_types(&self) -> Vec<StubFieldType> {
        self.stub_fields.iter().map(|f| f.ty).collect()
    }

    /// Size of the stub data.
    pub fn stub_data_size(&self) -> usize {
        self.stub_fields.len() * 8
    }

    /// Fresh stub data holding the fields' values.
    pub fn copy_stub_data(&self) -> Vec<u8> {
        encode_stub_data(&self.stub_fields)
    }

    /// Whether `stub_data` holds exactly this writer's field values.
    pub fn stub_data_equals(&self, stub_data: &[u8]) -> bool {
        self.copy_stub_data() == stub_data
    }

    /// Number of operands defined so far, inputs included.
    pub fn num_operand_ids(&self) -> u16 {
        self.next_operand_id
    }

    /// Number of instructions written.
    pub fn num_instructions(&self) -> u32 {
        self.num_instructions
    }

    /// Index of the last instruction reading or defining operand `id`.
    pub fn operand_last_used(&self, id: u16) -> Option<u32> {
        self.operand_last_used.get(id as usize).copied()
    }

    /// Whether the program outgrew the encoding.
    pub fn too_large(&self) -> bool {
        self.too_large
    }

    /// Check the program and freeze it.
    pub fn validate(&self) -> Result<ValidatedCacheIR> {
        if self.too_large {
            return Err(CacheIRError::TooLarge);
        }
        ValidatedCacheIR::new(self.kind, &self.buffer, &self.stub_field_types())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otter_vm_core::ShapeId;

    #[test]
    fn test_encoding() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.guard_shape(obj, ShapeId::new(3));
        writer.load_fixed_slot_result(obj, 16);
        writer.return_from_ic();

        assert_eq!(
            writer.code(),
            &[
                CacheOp::GuardToObject as u8,
                0,
                CacheOp::GuardShape as u8,
                0,
                0,
                CacheOp::LoadFixedSlotResult as u8,
                0,
                1,
                CacheOp::ReturnFromIc as u8,
            ]
        );
        assert_eq!(writer.stub_fields().len(), 2);
        assert_eq!(writer.stub_fields()[0].ty, StubFieldType::Shape);
        assert_eq!(writer.stub_fields()[1].data, 16);
        assert_eq!(writer.num_instructions(), 4);
        assert_eq!(writer.operand_last_used(0), Some(2));
    }

    #[test]
    fn test_definitions_get_fresh_ids() {
        let mut writer = CacheIRWriter::new(CacheKind::BinaryArith);
        let index = writer.guard_to_int32_index(writer.input_val(1));
        assert_eq!(index.id(), 2);
        let one = writer.load_int32_constant(1);
        assert_eq!(one.id(), 3);
        assert_eq!(writer.num_operand_ids(), 4);
    }

    #[test]
    fn test_immediates() {
        let mut writer = CacheIRWriter::new(CacheKind::Compare);
        let lhs = writer.guard_to_int32(writer.input_val(0));
        let rhs = writer.guard_to_int32(writer.input_val(1));
        writer.compare_int32_result(crate::flags::JSOp::Lt, lhs, rhs);
        let tail = &writer.code()[4..];
        assert_eq!(tail, &[CacheOp::CompareInt32Result as u8, 4, 0, 1]);
    }
}
