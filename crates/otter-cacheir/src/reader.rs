//! CacheIR reader

use crate::args::ArgKind;
use crate::error::{CacheIRError, Result};
use crate::ops::CacheOp;
use crate::stub_info::STUB_FIELD_SIZE;

/// Cursor over an encoded opcode stream.
#[derive(Debug, Clone)]
pub struct CacheIRReader<'a> {
    code: &'a [u8],
    pos: usize,
    instruction: u32,
}

impl<'a> CacheIRReader<'a> {
    /// Read `code` from the start.
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            code,
            pos: 0,
            instruction: 0,
        }
    }

    /// Whether any bytes are left.
    #[inline]
    pub fn more(&self) -> bool {
        self.pos < self.code.len()
    }

    /// Byte offset of the cursor.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Index of the instruction most recently returned by [`Self::read_op`].
    #[inline]
    pub fn instruction_index(&self) -> u32 {
        self.instruction.saturating_sub(1)
    }

    /// Decode the next opcode.
    pub fn read_op(&mut self) -> Result<CacheOp> {
        let pos = self.pos;
        let byte = self.read_byte()?;
        self.instruction += 1;
        CacheOp::from_u8(byte).ok_or(CacheIRError::InvalidOpcode { byte, pos })
    }

    /// Decode one argument to raw bits. Stub-field arguments come back as
    /// byte offsets into the stub data.
    pub fn read_arg(&mut self, kind: ArgKind) -> Result<u64> {
        if kind.field_type().is_some() {
            return Ok(self.read_byte()? as u64 * STUB_FIELD_SIZE as u64);
        }
        match kind.encoded_len() {
            4 => self.read_u32().map(u64::from),
            _ => self.read_byte().map(u64::from),
        }
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .code
            .get(self.pos)
            .ok_or(CacheIRError::UnexpectedEnd(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self
            .code
            .get(self.pos..self.pos + 4)
            .ok_or(CacheIRError::UnexpectedEnd(self.pos))?;
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        self.pos += 4;
        Ok(u32::from_le_bytes(word))
    }

    /// Skip the arguments of `op` (and its defined operand).
    pub fn skip_args(&mut self, op: CacheOp) -> Result<()> {
        for kind in op.arg_kinds() {
            self.read_arg(*kind)?;
        }
        if let crate::ops::OpOutput::Def(kind) = op.output() {
            self.read_arg(kind)?;
        }
        Ok(())
    }
}
