//! CacheIR error types

use thiserror::Error;

use crate::flags::ArgFormat;
use crate::stub_info::StubFieldType;

/// Errors found while decoding or validating a CacheIR program.
///
/// A valid writer never produces these; they indicate a stub-generator bug
/// and are reported before either backend consumes the program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheIRError {
    /// Ran off the end of the opcode stream
    #[error("unexpected end of CacheIR stream at byte {0}")]
    UnexpectedEnd(usize),

    /// Unknown opcode byte
    #[error("invalid opcode byte {byte:#04x} at byte {pos}")]
    InvalidOpcode {
        /// The byte
        byte: u8,
        /// Stream offset
        pos: usize,
    },

    /// An enum immediate is out of range
    #[error("invalid {what} immediate {byte}")]
    InvalidImmediate {
        /// Immediate kind
        what: &'static str,
        /// The byte
        byte: u8,
    },

    /// Operand used before it was defined
    #[error("operand {id} used by {op} before definition")]
    UndefinedOperand {
        /// Opcode name
        op: &'static str,
        /// Operand id
        id: u16,
    },

    /// Operand used at a type it was never guarded to
    #[error("operand {id} is {found}, {op} expects {expected}")]
    OperandTypeMismatch {
        /// Opcode name
        op: &'static str,
        /// Operand id
        id: u16,
        /// Known type
        found: &'static str,
        /// Required type
        expected: &'static str,
    },

    /// A definition did not use the next operand id
    #[error("{op} defines operand {id}, expected {expected}")]
    NonMonotonicDefinition {
        /// Opcode name
        op: &'static str,
        /// Defined id
        id: u16,
        /// Next free id
        expected: u16,
    },

    /// A fallible operation follows the effectful one
    #[error("{op} at instruction {index} may fail after the effectful {effect}")]
    GuardAfterEffect {
        /// Opcode name
        op: &'static str,
        /// Effectful opcode name
        effect: &'static str,
        /// Instruction index
        index: u32,
    },

    /// Two effectful operations
    #[error("more than one effectful operation ({first}, {second})")]
    MultipleEffects {
        /// First effect
        first: &'static str,
        /// Second effect
        second: &'static str,
    },

    /// Two result-producing operations
    #[error("more than one result operation ({first}, {second})")]
    MultipleResults {
        /// First result op
        first: &'static str,
        /// Second result op
        second: &'static str,
    },

    /// A stub-field argument refers to a missing field or one of another type
    #[error("{op} expects a {expected:?} stub field at offset {offset}")]
    StubFieldMismatch {
        /// Opcode name
        op: &'static str,
        /// Byte offset
        offset: u32,
        /// Required field type
        expected: StubFieldType,
    },

    /// A call op with an argument format neither backend compiles
    #[error("call argument format {0:?} is not supported")]
    UnsupportedArgFormat(ArgFormat),

    /// No terminal at the end
    #[error("program does not end with ReturnFromIC or TypeMonitorResult")]
    MissingTerminal,

    /// Instructions after the terminal
    #[error("{0} follows the terminal")]
    CodeAfterTerminal(&'static str),

    /// More operands or stub fields than the encoding allows
    #[error("CacheIR program too large")]
    TooLarge,
}

/// Result type for CacheIR operations.
pub type Result<T> = std::result::Result<T, CacheIRError>;
