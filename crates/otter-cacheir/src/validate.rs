//! Program validation
//!
//! Both backends assume a well-formed program: every operand defined before
//! use and used at a type it was guarded to, every fallible op before the
//! single effectful op, at most one result, one terminal at the end. These
//! properties are checked once here, so neither backend has to.

use smallvec::SmallVec;

use crate::args::{ArgKind, FromArgBits};
use crate::error::{CacheIRError, Result};
use crate::flags::{ArgFormat, CallFlags, GuardClassKind, JSOp, UnaryMathFunction};
use crate::kind::CacheKind;
use crate::operand::OperandType;
use crate::ops::{CacheOp, OpClass, OpOutput};
use crate::reader::CacheIRReader;
use crate::stub_info::{CacheIRStubInfo, STUB_FIELD_SIZE, StubFieldType};

/// Structure of a validated program: its guard chain, the one effect and
/// the one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSummary {
    /// Number of instructions
    pub num_instructions: u32,
    /// Instruction indices of fallible ops, in order
    pub guards: SmallVec<[u32; 8]>,
    /// The effectful op, if any
    pub effect: Option<(u32, CacheOp)>,
    /// The result-producing op, if any
    pub result: Option<(u32, CacheOp)>,
    /// The terminal
    pub terminal: CacheOp,
    operand_types: Vec<OperandType>,
    operand_last_use: Vec<u32>,
}

impl ProgramSummary {
    /// Number of operands, inputs included.
    pub fn num_operands(&self) -> usize {
        self.operand_types.len()
    }

    /// Type of operand `id` after the last narrowing guard.
    pub fn operand_type(&self, id: u16) -> Option<OperandType> {
        self.operand_types.get(id as usize).copied()
    }

    /// Index of the last instruction that reads operand `id`.
    pub fn operand_last_use(&self, id: u16) -> Option<u32> {
        self.operand_last_use.get(id as usize).copied()
    }

    /// Whether operand `id` has no reader after instruction `instruction`.
    pub fn operand_is_dead_after(&self, id: u16, instruction: u32) -> bool {
        self.operand_last_use(id).is_none_or(|last| last <= instruction)
    }

    /// Whether the program makes an observable side effect.
    pub fn has_effect(&self) -> bool {
        self.effect.is_some()
    }
}

/// A program that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedCacheIR {
    kind: CacheKind,
    code: Box<[u8]>,
    field_types: Box<[StubFieldType]>,
    summary: ProgramSummary,
}

impl ValidatedCacheIR {
    /// Validate `code` for `kind` against the program's stub-field types.
    pub fn new(kind: CacheKind, code: &[u8], field_types: &[StubFieldType]) -> Result<Self> {
        let summary = summarize(kind, code, field_types)?;
        Ok(Self {
            kind,
            code: code.into(),
            field_types: field_types.into(),
            summary,
        })
    }

    /// Validate the program a stub info was built from.
    pub fn from_stub_info(info: &CacheIRStubInfo) -> Result<Self> {
        Self::new(info.kind(), info.code(), info.field_types())
    }

    /// Cache kind.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Code bytes.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Stub-field types.
    pub fn field_types(&self) -> &[StubFieldType] {
        &self.field_types
    }

    /// Structure.
    pub fn summary(&self) -> &ProgramSummary {
        &self.summary
    }

    /// A reader positioned at the first instruction.
    pub fn reader(&self) -> CacheIRReader<'_> {
        CacheIRReader::new(&self.code)
    }
}

fn check_immediate(kind: ArgKind, bits: u64) -> Result<()> {
    match kind {
        ArgKind::Bool => bool::from_arg_bits(bits).map(drop),
        ArgKind::JSOp => JSOp::from_arg_bits(bits).map(drop),
        ArgKind::GuardClassKind => GuardClassKind::from_arg_bits(bits).map(drop),
        ArgKind::ValueType => otter_vm_core::ValueType::from_arg_bits(bits).map(drop),
        ArgKind::CallFlags => match CallFlags::from_arg_bits(bits)?.arg_format() {
            // `f.apply(this, arguments)` needs the caller's arguments object.
            format @ (ArgFormat::Unknown | ArgFormat::FunApplyArgs) => {
                Err(CacheIRError::UnsupportedArgFormat(format))
            }
            _ => Ok(()),
        },
        ArgKind::MathFunction => UnaryMathFunction::from_arg_bits(bits).map(drop),
        _ => Ok(()),
    }
}

fn summarize(kind: CacheKind, code: &[u8], field_types: &[StubFieldType]) -> Result<ProgramSummary> {
    let mut operand_types: Vec<OperandType> =
        (0..kind.num_inputs()).map(|i| kind.input_type(i)).collect();
    let mut operand_last_use = vec![0u32; operand_types.len()];
    let mut guards = SmallVec::new();
    let mut effect: Option<(u32, CacheOp)> = None;
    let mut result: Option<(u32, CacheOp)> = None;
    let mut terminal = None;

    let mut reader = CacheIRReader::new(code);
    while reader.more() {
        let op = reader.read_op()?;
        let index = reader.instruction_index();
        if terminal.is_some() {
            return Err(CacheIRError::CodeAfterTerminal(op.name()));
        }

        let mut first_operand = None;
        for &arg in op.arg_kinds() {
            let bits = reader.read_arg(arg)?;
            if let Some(wanted) = arg.operand_type() {
                let id = bits as u16;
                let found = *operand_types
                    .get(id as usize)
                    .ok_or(CacheIRError::UndefinedOperand { op: op.name(), id })?;
                if !found.satisfies(wanted) {
                    return Err(CacheIRError::OperandTypeMismatch {
                        op: op.name(),
                        id,
                        found: found.name(),
                        expected: wanted.name(),
                    });
                }
                operand_last_use[id as usize] = index;
                first_operand.get_or_insert(id);
            } else if let Some(expected) = arg.field_type() {
                let offset = bits as u32;
                if field_types.get((offset / STUB_FIELD_SIZE) as usize) != Some(&expected) {
                    return Err(CacheIRError::StubFieldMismatch {
                        op: op.name(),
                        offset,
                        expected,
                    });
                }
            } else {
                check_immediate(arg, bits)?;
            }
        }

        match op.output() {
            OpOutput::Def(def) => {
                let id = reader.read_arg(def)? as u16;
                if id as usize != operand_types.len() {
                    return Err(CacheIRError::NonMonotonicDefinition {
                        op: op.name(),
                        id,
                        expected: operand_types.len() as u16,
                    });
                }
                operand_types.push(def.operand_type().unwrap_or(OperandType::Value));
                operand_last_use.push(index);
            }
            OpOutput::Narrow(to) => {
                if let (Some(id), Some(ty)) = (first_operand, to.operand_type()) {
                    operand_types[id as usize] = ty;
                }
            }
            OpOutput::None => {}
        }

        let class = op.class();
        if class.is_fallible() {
            if let Some((_, prior)) = effect {
                return Err(CacheIRError::GuardAfterEffect {
                    op: op.name(),
                    effect: prior.name(),
                    index,
                });
            }
            guards.push(index);
        }
        if class.is_effectful() {
            if let Some((_, first)) = effect {
                return Err(CacheIRError::MultipleEffects {
                    first: first.name(),
                    second: op.name(),
                });
            }
            effect = Some((index, op));
        }
        if class.produces_result() {
            if let Some((_, first)) = result {
                return Err(CacheIRError::MultipleResults {
                    first: first.name(),
                    second: op.name(),
                });
            }
            result = Some((index, op));
        }
        if class == OpClass::Terminal {
            terminal = Some(op);
        }
    }

    let terminal = terminal.ok_or(CacheIRError::MissingTerminal)?;
    Ok(ProgramSummary {
        num_instructions: reader.instruction_index() + 1,
        guards,
        effect,
        result,
        terminal,
        operand_types,
        operand_last_use,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::CacheIRWriter;
    use otter_vm_core::{ObjectId, ShapeId};

    fn get_prop_writer() -> (CacheIRWriter, crate::operand::ObjOperandId) {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.guard_shape(obj, ShapeId::new(1));
        (writer, obj)
    }

    #[test]
    fn test_valid_program_summary() {
        let (mut writer, obj) = get_prop_writer();
        writer.load_fixed_slot_result(obj, 16);
        writer.return_from_ic();
        let program = writer.validate().unwrap();
        let summary = program.summary();
        assert_eq!(summary.guards.as_slice(), &[0, 1]);
        assert_eq!(summary.result, Some((2, CacheOp::LoadFixedSlotResult)));
        assert_eq!(summary.effect, None);
        assert_eq!(summary.terminal, CacheOp::ReturnFromIc);
        assert_eq!(summary.operand_type(0), Some(OperandType::Object));
        assert!(summary.operand_is_dead_after(0, 2));
        assert!(!summary.operand_is_dead_after(0, 1));
    }

    #[test]
    fn test_missing_terminal() {
        let (mut writer, obj) = get_prop_writer();
        writer.load_fixed_slot_result(obj, 16);
        assert_eq!(writer.validate().unwrap_err(), CacheIRError::MissingTerminal);
    }

    #[test]
    fn test_code_after_terminal() {
        let (mut writer, _) = get_prop_writer();
        writer.return_from_ic();
        writer.load_undefined_result();
        assert_eq!(
            writer.validate().unwrap_err(),
            CacheIRError::CodeAfterTerminal("LoadUndefinedResult")
        );
    }

    #[test]
    fn test_guard_after_effect_is_rejected() {
        let mut writer = CacheIRWriter::new(CacheKind::SetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.store_fixed_slot(obj, 16, writer.input_val(1));
        writer.guard_shape(obj, ShapeId::new(0));
        writer.return_from_ic();
        assert!(matches!(
            writer.validate().unwrap_err(),
            CacheIRError::GuardAfterEffect { op: "GuardShape", effect: "StoreFixedSlot", .. }
        ));
    }

    #[test]
    fn test_two_effects_are_rejected() {
        let mut writer = CacheIRWriter::new(CacheKind::SetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.store_fixed_slot(obj, 16, writer.input_val(1));
        writer.store_dynamic_slot(obj, 0, writer.input_val(1));
        writer.return_from_ic();
        assert!(matches!(
            writer.validate().unwrap_err(),
            CacheIRError::MultipleEffects { .. }
        ));
    }

    #[test]
    fn test_two_results_are_rejected() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        writer.load_undefined_result();
        writer.load_boolean_result(true);
        writer.return_from_ic();
        assert!(matches!(
            writer.validate().unwrap_err(),
            CacheIRError::MultipleResults { .. }
        ));
    }

    #[test]
    fn test_type_mismatch() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        // Operand 0 is used as an object without GuardToObject.
        writer.guard_shape(crate::operand::ObjOperandId::new(0), ShapeId::new(0));
        writer.return_from_ic();
        assert!(matches!(
            writer.validate().unwrap_err(),
            CacheIRError::OperandTypeMismatch { id: 0, found: "Value", expected: "Object", .. }
        ));
    }

    #[test]
    fn test_undefined_operand() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        writer.load_object_result(crate::operand::ObjOperandId::new(5));
        writer.return_from_ic();
        assert!(matches!(
            writer.validate().unwrap_err(),
            CacheIRError::UndefinedOperand { id: 5, .. }
        ));
    }

    #[test]
    fn test_int32_satisfies_number() {
        let mut writer = CacheIRWriter::new(CacheKind::BinaryArith);
        let lhs = writer.guard_to_int32(writer.input_val(0));
        let rhs = writer.guard_is_number(writer.input_val(1));
        writer.double_add_result(lhs.as_number(), rhs);
        writer.return_from_ic();
        assert!(writer.validate().is_ok());
    }

    #[test]
    fn test_stub_field_types_are_checked() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.guard_specific_object(obj, ObjectId::new(2));
        writer.return_from_ic();
        let err = ValidatedCacheIR::new(
            CacheKind::GetProp,
            writer.code(),
            &[StubFieldType::Shape],
        )
        .unwrap_err();
        assert!(matches!(err, CacheIRError::StubFieldMismatch { offset: 0, .. }));
    }

    fn call_writer(flags: CallFlags) -> CacheIRWriter {
        let mut writer = CacheIRWriter::new(CacheKind::Call);
        let argc = writer.input_argc();
        let callee = writer.load_argument_fixed_slot(2);
        let callee = writer.guard_to_object(callee);
        writer.call_scripted_function(callee, argc, flags);
        writer.type_monitor_result();
        writer
    }

    #[test]
    fn test_apply_arguments_is_rejected() {
        let writer = call_writer(CallFlags::new(ArgFormat::FunApplyArgs));
        assert_eq!(
            writer.validate().unwrap_err(),
            CacheIRError::UnsupportedArgFormat(ArgFormat::FunApplyArgs)
        );
        let writer = call_writer(CallFlags::new(ArgFormat::Unknown));
        assert_eq!(
            writer.validate().unwrap_err(),
            CacheIRError::UnsupportedArgFormat(ArgFormat::Unknown)
        );
    }

    #[test]
    fn test_apply_array_is_accepted() {
        let writer = call_writer(CallFlags::new(ArgFormat::FunApplyArray));
        assert!(writer.validate().is_ok());
    }

    #[test]
    fn test_bad_immediate() {
        let mut writer = CacheIRWriter::new(CacheKind::Compare);
        let lhs = writer.guard_to_int32(writer.input_val(0));
        let rhs = writer.guard_to_int32(writer.input_val(1));
        writer.compare_int32_result(JSOp::Eq, lhs, rhs);
        writer.return_from_ic();
        let mut code = writer.code().to_vec();
        code[5] = 42;
        assert!(matches!(
            ValidatedCacheIR::new(CacheKind::Compare, &code, &[]),
            Err(CacheIRError::InvalidImmediate { what: "JSOp", byte: 42 })
        ));
    }
}
