//! Disassembler for CacheIR programs

use std::fmt::Write;

use tracing::trace;

use crate::args::ArgKind;
use crate::error::Result;
use crate::ops::OpOutput;
use crate::reader::CacheIRReader;
use crate::stub_info::{CacheIRStubInfo, read_stub_word};

/// Render a program, one instruction per line. With `stub_data`, field
/// arguments show their current values.
pub fn disassemble(info: &CacheIRStubInfo, stub_data: Option<&[u8]>) -> Result<String> {
    let mut out = String::new();
    let mut reader = CacheIRReader::new(info.code());
    while reader.more() {
        let op = reader.read_op()?;
        let _ = write!(out, "{:3}: {}", reader.instruction_index(), op.name());
        for (kind, name) in op.arg_kinds().iter().zip(op.arg_names()) {
            let bits = reader.read_arg(*kind)?;
            let _ = write!(out, " {name}=");
            format_arg(&mut out, *kind, bits, stub_data);
        }
        if let OpOutput::Def(kind) = op.output() {
            let id = reader.read_arg(kind)?;
            let _ = write!(out, " -> {id}");
        }
        out.push('\n');
    }
    Ok(out)
}

fn format_arg(out: &mut String, kind: ArgKind, bits: u64, stub_data: Option<&[u8]>) {
    if kind.operand_type().is_some() {
        let _ = write!(out, "%{bits}");
    } else if let Some(ty) = kind.field_type() {
        let _ = write!(out, "[{bits}]");
        if let Some(data) = stub_data {
            let _ = write!(out, "({ty:?} {:#x})", read_stub_word(data, bits as u32));
        }
    } else {
        match kind {
            ArgKind::Int32Imm => {
                let _ = write!(out, "{}", bits as u32 as i32);
            }
            ArgKind::Bool => out.push_str(if bits != 0 { "true" } else { "false" }),
            _ => {
                let _ = write!(out, "{bits}");
            }
        }
    }
}

/// Log a program at trace level under `otter::cacheir`.
pub fn spew(info: &CacheIRStubInfo, stub_data: &[u8]) {
    if !tracing::enabled!(target: "otter::cacheir", tracing::Level::TRACE) {
        return;
    }
    match disassemble(info, Some(stub_data)) {
        Ok(text) => trace!(target: "otter::cacheir", kind = %info.kind(), "\n{text}"),
        Err(err) => trace!(target: "otter::cacheir", %err, "undecodable program"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{CacheKind, ICStubEngine};
    use crate::writer::CacheIRWriter;
    use otter_vm_core::ShapeId;

    #[test]
    fn test_disassemble() {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.guard_shape(obj, ShapeId::new(5));
        let len = writer.load_int32_array_length(obj);
        writer.load_int32_result(len);
        writer.return_from_ic();
        let info = CacheIRStubInfo::new(
            CacheKind::GetProp,
            ICStubEngine::Baseline,
            false,
            writer.code(),
            &writer.stub_field_types(),
        );
        let text = disassemble(&info, Some(&writer.copy_stub_data())).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  0: GuardToObject input=%0");
        assert_eq!(lines[1], "  1: GuardShape obj=%0 shape=[0](Shape 0x5)");
        assert_eq!(lines[2], "  2: LoadInt32ArrayLength obj=%0 -> 1");
        assert_eq!(lines[4], "  4: ReturnFromIc");
    }
}
