//! Graph construction from a snapshot
//!
//! [`WarpBuilder`] opens one block per monomorphic site of a
//! [`WarpSnapshot`] and transpiles the site's CacheIR into it. Sites left
//! polymorphic or stubless get no block and stay generic ICs.

use otter_cacheir::CacheKind;
use rustc_hash::FxHashMap;

use crate::call_info::CallInfo;
use crate::error::{TranspileError, TranspileResult};
use crate::mir::{BlockId, MBasicBlock, MDefinitionId, MirGraph, MirType};
use crate::options::WarpOptions;
use crate::snapshot::{WarpCacheIR, WarpSnapshot};
use crate::transpiler::transpile_cache_ir;

/// MIR built from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpCompilation {
    graph: MirGraph,
    sites: FxHashMap<u32, BlockId>,
}

impl WarpCompilation {
    /// The graph.
    pub fn graph(&self) -> &MirGraph {
        &self.graph
    }

    /// Block transpiled for the site at `pc`.
    pub fn block_for(&self, pc: u32) -> Option<BlockId> {
        self.sites.get(&pc).copied()
    }

    /// The block for the site at `pc`.
    pub fn block(&self, pc: u32) -> Option<&MBasicBlock> {
        self.block_for(pc).map(|id| self.graph.block(id))
    }

    /// Number of transpiled sites.
    pub fn num_sites(&self) -> usize {
        self.sites.len()
    }
}

/// Builds MIR from snapshots.
#[derive(Debug, Clone, Copy)]
pub struct WarpBuilder {
    options: WarpOptions,
}

impl WarpBuilder {
    /// Builder with `options`.
    pub fn new(options: WarpOptions) -> Self {
        Self { options }
    }

    /// Transpile every monomorphic site of `snapshot`.
    pub fn build(&self, snapshot: &WarpSnapshot) -> TranspileResult<WarpCompilation> {
        let mut graph = MirGraph::new(self.options.max_mir_nodes);
        let mut sites = FxHashMap::default();

        for site in snapshot.sites.iter().filter_map(|s| s.as_cache_ir()) {
            let block = build_site(&mut graph, site)?;
            sites.insert(site.pc, block);
        }

        tracing::debug!(
            target: "otter::warp",
            sites = sites.len(),
            instructions = graph.num_instructions(),
            "built MIR"
        );
        tracing::trace!(target: "otter::warp", "\n{graph}");
        Ok(WarpCompilation { graph, sites })
    }
}

fn build_site(graph: &mut MirGraph, site: &WarpCacheIR) -> TranspileResult<BlockId> {
    let block = graph.new_block(site.pc, site.kind)?;
    if site.kind == CacheKind::Call {
        let call_site = site.call_site.ok_or(TranspileError::MissingCallSite { pc: site.pc })?;
        let words = 2 + call_site.argc + call_site.constructing as u32;
        let inputs = add_inputs(graph, block, words)?;
        let mut info = CallInfo::from_frame(&inputs, call_site.constructing);
        transpile_cache_ir(graph, block, site, &inputs, Some(&mut info))?;
        if let Some(call) = graph.block(block).inlined_call() {
            tracing::debug!(
                target: "otter::warp",
                pc = site.pc,
                ic_script = call.ic_script,
                argc = call.call_info.argc(),
                "callee body left for the inliner"
            );
        }
    } else {
        let inputs = add_inputs(graph, block, site.kind.num_inputs() as u32)?;
        transpile_cache_ir(graph, block, site, &inputs, None)?;
    }
    tracing::trace!(
        target: "otter::warp",
        pc = site.pc,
        kind = %site.kind,
        instructions = graph.block(block).instructions().len(),
        "transpiled site"
    );
    Ok(block)
}

fn add_inputs(graph: &mut MirGraph, block: BlockId, count: u32) -> TranspileResult<Vec<MDefinitionId>> {
    (0..count).map(|_| graph.add_input(block, MirType::Value)).collect()
}

#[cfg(test)]
mod tests {
    use otter_cacheir::{ArgFormat, CacheIRStubInfo, CacheIRWriter, CallFlags, ICStubEngine};
    use otter_vm_core::{ObjectId, ShapeId};

    use super::*;
    use crate::mir::{CallTargetKind, MirOp};
    use crate::snapshot::{CallSite, WarpOpSnapshot};

    fn site(pc: u32, writer: &CacheIRWriter, call_site: Option<CallSite>) -> WarpOpSnapshot {
        let ir = writer.validate().unwrap();
        WarpOpSnapshot::CacheIR(WarpCacheIR {
            pc,
            kind: ir.kind(),
            stub_info: CacheIRStubInfo::new(ir.kind(), ICStubEngine::Baseline, false, ir.code(), ir.field_types()),
            stub_data: writer.copy_stub_data().into_boxed_slice(),
            call_site,
        })
    }

    fn shape_load() -> CacheIRWriter {
        let mut writer = CacheIRWriter::new(CacheKind::GetProp);
        let obj = writer.guard_to_object(writer.input_val(0));
        writer.guard_shape(obj, ShapeId::new(2));
        writer.load_fixed_slot_result(obj, 8);
        writer.return_from_ic();
        writer
    }

    #[test]
    fn one_block_per_monomorphic_site() {
        let snapshot = WarpSnapshot {
            sites: vec![
                site(3, &shape_load(), None),
                WarpOpSnapshot::Polymorphic { pc: 8, kind: CacheKind::GetProp, num_stubs: 2 },
                WarpOpSnapshot::NoStubs { pc: 12, kind: CacheKind::Compare },
                site(20, &shape_load(), None),
            ],
        };
        let compilation = WarpBuilder::new(WarpOptions::default()).build(&snapshot).unwrap();
        assert_eq!(compilation.num_sites(), 2);
        assert!(compilation.block_for(8).is_none());
        let block = compilation.block(20).unwrap();
        assert_eq!(block.pc(), 20);
        assert_eq!(block.num_inputs(), 1);
        assert!(block.result().is_some());
    }

    fn scripted_call(slot: u8) -> CacheIRWriter {
        let mut writer = CacheIRWriter::new(CacheKind::Call);
        let argc = writer.input_argc();
        let callee = writer.load_argument_fixed_slot(slot);
        let callee = writer.guard_to_object(callee);
        writer.guard_specific_function(callee, ObjectId::new(9), 0);
        writer.call_scripted_function(callee, argc, CallFlags::new(ArgFormat::Standard));
        writer.type_monitor_result();
        writer
    }

    #[test]
    fn call_site_inputs_cover_the_frame() {
        let call_site = CallSite::new(2, false);
        let snapshot = WarpSnapshot { sites: vec![site(5, &scripted_call(3), Some(call_site))] };
        let compilation = WarpBuilder::new(WarpOptions::default()).build(&snapshot).unwrap();
        let block = compilation.block(5).unwrap();
        assert_eq!(block.num_inputs(), 4);
        assert_eq!(block.num_effectful(), 1);

        let call = block
            .instructions()
            .iter()
            .find_map(|ins| match ins.op() {
                MirOp::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();
        let params: Vec<_> = block.instructions()[..4].iter().map(|ins| ins.id()).collect();
        assert_eq!(call.args.as_slice(), &params[2..]);
        assert_eq!(call.this, params[1]);
        assert_eq!(call.target, CallTargetKind::Scripted);
    }

    #[test]
    fn template_object_allocates_this() {
        // new F(a): new.target, a, this, F
        let mut writer = CacheIRWriter::new(CacheKind::Call);
        let argc = writer.input_argc();
        let callee = writer.load_argument_fixed_slot(3);
        let callee = writer.guard_to_object(callee);
        writer.guard_specific_function(callee, ObjectId::new(9), 0);
        writer.meta_scripted_template_object(ObjectId::new(9), ObjectId::new(4));
        writer.call_scripted_function(callee, argc, CallFlags::constructing(ArgFormat::Standard));
        writer.type_monitor_result();

        let snapshot = WarpSnapshot { sites: vec![site(5, &writer, Some(CallSite::new(1, true)))] };
        let compilation = WarpBuilder::new(WarpOptions::default()).build(&snapshot).unwrap();
        let block = compilation.block(5).unwrap();
        let create = block
            .instructions()
            .iter()
            .find(|ins| matches!(ins.op(), MirOp::CreateThisWithTemplate { .. }))
            .unwrap();
        assert!(matches!(
            create.op(),
            MirOp::CreateThisWithTemplate { template, .. } if *template == ObjectId::new(4)
        ));
        assert!(!block.instructions().iter().any(|ins| matches!(ins.op(), MirOp::CreateThis { .. })));
        let call = block
            .instructions()
            .iter()
            .find_map(|ins| match ins.op() {
                MirOp::Call(call) => Some(call),
                _ => None,
            })
            .unwrap();
        assert_eq!(call.this, create.id());
        assert!(call.constructing);
    }

    fn inlined_call() -> CacheIRWriter {
        let mut writer = CacheIRWriter::new(CacheKind::Call);
        let argc = writer.input_argc();
        let callee = writer.load_argument_fixed_slot(3);
        let callee = writer.guard_to_object(callee);
        writer.guard_specific_function(callee, ObjectId::new(9), 0);
        writer.call_inlined_function(callee, argc, 42, CallFlags::new(ArgFormat::Standard));
        writer.type_monitor_result();
        writer
    }

    #[test]
    fn inlined_call_keeps_guards_and_emits_no_call() {
        let call_site = CallSite { inlined: true, ..CallSite::new(2, false) };
        let snapshot = WarpSnapshot { sites: vec![site(5, &inlined_call(), Some(call_site))] };
        let compilation = WarpBuilder::new(WarpOptions::default()).build(&snapshot).unwrap();
        let block = compilation.block(5).unwrap();

        assert_eq!(block.num_effectful(), 0);
        assert_eq!(block.result(), None);
        assert!(block.instructions().iter().any(|ins| matches!(ins.op(), MirOp::GuardSpecificFunction { .. })));
        assert!(!block.instructions().iter().any(|ins| matches!(ins.op(), MirOp::Call(_))));

        let inlined = block.inlined_call().unwrap();
        let params: Vec<_> = block.instructions()[..4].iter().map(|ins| ins.id()).collect();
        assert_eq!(inlined.ic_script, 42);
        assert_eq!(inlined.call_info.args(), &params[2..]);
        assert_eq!(inlined.call_info.this(), params[1]);
        assert_ne!(inlined.call_info.callee(), params[0]);
    }

    #[test]
    fn call_inlined_function_without_decision_is_a_call() {
        let snapshot = WarpSnapshot { sites: vec![site(5, &inlined_call(), Some(CallSite::new(2, false)))] };
        let compilation = WarpBuilder::new(WarpOptions::default()).build(&snapshot).unwrap();
        let block = compilation.block(5).unwrap();
        assert!(block.inlined_call().is_none());
        assert_eq!(block.num_effectful(), 1);
        assert!(block.result().is_some());
    }

    #[test]
    fn call_site_without_shape_is_rejected() {
        let snapshot = WarpSnapshot { sites: vec![site(5, &scripted_call(3), None)] };
        assert_eq!(
            WarpBuilder::new(WarpOptions::default()).build(&snapshot),
            Err(TranspileError::MissingCallSite { pc: 5 })
        );
    }

    #[test]
    fn node_limit_abandons_the_build() {
        let snapshot = WarpSnapshot { sites: vec![site(3, &shape_load(), None)] };
        let options = WarpOptions::default().with_max_mir_nodes(2);
        assert_eq!(
            WarpBuilder::new(options).build(&snapshot),
            Err(TranspileError::TooManyNodes { limit: 2 })
        );
    }
}
