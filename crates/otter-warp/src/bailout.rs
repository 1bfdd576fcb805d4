//! Bailout bookkeeping
//!
//! A failed guard ends execution of a block. The interpreter reports which
//! family of assumption broke so a driver can decide when a script has
//! bailed often enough to be recompiled.

use std::fmt;

use crate::mir::MirOp;

/// Family of a failed assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BailoutKind {
    /// A value had an unexpected type tag
    Type,
    /// An object had an unexpected shape, group, class or prototype
    Shape,
    /// A specific object, function, atom or symbol did not match
    Identity,
    /// An index was out of range or hit a hole
    Bounds,
    /// Int32 arithmetic left the int32 range
    Overflow,
    /// Storage could not grow in place
    Capacity,
    /// A generic lookup took a path that needs the VM
    Lookup,
}

impl BailoutKind {
    /// Number of kinds.
    pub const COUNT: usize = 7;

    /// Every kind.
    pub const ALL: [BailoutKind; Self::COUNT] = [
        BailoutKind::Type,
        BailoutKind::Shape,
        BailoutKind::Identity,
        BailoutKind::Bounds,
        BailoutKind::Overflow,
        BailoutKind::Capacity,
        BailoutKind::Lookup,
    ];

    /// Kind of bailout `op` takes when its guard fails.
    ///
    /// # Panics
    ///
    /// If `op` cannot bail out.
    pub fn of(op: &MirOp) -> Self {
        match op {
            MirOp::Unbox { .. }
            | MirOp::GuardValue { .. }
            | MirOp::GuardNullOrUndefined { .. }
            | MirOp::GuardNumber { .. }
            | MirOp::ToNumberInt32 { .. } => BailoutKind::Type,
            MirOp::GuardShape { .. }
            | MirOp::GuardObjectGroup { .. }
            | MirOp::GuardToClass { .. }
            | MirOp::GuardProto { .. }
            | MirOp::GuardNullProto { .. }
            | MirOp::GuardIsProxy { .. }
            | MirOp::GuardIsNotProxy { .. }
            | MirOp::ObjectStaticProto { .. } => BailoutKind::Shape,
            MirOp::GuardObjectIdentity { .. }
            | MirOp::GuardSpecificFunction { .. }
            | MirOp::GuardSpecificAtom { .. }
            | MirOp::GuardSpecificSymbol { .. }
            | MirOp::GuardFunctionFlags { .. }
            | MirOp::GuardFunctionHasJitEntry { .. }
            | MirOp::GuardFunctionHasNoJitEntry { .. } => BailoutKind::Identity,
            MirOp::GuardNoDenseElements { .. }
            | MirOp::GuardArrayIsPacked { .. }
            | MirOp::GuardInt32IsNonNegative { .. }
            | MirOp::BoundsCheck { .. }
            | MirOp::LoadElement { .. }
            | MirOp::LoadElementHole { .. }
            | MirOp::GuardElementNotHole { .. }
            | MirOp::CharCodeAt { .. }
            | MirOp::ArrayLength { .. } => BailoutKind::Bounds,
            MirOp::Add { .. }
            | MirOp::Sub { .. }
            | MirOp::Mul { .. }
            | MirOp::Div { .. }
            | MirOp::Mod { .. }
            | MirOp::Abs { .. }
            | MirOp::Ursh { .. }
            | MirOp::Floor { .. } => BailoutKind::Overflow,
            MirOp::GrowSlots { .. } | MirOp::GuardStoreElementHole { .. } | MirOp::GuardArrayPush { .. } => {
                BailoutKind::Capacity
            }
            MirOp::MegamorphicLoadSlot { .. } | MirOp::MegamorphicHasProp { .. } => BailoutKind::Lookup,
            other => panic!("{} cannot bail out", other.name()),
        }
    }

    /// Kind name.
    pub const fn name(self) -> &'static str {
        match self {
            BailoutKind::Type => "type",
            BailoutKind::Shape => "shape",
            BailoutKind::Identity => "identity",
            BailoutKind::Bounds => "bounds",
            BailoutKind::Overflow => "overflow",
            BailoutKind::Capacity => "capacity",
            BailoutKind::Lookup => "lookup",
        }
    }
}

impl fmt::Display for BailoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bailout counts per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BailoutCounts {
    counts: [u64; BailoutKind::COUNT],
}

impl BailoutCounts {
    /// Count one bailout.
    pub fn record(&mut self, kind: BailoutKind) {
        self.counts[kind as usize] += 1;
    }

    /// Bailouts of `kind`.
    pub fn get(&self, kind: BailoutKind) -> u64 {
        self.counts[kind as usize]
    }

    /// All bailouts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::MirType;

    #[test]
    fn counts_accumulate_per_kind() {
        let mut counts = BailoutCounts::default();
        counts.record(BailoutKind::Shape);
        counts.record(BailoutKind::Shape);
        counts.record(BailoutKind::Overflow);
        assert_eq!(counts.get(BailoutKind::Shape), 2);
        assert_eq!(counts.get(BailoutKind::Type), 0);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn guards_map_to_families() {
        use otter_cacheir::CacheKind;
        use otter_vm_core::ShapeId;

        let mut graph = crate::mir::MirGraph::new(8);
        let block = graph.new_block(0, CacheKind::GetProp).unwrap();
        let v = graph.add_input(block, MirType::Value).unwrap();
        assert_eq!(BailoutKind::of(&MirOp::Unbox { input: v, ty: MirType::Object }), BailoutKind::Type);
        assert_eq!(BailoutKind::of(&MirOp::GuardShape { obj: v, shape: ShapeId::new(1) }), BailoutKind::Shape);
        assert_eq!(BailoutKind::of(&MirOp::BoundsCheck { index: v, length: v }), BailoutKind::Bounds);
        assert_eq!(
            BailoutKind::of(&MirOp::Mul { lhs: v, rhs: v, specialization: MirType::Int32 }),
            BailoutKind::Overflow
        );
        assert_eq!(BailoutKind::of(&MirOp::GuardArrayPush { obj: v }), BailoutKind::Capacity);
    }

    #[test]
    #[should_panic(expected = "cannot bail out")]
    fn pure_ops_have_no_kind() {
        BailoutKind::of(&MirOp::Constant(otter_vm_core::Value::NULL));
    }
}
