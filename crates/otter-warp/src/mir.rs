//! Mid-level IR
//!
//! A [`MirGraph`] holds one [`MBasicBlock`] per transpiled IC site. Every
//! instruction defines one SSA value ([`MDefinitionId`]) of a [`MirType`].
//! Guards carry the `guard` flag and bail out when their assumption fails;
//! effectful instructions carry the [`MResumePoint`] describing the
//! interpreter state after them.
//!
//! ```text
//! block0 pc=12 GetProp  entry: resume-at 12 [v0]
//!   v0 = Parameter(0)              Value
//!   v1 = Unbox(v0, Object)         Object  guard
//!   v2 = GuardShape(v1, shape#3)   Object  guard
//!   v3 = LoadFixedSlot(v2, 24)     Value
//! ```

use std::fmt;

use otter_cacheir::{CacheKind, JSOp, UnaryMathFunction};
use otter_vm_core::{
    ClassId, FunctionFlags, GroupId, ObjectId, PropertyKey, ShapeId, StringId, SymbolId, Value,
    ValueType,
};
use smallvec::{SmallVec, smallvec};

use crate::call_info::CallInfo;
use crate::error::{TranspileError, TranspileResult};

/// An SSA value: the instruction that defines it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MDefinitionId(u32);

impl MDefinitionId {
    /// Graph-wide index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A basic block of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    /// Index in [`MirGraph::blocks`].
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// Type of an SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirType {
    /// Boxed, any type
    Value,
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Unboxed boolean
    Boolean,
    /// Unboxed int32
    Int32,
    /// Unboxed double
    Double,
    /// String
    String,
    /// Symbol
    Symbol,
    /// BigInt
    BigInt,
    /// Object
    Object,
    /// Magic value (holes)
    Magic,
    /// No value (stores, barriers)
    None,
}

impl MirType {
    /// MIR type of a value tag.
    pub fn from_value_type(ty: ValueType) -> Self {
        match ty {
            ValueType::Undefined => MirType::Undefined,
            ValueType::Null => MirType::Null,
            ValueType::Boolean => MirType::Boolean,
            ValueType::Int32 => MirType::Int32,
            ValueType::Double => MirType::Double,
            ValueType::String => MirType::String,
            ValueType::Symbol => MirType::Symbol,
            ValueType::BigInt => MirType::BigInt,
            ValueType::Object => MirType::Object,
            ValueType::Magic => MirType::Magic,
        }
    }

    /// Whether a boxed value of tag `ty` has this type.
    pub fn matches(self, ty: ValueType) -> bool {
        match self {
            MirType::Value => true,
            MirType::None => false,
            other => MirType::from_value_type(ty) == other,
        }
    }

    /// Type name.
    pub const fn name(self) -> &'static str {
        match self {
            MirType::Value => "Value",
            MirType::Undefined => "Undefined",
            MirType::Null => "Null",
            MirType::Boolean => "Boolean",
            MirType::Int32 => "Int32",
            MirType::Double => "Double",
            MirType::String => "String",
            MirType::Symbol => "Symbol",
            MirType::BigInt => "BigInt",
            MirType::Object => "Object",
            MirType::Magic => "Magic",
            MirType::None => "None",
        }
    }
}

impl fmt::Display for MirType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operand types of an [`MirOp::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareType {
    /// Two int32s
    Int32,
    /// Two numbers
    Double,
    /// Two strings
    String,
    /// Two objects, by identity
    Object,
    /// Two symbols, by identity
    Symbol,
    /// A value against `null`
    Null,
    /// A value against `undefined`
    Undefined,
}

/// Where an added property lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Inline slot
    Fixed,
    /// Out-of-line slot
    Dynamic,
}

/// How a call enters its callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTargetKind {
    /// JIT entry, padding missing formals with `undefined`
    Scripted,
    /// Native entry; may collect
    Native,
    /// Native DOM method with a known `this`
    Dom,
}

/// A call with its final argument shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MCall {
    /// Function called
    pub callee: MDefinitionId,
    /// `this`
    pub this: MDefinitionId,
    /// Arguments, in order
    pub args: SmallVec<[MDefinitionId; 4]>,
    /// `new.target` of a constructing call
    pub new_target: Option<MDefinitionId>,
    /// How the callee is entered
    pub target: CallTargetKind,
    /// `new` call; a primitive result is replaced by `this`
    pub constructing: bool,
    /// Callee is known to share the caller's realm
    pub same_realm: bool,
}

/// A call the oracle chose to inline. The block keeps the call's guards
/// and rewritten operands; the callee's body is spliced in after it.
#[derive(Debug, Clone, PartialEq)]
pub struct MInlinedCall {
    /// IC script of the callee, as recorded in the stub
    pub ic_script: u32,
    /// Operands after argument-format rewriting
    pub call_info: CallInfo,
    /// Callee is known to share the caller's realm
    pub same_realm: bool,
}

/// What an instruction computes.
#[derive(Debug, Clone, PartialEq)]
pub enum MirOp {
    // Inputs
    /// Input operand `index` of the IC site.
    Parameter {
        /// Position among the site's inputs
        index: u32,
    },
    /// A constant.
    Constant(Value),

    // Unboxing and type guards
    /// Unbox to `ty`; bails on any other tag.
    Unbox {
        /// Operand
        input: MDefinitionId,
        /// Expected type
        ty: MirType,
    },
    /// Bails unless the value is bit-identical to `expected`.
    GuardValue {
        /// Operand
        input: MDefinitionId,
        /// Required value
        expected: Value,
    },
    /// Bails unless `null` or `undefined`.
    GuardNullOrUndefined {
        /// Operand
        input: MDefinitionId,
    },
    /// Bails unless a number; the value stays boxed.
    GuardNumber {
        /// Operand
        input: MDefinitionId,
    },
    /// Int32 from an int32 or an exactly representable double.
    ToNumberInt32 {
        /// Operand
        input: MDefinitionId,
    },
    /// `0` or `1`.
    BooleanToInt32 {
        /// Operand
        input: MDefinitionId,
    },

    // Object guards
    /// Bails unless the shape matches.
    GuardShape {
        /// Object operand
        obj: MDefinitionId,
        /// Required shape
        shape: ShapeId,
    },
    /// Bails unless the group matches.
    GuardObjectGroup {
        /// Object operand
        obj: MDefinitionId,
        /// Required group
        group: GroupId,
    },
    /// Bails unless the class matches.
    GuardToClass {
        /// Object operand
        obj: MDefinitionId,
        /// Required class
        class: ClassId,
    },
    /// Bails unless the prototype is `expected`.
    GuardProto {
        /// Object operand
        obj: MDefinitionId,
        /// Required prototype
        expected: ObjectId,
    },
    /// Bails unless the prototype is null.
    GuardNullProto {
        /// Object operand
        obj: MDefinitionId,
    },
    /// Bails unless a proxy.
    GuardIsProxy {
        /// Object operand
        obj: MDefinitionId,
    },
    /// Bails on a proxy.
    GuardIsNotProxy {
        /// Object operand
        obj: MDefinitionId,
    },
    /// Bails unless the object is `expected`.
    GuardObjectIdentity {
        /// Object operand
        obj: MDefinitionId,
        /// Required object
        expected: ObjectId,
    },
    /// Bails unless the function is `expected`; keeps its arity and flags
    /// for call specialization.
    GuardSpecificFunction {
        /// Function operand
        fun: MDefinitionId,
        /// Required function
        expected: ObjectId,
        /// Declared formal count of `expected`
        nargs: u16,
        /// Function flags of `expected`
        flags: u16,
    },
    /// Bails unless the string is `atom`.
    GuardSpecificAtom {
        /// String operand
        str: MDefinitionId,
        /// Required atom
        atom: StringId,
    },
    /// Bails unless the symbol is `expected`.
    GuardSpecificSymbol {
        /// Symbol operand
        sym: MDefinitionId,
        /// Required symbol
        expected: SymbolId,
    },
    /// Bails if any dense element is initialized.
    GuardNoDenseElements {
        /// Object operand
        obj: MDefinitionId,
    },
    /// Bails if the elements may contain holes.
    GuardArrayIsPacked {
        /// Array operand
        array: MDefinitionId,
    },
    /// Bails unless all `expected` and none of `unexpected` flags are set.
    GuardFunctionFlags {
        /// Function operand
        fun: MDefinitionId,
        /// Flags that must be set
        expected: FunctionFlags,
        /// Flags that must be clear
        unexpected: FunctionFlags,
    },
    /// Bails unless the function has a JIT entry.
    GuardFunctionHasJitEntry {
        /// Function operand
        fun: MDefinitionId,
    },
    /// Bails if the function has a JIT entry.
    GuardFunctionHasNoJitEntry {
        /// Function operand
        fun: MDefinitionId,
    },
    /// Bails on a negative int32.
    GuardInt32IsNonNegative {
        /// Int32 index
        index: MDefinitionId,
    },

    // Loads
    /// Prototype; bails on null.
    ObjectStaticProto {
        /// Object operand
        obj: MDefinitionId,
    },
    /// `Math.min`/`Math.max`.
    MinMax {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// `Math.max` rather than `Math.min`
        is_max: bool,
        /// Int32 or Double
        specialization: MirType,
    },
    /// Array length as an int32; bails when it does not fit.
    ArrayLength {
        /// Object operand
        obj: MDefinitionId,
    },
    /// Initialized length of the dense elements.
    InitializedLength {
        /// Object operand
        obj: MDefinitionId,
    },
    /// Bails unless `0 <= index < length`.
    BoundsCheck {
        /// Int32 index
        index: MDefinitionId,
        /// Exclusive upper bound
        length: MDefinitionId,
    },
    /// Dense element below the initialized length.
    LoadElement {
        /// Object operand
        obj: MDefinitionId,
        /// Int32 index
        index: MDefinitionId,
        /// Bail on a hole
        needs_hole_check: bool,
    },
    /// Dense element, `undefined` for holes and indices past the end;
    /// bails on negative indices.
    LoadElementHole {
        /// Object operand
        obj: MDefinitionId,
        /// Int32 index
        index: MDefinitionId,
    },
    /// Inline slot at a byte offset.
    LoadFixedSlot {
        /// Object operand
        obj: MDefinitionId,
        /// Byte offset of the slot
        offset: u32,
    },
    /// Out-of-line slot at a byte offset.
    LoadDynamicSlot {
        /// Object operand
        obj: MDefinitionId,
        /// Byte offset of the slot
        offset: u32,
    },
    /// String length.
    StringLength {
        /// String operand
        str: MDefinitionId,
    },
    /// UTF-16 code unit; the index is bounds-checked.
    CharCodeAt {
        /// String operand
        str: MDefinitionId,
        /// Int32 index
        index: MDefinitionId,
    },
    /// One-unit string.
    FromCharCode {
        /// UTF-16 code unit
        code: MDefinitionId,
    },
    /// `typeof`.
    TypeOf {
        /// Operand
        input: MDefinitionId,
    },
    /// `!ToBoolean(input)`.
    Not {
        /// Operand
        input: MDefinitionId,
    },
    /// Whether the value is an object.
    IsObject {
        /// Operand
        input: MDefinitionId,
    },
    /// Whether the value is callable.
    IsCallable {
        /// Operand
        input: MDefinitionId,
    },
    /// Whether the object's class is `class`.
    HasClass {
        /// Object operand
        obj: MDefinitionId,
        /// Class to test for
        class: ClassId,
    },

    // Arithmetic
    /// `lhs + rhs`; the int32 form bails on overflow.
    Add {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// Int32 or Double
        specialization: MirType,
    },
    /// `lhs - rhs`; the int32 form bails on overflow.
    Sub {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// Int32 or Double
        specialization: MirType,
    },
    /// `lhs * rhs`; the int32 form bails on overflow and `-0`.
    Mul {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// Int32 or Double
        specialization: MirType,
    },
    /// `lhs / rhs`; the int32 form bails unless the quotient is exact.
    Div {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// Int32 or Double
        specialization: MirType,
    },
    /// `lhs % rhs`; the int32 form bails on a zero divisor and `-0`.
    Mod {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// Int32 or Double
        specialization: MirType,
    },
    /// `lhs ** rhs`.
    Pow {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
    },
    /// `lhs | rhs`.
    BitOr {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
    },
    /// `lhs ^ rhs`.
    BitXor {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
    },
    /// `lhs & rhs`.
    BitAnd {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
    },
    /// `lhs << rhs`.
    Lsh {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
    },
    /// `lhs >> rhs`.
    Rsh {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
    },
    /// `lhs >>> rhs`; with `bailout` results above `i32::MAX` bail,
    /// otherwise the result is a double.
    Ursh {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// Bail instead of producing a double
        bailout: bool,
    },
    /// `~input`.
    BitNot {
        /// Operand
        input: MDefinitionId,
    },
    /// `Math.abs`; the int32 form bails on `i32::MIN`.
    Abs {
        /// Operand
        input: MDefinitionId,
        /// Int32 or Double
        specialization: MirType,
    },
    /// `Math.sqrt`.
    Sqrt {
        /// Operand
        input: MDefinitionId,
    },
    /// `Math.floor` to an int32; bails when out of range or `-0`.
    Floor {
        /// Operand
        input: MDefinitionId,
    },
    /// Unary `Math` function.
    MathFunction {
        /// Operand
        input: MDefinitionId,
        /// Function to apply
        fun: UnaryMathFunction,
    },
    /// Number as a double.
    ToDouble {
        /// Operand
        input: MDefinitionId,
    },
    /// Comparison producing a boolean.
    Compare {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
        /// JS comparison operator
        op: JSOp,
        /// Operand representation
        compare_type: CompareType,
    },
    /// String concatenation.
    Concat {
        /// Left operand
        lhs: MDefinitionId,
        /// Right operand
        rhs: MDefinitionId,
    },

    // Stores
    /// Generational barrier for storing `value` into `obj`.
    PostWriteBarrier {
        /// Object operand
        obj: MDefinitionId,
        /// Value to store
        value: MDefinitionId,
    },
    /// Overwrite an inline slot.
    StoreFixedSlot {
        /// Object operand
        obj: MDefinitionId,
        /// Byte offset of the slot
        offset: u32,
        /// Value to store
        value: MDefinitionId,
    },
    /// Overwrite an out-of-line slot.
    StoreDynamicSlot {
        /// Object operand
        obj: MDefinitionId,
        /// Byte offset of the slot
        offset: u32,
        /// Value to store
        value: MDefinitionId,
    },
    /// Grow the out-of-line slots to `capacity`; bails when that fails.
    GrowSlots {
        /// Object operand
        obj: MDefinitionId,
        /// Required slot count
        capacity: u32,
    },
    /// Add a property: switch group and shape, then store.
    AddAndStoreSlot {
        /// Object operand
        obj: MDefinitionId,
        /// Byte offset of the slot
        offset: u32,
        /// Value to store
        value: MDefinitionId,
        /// Fixed or dynamic slot
        kind: SlotKind,
        /// Shape after the add
        new_shape: ShapeId,
        /// Group after the add, when it changes
        new_group: Option<GroupId>,
    },
    /// Bails if the element is a hole.
    GuardElementNotHole {
        /// Object operand
        obj: MDefinitionId,
        /// Int32 index
        index: MDefinitionId,
    },
    /// Overwrite an initialized element.
    StoreElement {
        /// Object operand
        obj: MDefinitionId,
        /// Int32 index
        index: MDefinitionId,
        /// Value to store
        value: MDefinitionId,
    },
    /// Bails unless the element can be stored without leaving dense
    /// storage; ensures capacity for an append.
    GuardStoreElementHole {
        /// Object operand
        obj: MDefinitionId,
        /// Int32 index
        index: MDefinitionId,
        /// Allow an append at the initialized length
        handle_add: bool,
    },
    /// Store below the initialized length or append at it.
    StoreElementHole {
        /// Object operand
        obj: MDefinitionId,
        /// Int32 index
        index: MDefinitionId,
        /// Value to store
        value: MDefinitionId,
    },
    /// Bails unless the array can be pushed to in place; ensures capacity.
    GuardArrayPush {
        /// Object operand
        obj: MDefinitionId,
    },
    /// Append and return the new length.
    ArrayPush {
        /// Object operand
        obj: MDefinitionId,
        /// Pushed value
        value: MDefinitionId,
    },

    // Proxies and megamorphic access
    /// Proxy `[[Get]]`.
    ProxyGet {
        /// Proxy operand
        proxy: MDefinitionId,
        /// Property key
        id: PropertyKey,
    },
    /// Proxy `[[Get]]` of a computed key.
    ProxyGetByValue {
        /// Proxy operand
        proxy: MDefinitionId,
        /// Key operand
        id: MDefinitionId,
    },
    /// Proxy `[[HasProperty]]` or own-property check.
    ProxyHasProp {
        /// Proxy operand
        proxy: MDefinitionId,
        /// Key operand
        id: MDefinitionId,
        /// Own properties only
        has_own: bool,
    },
    /// Proxy `[[Set]]`.
    ProxySet {
        /// Proxy operand
        proxy: MDefinitionId,
        /// Property key
        id: PropertyKey,
        /// Assigned value
        value: MDefinitionId,
        /// Throw when the trap reports failure
        strict: bool,
    },
    /// Pure prototype-chain lookup; bails on proxies and accessors.
    MegamorphicLoadSlot {
        /// Object operand
        obj: MDefinitionId,
        /// Property key
        name: PropertyKey,
    },
    /// Generic `[[Set]]`.
    MegamorphicStoreSlot {
        /// Object operand
        obj: MDefinitionId,
        /// Property key
        name: PropertyKey,
        /// Assigned value
        value: MDefinitionId,
    },
    /// Pure `in`/own check; bails on proxies and impure keys.
    MegamorphicHasProp {
        /// Object operand
        obj: MDefinitionId,
        /// Key operand
        id: MDefinitionId,
        /// Own properties only
        has_own: bool,
    },

    // Calls
    /// Call a native getter.
    CallNativeGetter {
        /// Getter function
        getter: ObjectId,
        /// `this` for the call
        receiver: MDefinitionId,
        /// Callee shares the caller's realm
        same_realm: bool,
    },
    /// Call a native setter.
    CallNativeSetter {
        /// Setter function
        setter: ObjectId,
        /// `this` for the call
        receiver: MDefinitionId,
        /// Assigned value
        value: MDefinitionId,
        /// Callee shares the caller's realm
        same_realm: bool,
    },
    /// Allocate `this` for a constructing call.
    CreateThis {
        /// Function operand
        callee: MDefinitionId,
        /// `new.target`
        new_target: MDefinitionId,
        /// Callee shares the caller's realm
        same_realm: bool,
    },
    /// Allocate `this` with the layout of a constructor's template object.
    CreateThisWithTemplate {
        /// Function operand
        callee: MDefinitionId,
        /// Object whose layout `this` copies
        template: ObjectId,
        /// Callee shares the caller's realm
        same_realm: bool,
    },
    /// A call with an argument list.
    Call(Box<MCall>),
    /// `callee.apply(this, array)`: arguments are the array's dense elements.
    ApplyArray {
        /// Function operand
        callee: MDefinitionId,
        /// Array holding the arguments
        array: MDefinitionId,
        /// `this` for the call
        this: MDefinitionId,
        /// How the callee is entered
        target: CallTargetKind,
        /// Callee shares the caller's realm
        same_realm: bool,
    },
    /// `new callee(...array)`.
    ConstructArray {
        /// Function operand
        callee: MDefinitionId,
        /// Array holding the arguments
        array: MDefinitionId,
        /// `this` for the call
        this: MDefinitionId,
        /// `new.target`
        new_target: MDefinitionId,
        /// How the callee is entered
        target: CallTargetKind,
        /// Callee shares the caller's realm
        same_realm: bool,
    },
}

impl MirOp {
    /// Instruction name.
    pub fn name(&self) -> &'static str {
        match self {
            MirOp::Parameter { .. } => "Parameter",
            MirOp::Constant(_) => "Constant",
            MirOp::Unbox { .. } => "Unbox",
            MirOp::GuardValue { .. } => "GuardValue",
            MirOp::GuardNullOrUndefined { .. } => "GuardNullOrUndefined",
            MirOp::GuardNumber { .. } => "GuardNumber",
            MirOp::ToNumberInt32 { .. } => "ToNumberInt32",
            MirOp::BooleanToInt32 { .. } => "BooleanToInt32",
            MirOp::GuardShape { .. } => "GuardShape",
            MirOp::GuardObjectGroup { .. } => "GuardObjectGroup",
            MirOp::GuardToClass { .. } => "GuardToClass",
            MirOp::GuardProto { .. } => "GuardProto",
            MirOp::GuardNullProto { .. } => "GuardNullProto",
            MirOp::GuardIsProxy { .. } => "GuardIsProxy",
            MirOp::GuardIsNotProxy { .. } => "GuardIsNotProxy",
            MirOp::GuardObjectIdentity { .. } => "GuardObjectIdentity",
            MirOp::GuardSpecificFunction { .. } => "GuardSpecificFunction",
            MirOp::GuardSpecificAtom { .. } => "GuardSpecificAtom",
            MirOp::GuardSpecificSymbol { .. } => "GuardSpecificSymbol",
            MirOp::GuardNoDenseElements { .. } => "GuardNoDenseElements",
            MirOp::GuardArrayIsPacked { .. } => "GuardArrayIsPacked",
            MirOp::GuardFunctionFlags { .. } => "GuardFunctionFlags",
            MirOp::GuardFunctionHasJitEntry { .. } => "GuardFunctionHasJitEntry",
            MirOp::GuardFunctionHasNoJitEntry { .. } => "GuardFunctionHasNoJitEntry",
            MirOp::GuardInt32IsNonNegative { .. } => "GuardInt32IsNonNegative",
            MirOp::ObjectStaticProto { .. } => "ObjectStaticProto",
            MirOp::MinMax { .. } => "MinMax",
            MirOp::ArrayLength { .. } => "ArrayLength",
            MirOp::InitializedLength { .. } => "InitializedLength",
            MirOp::BoundsCheck { .. } => "BoundsCheck",
            MirOp::LoadElement { .. } => "LoadElement",
            MirOp::LoadElementHole { .. } => "LoadElementHole",
            MirOp::LoadFixedSlot { .. } => "LoadFixedSlot",
            MirOp::LoadDynamicSlot { .. } => "LoadDynamicSlot",
            MirOp::StringLength { .. } => "StringLength",
            MirOp::CharCodeAt { .. } => "CharCodeAt",
            MirOp::FromCharCode { .. } => "FromCharCode",
            MirOp::TypeOf { .. } => "TypeOf",
            MirOp::Not { .. } => "Not",
            MirOp::IsObject { .. } => "IsObject",
            MirOp::IsCallable { .. } => "IsCallable",
            MirOp::HasClass { .. } => "HasClass",
            MirOp::Add { .. } => "Add",
            MirOp::Sub { .. } => "Sub",
            MirOp::Mul { .. } => "Mul",
            MirOp::Div { .. } => "Div",
            MirOp::Mod { .. } => "Mod",
            MirOp::Pow { .. } => "Pow",
            MirOp::BitOr { .. } => "BitOr",
            MirOp::BitXor { .. } => "BitXor",
            MirOp::BitAnd { .. } => "BitAnd",
            MirOp::Lsh { .. } => "Lsh",
            MirOp::Rsh { .. } => "Rsh",
            MirOp::Ursh { .. } => "Ursh",
            MirOp::BitNot { .. } => "BitNot",
            MirOp::Abs { .. } => "Abs",
            MirOp::Sqrt { .. } => "Sqrt",
            MirOp::Floor { .. } => "Floor",
            MirOp::MathFunction { .. } => "MathFunction",
            MirOp::ToDouble { .. } => "ToDouble",
            MirOp::Compare { .. } => "Compare",
            MirOp::Concat { .. } => "Concat",
            MirOp::PostWriteBarrier { .. } => "PostWriteBarrier",
            MirOp::StoreFixedSlot { .. } => "StoreFixedSlot",
            MirOp::StoreDynamicSlot { .. } => "StoreDynamicSlot",
            MirOp::GrowSlots { .. } => "GrowSlots",
            MirOp::AddAndStoreSlot { .. } => "AddAndStoreSlot",
            MirOp::GuardElementNotHole { .. } => "GuardElementNotHole",
            MirOp::StoreElement { .. } => "StoreElement",
            MirOp::GuardStoreElementHole { .. } => "GuardStoreElementHole",
            MirOp::StoreElementHole { .. } => "StoreElementHole",
            MirOp::GuardArrayPush { .. } => "GuardArrayPush",
            MirOp::ArrayPush { .. } => "ArrayPush",
            MirOp::ProxyGet { .. } => "ProxyGet",
            MirOp::ProxyGetByValue { .. } => "ProxyGetByValue",
            MirOp::ProxyHasProp { .. } => "ProxyHasProp",
            MirOp::ProxySet { .. } => "ProxySet",
            MirOp::MegamorphicLoadSlot { .. } => "MegamorphicLoadSlot",
            MirOp::MegamorphicStoreSlot { .. } => "MegamorphicStoreSlot",
            MirOp::MegamorphicHasProp { .. } => "MegamorphicHasProp",
            MirOp::CallNativeGetter { .. } => "CallNativeGetter",
            MirOp::CallNativeSetter { .. } => "CallNativeSetter",
            MirOp::CreateThis { .. } => "CreateThis",
            MirOp::CreateThisWithTemplate { .. } => "CreateThisWithTemplate",
            MirOp::Call(_) => "Call",
            MirOp::ApplyArray { .. } => "ApplyArray",
            MirOp::ConstructArray { .. } => "ConstructArray",
        }
    }

    /// Whether the instruction has an observable side effect and needs a
    /// resume point.
    pub fn is_effectful(&self) -> bool {
        matches!(
            self,
            MirOp::StoreFixedSlot { .. }
                | MirOp::StoreDynamicSlot { .. }
                | MirOp::AddAndStoreSlot { .. }
                | MirOp::StoreElement { .. }
                | MirOp::StoreElementHole { .. }
                | MirOp::ArrayPush { .. }
                | MirOp::ProxyGet { .. }
                | MirOp::ProxyGetByValue { .. }
                | MirOp::ProxyHasProp { .. }
                | MirOp::ProxySet { .. }
                | MirOp::MegamorphicStoreSlot { .. }
                | MirOp::CallNativeGetter { .. }
                | MirOp::CallNativeSetter { .. }
                | MirOp::Call(_)
                | MirOp::ApplyArray { .. }
                | MirOp::ConstructArray { .. }
        )
    }

    /// Whether the instruction can bail out.
    pub fn is_guard(&self) -> bool {
        match self {
            MirOp::Unbox { .. }
            | MirOp::GuardValue { .. }
            | MirOp::GuardNullOrUndefined { .. }
            | MirOp::GuardNumber { .. }
            | MirOp::ToNumberInt32 { .. }
            | MirOp::GuardShape { .. }
            | MirOp::GuardObjectGroup { .. }
            | MirOp::GuardToClass { .. }
            | MirOp::GuardProto { .. }
            | MirOp::GuardNullProto { .. }
            | MirOp::GuardIsProxy { .. }
            | MirOp::GuardIsNotProxy { .. }
            | MirOp::GuardObjectIdentity { .. }
            | MirOp::GuardSpecificFunction { .. }
            | MirOp::GuardSpecificAtom { .. }
            | MirOp::GuardSpecificSymbol { .. }
            | MirOp::GuardNoDenseElements { .. }
            | MirOp::GuardArrayIsPacked { .. }
            | MirOp::GuardFunctionFlags { .. }
            | MirOp::GuardFunctionHasJitEntry { .. }
            | MirOp::GuardFunctionHasNoJitEntry { .. }
            | MirOp::GuardInt32IsNonNegative { .. }
            | MirOp::ObjectStaticProto { .. }
            | MirOp::ArrayLength { .. }
            | MirOp::BoundsCheck { .. }
            | MirOp::LoadElementHole { .. }
            | MirOp::CharCodeAt { .. }
            | MirOp::Floor { .. }
            | MirOp::GrowSlots { .. }
            | MirOp::GuardElementNotHole { .. }
            | MirOp::GuardStoreElementHole { .. }
            | MirOp::GuardArrayPush { .. }
            | MirOp::MegamorphicLoadSlot { .. }
            | MirOp::MegamorphicHasProp { .. } => true,
            MirOp::LoadElement { needs_hole_check, .. } => *needs_hole_check,
            MirOp::Ursh { bailout, .. } => *bailout,
            MirOp::Add { specialization, .. }
            | MirOp::Sub { specialization, .. }
            | MirOp::Mul { specialization, .. }
            | MirOp::Div { specialization, .. }
            | MirOp::Mod { specialization, .. }
            | MirOp::Abs { specialization, .. } => *specialization == MirType::Int32,
            _ => false,
        }
    }

    /// SSA values the instruction uses, in operand order.
    pub fn operands(&self) -> SmallVec<[MDefinitionId; 4]> {
        match self {
            MirOp::Parameter { .. } | MirOp::Constant(_) => SmallVec::new(),
            MirOp::Unbox { input, .. }
            | MirOp::GuardValue { input, .. }
            | MirOp::GuardNullOrUndefined { input }
            | MirOp::GuardNumber { input }
            | MirOp::ToNumberInt32 { input }
            | MirOp::BooleanToInt32 { input }
            | MirOp::TypeOf { input }
            | MirOp::Not { input }
            | MirOp::IsObject { input }
            | MirOp::IsCallable { input }
            | MirOp::BitNot { input }
            | MirOp::Abs { input, .. }
            | MirOp::Sqrt { input }
            | MirOp::Floor { input }
            | MirOp::MathFunction { input, .. }
            | MirOp::ToDouble { input } => smallvec![*input],
            MirOp::GuardShape { obj, .. }
            | MirOp::GuardObjectGroup { obj, .. }
            | MirOp::GuardToClass { obj, .. }
            | MirOp::GuardProto { obj, .. }
            | MirOp::GuardNullProto { obj }
            | MirOp::GuardIsProxy { obj }
            | MirOp::GuardIsNotProxy { obj }
            | MirOp::GuardObjectIdentity { obj, .. }
            | MirOp::GuardNoDenseElements { obj }
            | MirOp::ObjectStaticProto { obj }
            | MirOp::ArrayLength { obj }
            | MirOp::InitializedLength { obj }
            | MirOp::LoadFixedSlot { obj, .. }
            | MirOp::LoadDynamicSlot { obj, .. }
            | MirOp::HasClass { obj, .. }
            | MirOp::GrowSlots { obj, .. }
            | MirOp::GuardArrayPush { obj }
            | MirOp::MegamorphicLoadSlot { obj, .. } => smallvec![*obj],
            MirOp::GuardSpecificFunction { fun, .. }
            | MirOp::GuardFunctionFlags { fun, .. }
            | MirOp::GuardFunctionHasJitEntry { fun }
            | MirOp::GuardFunctionHasNoJitEntry { fun } => smallvec![*fun],
            MirOp::GuardSpecificAtom { str, .. } | MirOp::StringLength { str } => smallvec![*str],
            MirOp::GuardSpecificSymbol { sym, .. } => smallvec![*sym],
            MirOp::GuardArrayIsPacked { array } => smallvec![*array],
            MirOp::GuardInt32IsNonNegative { index } => smallvec![*index],
            MirOp::FromCharCode { code } => smallvec![*code],
            MirOp::ProxyGet { proxy, .. } => smallvec![*proxy],
            MirOp::CallNativeGetter { receiver, .. } => smallvec![*receiver],
            MirOp::MinMax { lhs, rhs, .. }
            | MirOp::Add { lhs, rhs, .. }
            | MirOp::Sub { lhs, rhs, .. }
            | MirOp::Mul { lhs, rhs, .. }
            | MirOp::Div { lhs, rhs, .. }
            | MirOp::Mod { lhs, rhs, .. }
            | MirOp::Pow { lhs, rhs }
            | MirOp::BitOr { lhs, rhs }
            | MirOp::BitXor { lhs, rhs }
            | MirOp::BitAnd { lhs, rhs }
            | MirOp::Lsh { lhs, rhs }
            | MirOp::Rsh { lhs, rhs }
            | MirOp::Ursh { lhs, rhs, .. }
            | MirOp::Compare { lhs, rhs, .. }
            | MirOp::Concat { lhs, rhs } => smallvec![*lhs, *rhs],
            MirOp::BoundsCheck { index, length } => smallvec![*index, *length],
            MirOp::LoadElement { obj, index, .. }
            | MirOp::LoadElementHole { obj, index }
            | MirOp::GuardElementNotHole { obj, index }
            | MirOp::GuardStoreElementHole { obj, index, .. } => smallvec![*obj, *index],
            MirOp::CharCodeAt { str, index } => smallvec![*str, *index],
            MirOp::PostWriteBarrier { obj, value }
            | MirOp::StoreFixedSlot { obj, value, .. }
            | MirOp::StoreDynamicSlot { obj, value, .. }
            | MirOp::AddAndStoreSlot { obj, value, .. }
            | MirOp::ArrayPush { obj, value }
            | MirOp::MegamorphicStoreSlot { obj, value, .. } => smallvec![*obj, *value],
            MirOp::StoreElement { obj, index, value } | MirOp::StoreElementHole { obj, index, value } => {
                smallvec![*obj, *index, *value]
            }
            MirOp::ProxyGetByValue { proxy, id } | MirOp::ProxyHasProp { proxy, id, .. } => {
                smallvec![*proxy, *id]
            }
            MirOp::ProxySet { proxy, value, .. } => smallvec![*proxy, *value],
            MirOp::MegamorphicHasProp { obj, id, .. } => smallvec![*obj, *id],
            MirOp::CallNativeSetter { receiver, value, .. } => smallvec![*receiver, *value],
            MirOp::CreateThis { callee, new_target, .. } => smallvec![*callee, *new_target],
            MirOp::CreateThisWithTemplate { callee, .. } => smallvec![*callee],
            MirOp::Call(call) => {
                let mut uses: SmallVec<[MDefinitionId; 4]> = smallvec![call.callee, call.this];
                uses.extend(call.args.iter().copied());
                uses.extend(call.new_target);
                uses
            }
            MirOp::ApplyArray { callee, array, this, .. } => smallvec![*callee, *array, *this],
            MirOp::ConstructArray { callee, array, this, new_target, .. } => {
                smallvec![*callee, *array, *this, *new_target]
            }
        }
    }
}

/// Where execution resumes relative to the resume point's pc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResumeMode {
    /// Re-execute the op at `pc`
    ResumeAt,
    /// Continue after the op at `pc`
    ResumeAfter,
}

/// Interpreter state a bailout reconstructs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MResumePoint {
    /// Bytecode offset
    pub pc: u32,
    /// Before or after the op at `pc`
    pub mode: ResumeMode,
    /// Operand stack, bottom first
    pub stack: Vec<MDefinitionId>,
}

/// One instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct MInstruction {
    id: MDefinitionId,
    op: MirOp,
    ty: MirType,
    guard: bool,
    resume_point: Option<MResumePoint>,
}

impl MInstruction {
    /// The value defined.
    pub fn id(&self) -> MDefinitionId {
        self.id
    }

    /// What it computes.
    pub fn op(&self) -> &MirOp {
        &self.op
    }

    /// Result type.
    pub fn ty(&self) -> MirType {
        self.ty
    }

    /// Whether it can bail out.
    pub fn is_guard(&self) -> bool {
        self.guard
    }

    /// Whether it has a side effect.
    pub fn is_effectful(&self) -> bool {
        self.op.is_effectful()
    }

    /// Resume point of an effectful instruction.
    pub fn resume_point(&self) -> Option<&MResumePoint> {
        self.resume_point.as_ref()
    }
}

impl fmt::Display for MInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}(", self.id, self.op.name())?;
        for (i, operand) in self.op.operands().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{operand}")?;
        }
        write!(f, ") {}", self.ty)?;
        if self.guard {
            f.write_str(" guard")?;
        }
        if let Some(rp) = &self.resume_point {
            write!(f, " resume-after {}", rp.pc)?;
        }
        Ok(())
    }
}

/// The instructions of one IC site.
#[derive(Debug, Clone, PartialEq)]
pub struct MBasicBlock {
    id: BlockId,
    pc: u32,
    kind: CacheKind,
    entry: MResumePoint,
    instructions: Vec<MInstruction>,
    stack: Vec<MDefinitionId>,
    num_inputs: u32,
    result: Option<MDefinitionId>,
    inlined_call: Option<MInlinedCall>,
}

impl MBasicBlock {
    /// Block id.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Bytecode offset of the IC site.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Cache kind of the site.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Resume point re-executing the site; guards bail to it.
    pub fn entry_resume_point(&self) -> &MResumePoint {
        &self.entry
    }

    /// Instructions in order.
    pub fn instructions(&self) -> &[MInstruction] {
        &self.instructions
    }

    /// Current operand stack, bottom first.
    pub fn stack(&self) -> &[MDefinitionId] {
        &self.stack
    }

    /// Number of [`MirOp::Parameter`]s.
    pub fn num_inputs(&self) -> u32 {
        self.num_inputs
    }

    /// Value the site produces, if any.
    pub fn result(&self) -> Option<MDefinitionId> {
        self.result
    }

    /// The inlined call ending the block, if the site's call was inlined.
    pub fn inlined_call(&self) -> Option<&MInlinedCall> {
        self.inlined_call.as_ref()
    }

    /// End the block with an inlined call instead of a call instruction.
    pub fn set_inlined_call(&mut self, call: MInlinedCall) {
        debug_assert!(self.inlined_call.is_none(), "{} inlines two calls", self.id);
        self.inlined_call = Some(call);
    }

    /// Push onto the operand stack.
    pub fn push(&mut self, def: MDefinitionId) {
        self.stack.push(def);
    }

    /// Pop the operand stack.
    pub fn pop(&mut self) -> Option<MDefinitionId> {
        self.stack.pop()
    }

    /// Replace the site's inputs on the stack by what the op leaves
    /// there: its result, or for sets the stored value.
    pub fn finish_op(&mut self, result: Option<MDefinitionId>) {
        let inputs = self.num_inputs as usize;
        let base = self.stack.len().saturating_sub(inputs);
        let rhs = self.stack.last().copied();
        self.stack.truncate(base);
        match result {
            Some(def) => {
                self.stack.push(def);
                self.result = Some(def);
            }
            None if self.kind.is_set() => self.stack.extend(rhs),
            None => {}
        }
    }

    /// Number of effectful instructions.
    pub fn num_effectful(&self) -> usize {
        self.instructions.iter().filter(|ins| ins.is_effectful()).count()
    }
}

impl fmt::Display for MBasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} pc={} {}", self.id, self.pc, self.kind)?;
        for ins in &self.instructions {
            writeln!(f, "  {ins}")?;
        }
        if let Some(call) = &self.inlined_call {
            writeln!(f, "  inline {}(argc {}) script {}", call.call_info.callee(), call.call_info.argc(), call.ic_script)?;
        }
        Ok(())
    }
}

/// A graph of blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct MirGraph {
    blocks: Vec<MBasicBlock>,
    defs: Vec<(BlockId, u32)>,
    max_nodes: u32,
}

impl MirGraph {
    /// An empty graph holding at most `max_nodes` instructions.
    pub fn new(max_nodes: u32) -> Self {
        Self {
            blocks: Vec::new(),
            defs: Vec::new(),
            max_nodes,
        }
    }

    /// Blocks in creation order.
    pub fn blocks(&self) -> &[MBasicBlock] {
        &self.blocks
    }

    /// Block `id`.
    pub fn block(&self, id: BlockId) -> &MBasicBlock {
        &self.blocks[id.0 as usize]
    }

    /// Mutable block `id`.
    pub fn block_mut(&mut self, id: BlockId) -> &mut MBasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// Number of instructions in the graph.
    pub fn num_instructions(&self) -> u32 {
        self.defs.len() as u32
    }

    /// Instruction defining `def`.
    pub fn instruction(&self, def: MDefinitionId) -> &MInstruction {
        let (block, index) = self.defs[def.0 as usize];
        &self.block(block).instructions[index as usize]
    }

    /// Type of `def`.
    pub fn type_of(&self, def: MDefinitionId) -> MirType {
        self.instruction(def).ty
    }

    /// Open a block for the IC site at `pc`.
    pub fn new_block(&mut self, pc: u32, kind: CacheKind) -> TranspileResult<BlockId> {
        self.blocks
            .try_reserve(1)
            .map_err(|_| TranspileError::OutOfMemory { what: "MIR block" })?;
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(MBasicBlock {
            id,
            pc,
            kind,
            entry: MResumePoint {
                pc,
                mode: ResumeMode::ResumeAt,
                stack: Vec::new(),
            },
            instructions: Vec::new(),
            stack: Vec::new(),
            num_inputs: 0,
            result: None,
            inlined_call: None,
        });
        Ok(id)
    }

    /// Append an instruction to `block`.
    pub fn add(&mut self, block: BlockId, op: MirOp, ty: MirType) -> TranspileResult<MDefinitionId> {
        if self.num_instructions() >= self.max_nodes {
            return Err(TranspileError::TooManyNodes { limit: self.max_nodes });
        }
        self.defs
            .try_reserve(1)
            .map_err(|_| TranspileError::OutOfMemory { what: "MIR definition table" })?;
        let id = MDefinitionId(self.defs.len() as u32);
        let target = &mut self.blocks[block.0 as usize];
        target
            .instructions
            .try_reserve(1)
            .map_err(|_| TranspileError::OutOfMemory { what: "MIR instruction" })?;
        let guard = op.is_guard();
        self.defs.push((block, target.instructions.len() as u32));
        target.instructions.push(MInstruction {
            id,
            op,
            ty,
            guard,
            resume_point: None,
        });
        Ok(id)
    }

    /// Add input operand `index` of `block`'s site. Inputs are on the
    /// operand stack and in the entry resume point.
    pub fn add_input(&mut self, block: BlockId, ty: MirType) -> TranspileResult<MDefinitionId> {
        let index = self.block(block).num_inputs;
        let def = self.add(block, MirOp::Parameter { index }, ty)?;
        let target = self.block_mut(block);
        target.num_inputs += 1;
        target.stack.push(def);
        target.entry.stack.push(def);
        Ok(def)
    }

    /// Attach a resume point capturing `def`'s block stack after it.
    pub fn resume_after(&mut self, def: MDefinitionId) {
        let (block, index) = self.defs[def.0 as usize];
        let target = &mut self.blocks[block.0 as usize];
        let rp = MResumePoint {
            pc: target.pc,
            mode: ResumeMode::ResumeAfter,
            stack: target.stack.clone(),
        };
        target.instructions[index as usize].resume_point = Some(rp);
    }
}

impl fmt::Display for MirGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_number_definitions_graph_wide() {
        let mut graph = MirGraph::new(16);
        let a = graph.new_block(4, CacheKind::GetProp).unwrap();
        let b = graph.new_block(9, CacheKind::BinaryArith).unwrap();
        let v0 = graph.add_input(a, MirType::Value).unwrap();
        let v1 = graph.add_input(b, MirType::Value).unwrap();
        let v2 = graph.add_input(b, MirType::Value).unwrap();
        assert_eq!((v0.index(), v1.index(), v2.index()), (0, 1, 2));
        assert_eq!(graph.block(b).entry_resume_point().stack, vec![v1, v2]);
        assert_eq!(graph.instruction(v2).op(), &MirOp::Parameter { index: 1 });
        assert_eq!(graph.num_instructions(), 3);
    }

    #[test]
    fn node_limit() {
        let mut graph = MirGraph::new(2);
        let block = graph.new_block(0, CacheKind::GetProp).unwrap();
        graph.add(block, MirOp::Constant(Value::NULL), MirType::Null).unwrap();
        graph.add(block, MirOp::Constant(Value::TRUE), MirType::Boolean).unwrap();
        assert_eq!(
            graph.add(block, MirOp::Constant(Value::FALSE), MirType::Boolean),
            Err(TranspileError::TooManyNodes { limit: 2 })
        );
    }

    #[test]
    fn guard_flag_follows_specialization() {
        let mut graph = MirGraph::new(8);
        let block = graph.new_block(0, CacheKind::BinaryArith).unwrap();
        let x = graph.add_input(block, MirType::Value).unwrap();
        let int = graph
            .add(block, MirOp::Add { lhs: x, rhs: x, specialization: MirType::Int32 }, MirType::Int32)
            .unwrap();
        let double = graph
            .add(block, MirOp::Add { lhs: x, rhs: x, specialization: MirType::Double }, MirType::Double)
            .unwrap();
        assert!(graph.instruction(int).is_guard());
        assert!(!graph.instruction(double).is_guard());
        assert_eq!(graph.instruction(int).to_string(), "v1 = Add(v0, v0) Int32 guard");
    }

    #[test]
    fn set_sites_leave_the_stored_value() {
        let mut graph = MirGraph::new(8);
        let block = graph.new_block(3, CacheKind::SetProp).unwrap();
        graph.add_input(block, MirType::Value).unwrap();
        let rhs = graph.add_input(block, MirType::Value).unwrap();
        graph.block_mut(block).finish_op(None);
        assert_eq!(graph.block(block).stack(), &[rhs]);
        assert_eq!(graph.block(block).result(), None);
    }

    #[test]
    fn effect_classification() {
        let v = MDefinitionId(0);
        assert!(MirOp::StoreFixedSlot { obj: v, offset: 16, value: v }.is_effectful());
        assert!(!MirOp::PostWriteBarrier { obj: v, value: v }.is_effectful());
        assert!(!MirOp::CreateThis { callee: v, new_target: v, same_realm: true }.is_effectful());
        assert!(MirOp::MegamorphicLoadSlot { obj: v, name: PropertyKey::Index(0) }.is_guard());
        assert!(!MirOp::MegamorphicLoadSlot { obj: v, name: PropertyKey::Index(0) }.is_effectful());
    }
}
