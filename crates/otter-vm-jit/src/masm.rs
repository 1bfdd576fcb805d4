//! The stub macro-assembler
//!
//! Baseline stubs are compiled to a small portable ISA rather than to host
//! machine code. The ISA keeps everything the allocator and the compiler
//! have to get right observable: a fixed register file, an explicit machine
//! stack, labels resolved at link time, and explicit loads from stub data.
//!
//! # Machine model
//!
//! ```text
//! general registers   R0..R7    64-bit words (boxed values or payloads)
//! float registers     F0..F3    f64
//! machine stack       words; the IC caller pushes frame inputs
//!                     (call arguments, SetElem's value) before entering
//! frame slots         addressed from the stack depth at stub entry,
//!                     slot 0 being the word pushed last by the caller
//! ```
//!
//! Calling convention of a stub:
//! - inputs arrive boxed in `R0`/`R1` (a `Call` IC's argument count arrives
//!   as an int32 payload in `R0`)
//! - the result is returned boxed in `R0`
//! - VM and ABI calls clobber `R0` and `R1` only; the VM result comes back
//!   in `R0`, the success flag of fallible helpers in `R1`

use std::fmt;

use otter_cacheir::{CacheKind, JSOp, UnaryMathFunction};
use otter_vm_core::ValueType;

use crate::error::{JitError, JitResult};
use crate::vm_functions::VMFunctionId;

/// Number of general registers.
pub const NUM_REGISTERS: usize = 8;
/// Number of float registers.
pub const NUM_FLOAT_REGISTERS: usize = 4;
/// Largest stub the linker accepts, in instructions.
pub const MAX_STUB_INSTRUCTIONS: usize = 1 << 16;
/// Proto word of an object with a null prototype.
pub const NULL_OBJECT: u64 = u64::MAX;

/// A general register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register(u8);

impl Register {
    /// First IC input and the output register
    pub const R0: Register = Register(0);
    /// Second IC input
    pub const R1: Register = Register(1);
    /// General purpose
    pub const R2: Register = Register(2);
    /// General purpose
    pub const R3: Register = Register(3);
    /// General purpose
    pub const R4: Register = Register(4);
    /// General purpose
    pub const R5: Register = Register(5);
    /// General purpose
    pub const R6: Register = Register(6);
    /// General purpose
    pub const R7: Register = Register(7);

    /// Register by number.
    pub const fn new(code: u8) -> Self {
        assert!((code as usize) < NUM_REGISTERS);
        Register(code)
    }

    /// Register number.
    pub const fn code(self) -> u8 {
        self.0
    }

    /// Whether VM and ABI calls overwrite this register.
    pub const fn is_call_clobbered(self) -> bool {
        self.0 < 2
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A float register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatRegister(u8);

impl FloatRegister {
    /// Float scratch 0
    pub const F0: FloatRegister = FloatRegister(0);
    /// Float scratch 1
    pub const F1: FloatRegister = FloatRegister(1);
    /// Float scratch 2
    pub const F2: FloatRegister = FloatRegister(2);
    /// Float scratch 3
    pub const F3: FloatRegister = FloatRegister(3);

    /// Register number.
    pub const fn code(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FloatRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// A small set of general registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct RegisterSet(u8);

impl RegisterSet {
    /// No registers.
    pub const fn empty() -> Self {
        RegisterSet(0)
    }

    /// Every register.
    pub const fn all() -> Self {
        RegisterSet(u8::MAX)
    }

    /// Add `reg`.
    pub fn add(&mut self, reg: Register) {
        self.0 |= 1 << reg.0;
    }

    /// Remove `reg`.
    pub fn take(&mut self, reg: Register) {
        self.0 &= !(1 << reg.0);
    }

    /// Whether `reg` is in the set.
    pub const fn has(self, reg: Register) -> bool {
        self.0 & (1 << reg.0) != 0
    }

    /// Whether the set is empty.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Remove and return the lowest-numbered register.
    pub fn take_any(&mut self) -> Option<Register> {
        if self.0 == 0 {
            return None;
        }
        let reg = Register(self.0.trailing_zeros() as u8);
        self.take(reg);
        Some(reg)
    }

    /// Registers in ascending order.
    pub fn iter(self) -> impl Iterator<Item = Register> {
        (0..NUM_REGISTERS as u8)
            .map(Register)
            .filter(move |r| self.has(*r))
    }

    /// Union.
    pub const fn union(self, other: RegisterSet) -> RegisterSet {
        RegisterSet(self.0 | other.0)
    }
}

/// A branch target, bound to an instruction index by [`MacroAssembler::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    /// Label number.
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Second operand of compares and integer ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// A register
    Reg(Register),
    /// An immediate taken from the CacheIR code bytes or a constant
    Imm(u64),
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Reg(reg)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::Imm(imm) => write!(f, "#{imm:#x}"),
        }
    }
}

/// Integer condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// signed `<`
    LessThan,
    /// signed `<=`
    LessThanOrEqual,
    /// signed `>`
    GreaterThan,
    /// signed `>=`
    GreaterThanOrEqual,
    /// unsigned `<`
    Below,
    /// unsigned `<=`
    BelowOrEqual,
    /// unsigned `>`
    Above,
    /// unsigned `>=`
    AboveOrEqual,
}

impl Condition {
    /// Condition for a relational or equality `JSOp`.
    pub fn from_js_op(op: JSOp) -> Condition {
        match op {
            JSOp::Eq | JSOp::StrictEq => Condition::Equal,
            JSOp::Ne | JSOp::StrictNe => Condition::NotEqual,
            JSOp::Lt => Condition::LessThan,
            JSOp::Le => Condition::LessThanOrEqual,
            JSOp::Gt => Condition::GreaterThan,
            JSOp::Ge => Condition::GreaterThanOrEqual,
        }
    }

    /// Evaluate on 32-bit operands.
    pub fn eval32(self, lhs: u32, rhs: u32) -> bool {
        let (a, b) = (lhs as i32, rhs as i32);
        match self {
            Condition::Equal => lhs == rhs,
            Condition::NotEqual => lhs != rhs,
            Condition::LessThan => a < b,
            Condition::LessThanOrEqual => a <= b,
            Condition::GreaterThan => a > b,
            Condition::GreaterThanOrEqual => a >= b,
            Condition::Below => lhs < rhs,
            Condition::BelowOrEqual => lhs <= rhs,
            Condition::Above => lhs > rhs,
            Condition::AboveOrEqual => lhs >= rhs,
        }
    }

    /// Evaluate on 64-bit operands.
    pub fn eval64(self, lhs: u64, rhs: u64) -> bool {
        let (a, b) = (lhs as i64, rhs as i64);
        match self {
            Condition::Equal => lhs == rhs,
            Condition::NotEqual => lhs != rhs,
            Condition::LessThan => a < b,
            Condition::LessThanOrEqual => a <= b,
            Condition::GreaterThan => a > b,
            Condition::GreaterThanOrEqual => a >= b,
            Condition::Below => lhs < rhs,
            Condition::BelowOrEqual => lhs <= rhs,
            Condition::Above => lhs > rhs,
            Condition::AboveOrEqual => lhs >= rhs,
        }
    }
}

/// Double condition. Ordered conditions are false when either side is NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleCondition {
    /// ordered `==`
    Equal,
    /// `!=` or unordered
    NotEqualOrUnordered,
    /// ordered `<`
    LessThan,
    /// ordered `<=`
    LessThanOrEqual,
    /// ordered `>`
    GreaterThan,
    /// ordered `>=`
    GreaterThanOrEqual,
    /// either side is NaN
    Unordered,
}

impl DoubleCondition {
    /// Condition with JavaScript comparison semantics.
    pub fn from_js_op(op: JSOp) -> DoubleCondition {
        match op {
            JSOp::Eq | JSOp::StrictEq => DoubleCondition::Equal,
            JSOp::Ne | JSOp::StrictNe => DoubleCondition::NotEqualOrUnordered,
            JSOp::Lt => DoubleCondition::LessThan,
            JSOp::Le => DoubleCondition::LessThanOrEqual,
            JSOp::Gt => DoubleCondition::GreaterThan,
            JSOp::Ge => DoubleCondition::GreaterThanOrEqual,
        }
    }

    /// Evaluate.
    pub fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            DoubleCondition::Equal => lhs == rhs,
            DoubleCondition::NotEqualOrUnordered => lhs != rhs,
            DoubleCondition::LessThan => lhs < rhs,
            DoubleCondition::LessThanOrEqual => lhs <= rhs,
            DoubleCondition::GreaterThan => lhs > rhs,
            DoubleCondition::GreaterThanOrEqual => lhs >= rhs,
            DoubleCondition::Unordered => lhs.is_nan() || rhs.is_nan(),
        }
    }
}

/// Two-operand int32 operation. Results are zero-extended 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Int32BinOp {
    /// wrapping `+`
    Add,
    /// wrapping `-`
    Sub,
    /// wrapping `*`
    Mul,
    /// truncating `/` (0 on a zero divisor)
    Div,
    /// `%` (0 on a zero divisor)
    Mod,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<` (shift count masked to 5 bits)
    Lsh,
    /// arithmetic `>>`
    Rsh,
    /// logical `>>>`
    Ursh,
}

impl Int32BinOp {
    /// Wrapping result.
    pub fn eval(self, lhs: i32, rhs: i32) -> i32 {
        match self {
            Int32BinOp::Add => lhs.wrapping_add(rhs),
            Int32BinOp::Sub => lhs.wrapping_sub(rhs),
            Int32BinOp::Mul => lhs.wrapping_mul(rhs),
            Int32BinOp::Div => lhs.checked_div(rhs).unwrap_or(0),
            Int32BinOp::Mod => lhs.checked_rem(rhs).unwrap_or(0),
            Int32BinOp::And => lhs & rhs,
            Int32BinOp::Or => lhs | rhs,
            Int32BinOp::Xor => lhs ^ rhs,
            Int32BinOp::Lsh => lhs.wrapping_shl(rhs as u32 & 31),
            Int32BinOp::Rsh => lhs.wrapping_shr(rhs as u32 & 31),
            Int32BinOp::Ursh => ((lhs as u32) >> (rhs as u32 & 31)) as i32,
        }
    }

    /// Checked result; `None` on overflow.
    pub fn eval_checked(self, lhs: i32, rhs: i32) -> Option<i32> {
        match self {
            Int32BinOp::Add => lhs.checked_add(rhs),
            Int32BinOp::Sub => lhs.checked_sub(rhs),
            Int32BinOp::Mul => lhs.checked_mul(rhs),
            _ => Some(self.eval(lhs, rhs)),
        }
    }
}

/// One-operand int32 operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Int32UnaryOp {
    /// wrapping negation
    Neg,
    /// `~`
    Not,
}

/// Two-operand double operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleBinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%` (JavaScript remainder)
    Mod,
    /// `**`
    Pow,
    /// `Math.min`
    Min,
    /// `Math.max`
    Max,
}

impl DoubleBinOp {
    /// Result with JavaScript semantics.
    pub fn eval(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            DoubleBinOp::Add => lhs + rhs,
            DoubleBinOp::Sub => lhs - rhs,
            DoubleBinOp::Mul => lhs * rhs,
            DoubleBinOp::Div => lhs / rhs,
            DoubleBinOp::Mod => lhs % rhs,
            DoubleBinOp::Pow => js_pow(lhs, rhs),
            DoubleBinOp::Min => js_min(lhs, rhs),
            DoubleBinOp::Max => js_max(lhs, rhs),
        }
    }
}

/// One-operand double operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleUnaryOp {
    /// `-x`
    Neg,
    /// `Math.abs`
    Abs,
    /// `Math.sqrt`
    Sqrt,
    /// A unary `Math` function
    Math(UnaryMathFunction),
}

impl DoubleUnaryOp {
    /// Result.
    pub fn eval(self, x: f64) -> f64 {
        match self {
            DoubleUnaryOp::Neg => -x,
            DoubleUnaryOp::Abs => x.abs(),
            DoubleUnaryOp::Sqrt => x.sqrt(),
            DoubleUnaryOp::Math(fun) => fun.apply(x),
        }
    }
}

/// `x ** y` with the JavaScript special cases.
pub fn js_pow(x: f64, y: f64) -> f64 {
    if y.is_nan() || (x.abs() == 1.0 && y.is_infinite()) {
        return f64::NAN;
    }
    x.powf(y)
}

/// `Math.min` of two doubles: NaN wins, `-0 < +0`.
pub fn js_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_negative() { a } else { b }
    } else {
        a.min(b)
    }
}

/// `Math.max` of two doubles: NaN wins, `+0 > -0`.
pub fn js_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else if a == b {
        if a.is_sign_positive() { a } else { b }
    } else {
        a.max(b)
    }
}

/// Object header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectField {
    /// Shape index
    Shape,
    /// Group index
    Group,
    /// Class index
    Class,
    /// Class flag bits
    ClassFlags,
    /// Prototype index, or [`NULL_OBJECT`]
    Proto,
}

/// Elements header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementsField {
    /// Initialized length
    InitializedLength,
    /// Capacity
    Capacity,
    /// Array length
    Length,
    /// Flag bits
    Flags,
}

/// Function header word (0 for non-functions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionField {
    /// `nargs << 16 | flags`
    NargsAndFlags,
    /// Formal parameter count
    Nargs,
    /// 1 if the function has a JIT entry
    HasJitEntry,
    /// The class DOM `this` must have, or `u64::MAX`
    DomThisClass,
}

/// How `CallJit` enters the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// The callee's JIT entry; `argc >= nargs`
    JitEntry,
    /// The arguments rectifier, which pads missing formals with `undefined`
    ArgumentsRectifier,
}

/// A stub instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Label position; no effect
    Bind(Label),

    // Moves and stub data
    /// `dst = src`
    Mov {
        /// Destination
        dst: Register,
        /// Source
        src: Operand,
    },
    /// `dst = word at offset` in the executing stub's data
    LoadStubWord {
        /// Destination
        dst: Register,
        /// Byte offset into the stub data
        offset: u32,
    },
    /// `dst = boxed value at offset` in the executing stub's data
    LoadStubValue {
        /// Destination
        dst: Register,
        /// Byte offset into the stub data
        offset: u32,
    },
    /// `dst = value`
    LoadConstantDouble {
        /// Destination
        dst: FloatRegister,
        /// Constant
        value: f64,
    },

    // Boxing
    /// `dst = box(ty, payload)`
    TagValue {
        /// Tag to apply
        ty: ValueType,
        /// Unboxed payload
        payload: Register,
        /// Destination
        dst: Register,
    },
    /// `dst = payload(src)`; the tag is assumed to be `ty`
    UnboxNonDouble {
        /// Boxed value
        src: Register,
        /// Destination
        dst: Register,
        /// Tag `src` is known to carry
        ty: ValueType,
    },
    /// `dst = number(src)`; int32 is converted, non-numbers give NaN
    UnboxNumber {
        /// Boxed value
        src: Register,
        /// Destination
        dst: FloatRegister,
    },
    /// `dst = box(double src)`
    BoxDouble {
        /// Source
        src: FloatRegister,
        /// Destination
        dst: Register,
    },
    /// `dst = src as f64` (int32 payload)
    ConvertInt32ToDouble {
        /// Int32 payload
        src: Register,
        /// Destination
        dst: FloatRegister,
    },
    /// `dst = src as i32`; branch if inexact (or `-0` when checked)
    ConvertDoubleToInt32 {
        /// Source
        src: FloatRegister,
        /// Destination
        dst: Register,
        /// Taken when the conversion is lossy
        fail: Label,
        /// Also fail on `-0`
        negative_zero_check: bool,
    },
    /// `dst = floor(src) as i32`; branch if out of range or `-0`
    FloorDoubleToInt32 {
        /// Source
        src: FloatRegister,
        /// Destination
        dst: Register,
        /// Taken when the result is not an int32
        fail: Label,
    },

    // Branches
    /// Unconditional jump
    Jump(Label),
    /// Branch on a 32-bit compare
    Branch32 {
        /// Condition
        cond: Condition,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
        /// Taken when `cond` holds
        target: Label,
    },
    /// Branch on a 64-bit compare
    Branch64 {
        /// Condition
        cond: Condition,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
        /// Taken when `cond` holds
        target: Label,
    },
    /// Branch if `(lhs & mask) != 0` (or `== 0` when `zero`)
    BranchTest32 {
        /// Branch on a zero result instead
        zero: bool,
        /// Tested register
        lhs: Register,
        /// Bits to test
        mask: u32,
        /// Branch target
        target: Label,
    },
    /// Branch if the value's tag is (`equal`) or is not `ty`
    BranchTestType {
        /// Branch on a match instead of a mismatch
        equal: bool,
        /// Boxed value
        src: Register,
        /// Tag to test for
        ty: ValueType,
        /// Branch target
        target: Label,
    },
    /// Branch if the value is (`equal`) or is not a number
    BranchTestNumber {
        /// Branch on a number instead of a non-number
        equal: bool,
        /// Boxed value
        src: Register,
        /// Branch target
        target: Label,
    },
    /// Branch on a double compare
    BranchDouble {
        /// Condition, with its NaN behavior
        cond: DoubleCondition,
        /// Left operand
        lhs: FloatRegister,
        /// Right operand
        rhs: FloatRegister,
        /// Taken when `cond` holds
        target: Label,
    },
    /// `dst = cond(lhs, rhs) as u64`, 32-bit compare
    Cmp32Set {
        /// Condition
        cond: Condition,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
        /// 0 or 1
        dst: Register,
    },
    /// `dst = cond(lhs, rhs) as u64`, 64-bit compare
    Cmp64Set {
        /// Condition
        cond: Condition,
        /// Left operand
        lhs: Register,
        /// Right operand
        rhs: Operand,
        /// 0 or 1
        dst: Register,
    },
    /// `dst = cond(lhs, rhs) as u64`, double compare
    CmpDoubleSet {
        /// Condition
        cond: DoubleCondition,
        /// Left operand
        lhs: FloatRegister,
        /// Right operand
        rhs: FloatRegister,
        /// 0 or 1
        dst: Register,
    },

    // Arithmetic
    /// `dst = dst op src` (wrapping)
    Int32Op {
        /// Operation
        op: Int32BinOp,
        /// Left operand and result
        dst: Register,
        /// Right operand
        src: Operand,
    },
    /// `dst = dst op src`; branch with `dst` unchanged on overflow
    BranchInt32Op {
        /// Operation
        op: Int32BinOp,
        /// Left operand and result
        dst: Register,
        /// Right operand
        src: Operand,
        /// Taken on overflow
        target: Label,
    },
    /// `dst = op dst`
    Int32Unary {
        /// Operation
        op: Int32UnaryOp,
        /// Operand and result
        dst: Register,
    },
    /// `dst = dst op src`
    DoubleOp {
        /// Operation
        op: DoubleBinOp,
        /// Left operand and result
        dst: FloatRegister,
        /// Right operand
        src: FloatRegister,
    },
    /// `dst = op dst`
    DoubleUnary {
        /// Operation
        op: DoubleUnaryOp,
        /// Operand and result
        dst: FloatRegister,
    },

    // Objects
    /// `dst = header word of obj`
    LoadObjectField {
        /// Destination
        dst: Register,
        /// Object pointer
        obj: Register,
        /// Header word
        field: ObjectField,
    },
    /// Set an object's shape or group
    StoreObjectField {
        /// Object pointer
        obj: Register,
        /// Header word
        field: ObjectField,
        /// New shape or group
        src: Register,
    },
    /// `dst = elements header word of obj`
    LoadElementsField {
        /// Destination
        dst: Register,
        /// Object pointer
        obj: Register,
        /// Header word
        field: ElementsField,
    },
    /// Set the array length
    StoreElementsLength {
        /// Array pointer
        obj: Register,
        /// New length
        src: Register,
    },
    /// `dst = function header word of obj`
    LoadFunctionField {
        /// Destination
        dst: Register,
        /// Function pointer
        obj: Register,
        /// Header word
        field: FunctionField,
    },
    /// `dst = fixed slot at byte offset`
    LoadFixedSlot {
        /// Destination
        dst: Register,
        /// Object pointer
        obj: Register,
        /// Byte offset of the slot
        offset: Register,
    },
    /// Store to the fixed slot at byte offset (no barriers)
    StoreFixedSlot {
        /// Object pointer
        obj: Register,
        /// Byte offset of the slot
        offset: Register,
        /// Boxed value
        src: Register,
    },
    /// `dst = dynamic slot at byte offset`
    LoadDynamicSlot {
        /// Destination
        dst: Register,
        /// Object pointer
        obj: Register,
        /// Byte offset of the slot
        offset: Register,
    },
    /// Store to the dynamic slot at byte offset (no barriers)
    StoreDynamicSlot {
        /// Object pointer
        obj: Register,
        /// Byte offset of the slot
        offset: Register,
        /// Boxed value
        src: Register,
    },
    /// `dst = element` below the initialized length
    LoadElement {
        /// Destination
        dst: Register,
        /// Object pointer
        obj: Register,
        /// Int32 index
        index: Register,
    },
    /// Overwrite an element below the initialized length (no barriers)
    StoreElement {
        /// Object pointer
        obj: Register,
        /// Int32 index
        index: Register,
        /// Boxed value
        src: Register,
    },
    /// Store at the initialized length and bump it; capacity was checked
    AppendElement {
        /// Object pointer
        obj: Register,
        /// Boxed value
        src: Register,
    },
    /// `dst = string length`
    LoadStringLength {
        /// Destination
        dst: Register,
        /// String payload
        str: Register,
    },
    /// `dst = code unit`; branch when the index is out of bounds
    LoadStringCharCode {
        /// Destination
        dst: Register,
        /// String payload
        str: Register,
        /// Int32 index
        index: Register,
        /// Taken when `index` is out of bounds
        fail: Label,
    },

    // GC
    /// Branch if incremental marking is (`active`) or is not in progress
    BranchIncrementalMarking {
        /// Branch while marking instead of while idle
        active: bool,
        /// Branch target
        target: Label,
    },
    /// Branch if the object is (`in_nursery`) or is not in the nursery
    BranchObjectInNursery {
        /// Branch on a nursery object instead of a tenured one
        in_nursery: bool,
        /// Object pointer
        obj: Register,
        /// Branch target
        target: Label,
    },
    /// Branch if the value is (`in_nursery`) or is not a nursery object
    BranchValueIsNurseryObject {
        /// Branch on a nursery object instead of anything else
        in_nursery: bool,
        /// Boxed value
        value: Register,
        /// Branch target
        target: Label,
    },

    // Stack
    /// Push a word
    Push(Operand),
    /// Pop a word
    Pop(Register),
    /// `dst = stack[top - depth]`
    LoadStack {
        /// Destination
        dst: Register,
        /// Words below the top
        depth: u32,
    },
    /// `stack[top - depth] = src`
    StoreStack {
        /// Source
        src: Register,
        /// Words below the top
        depth: u32,
    },
    /// Drop words from the top of the stack
    FreeStack(u32),
    /// `dst = caller frame slot`
    LoadFrameSlot {
        /// Destination
        dst: Register,
        /// Frame slot, 0 being the word pushed last
        slot: u32,
    },
    /// `dst = caller frame slot (base + extra)`, `base` an int32 payload
    LoadFrameSlotDynamic {
        /// Destination
        dst: Register,
        /// Register part of the slot index
        base: Register,
        /// Constant part of the slot index
        extra: u32,
    },

    // Frames, realms, calls
    /// Push a stub frame for the IC site
    EnterStubFrame,
    /// Pop the stub frame and restore the stack to its depth at entry
    LeaveStubFrame,
    /// Enter the realm of an object
    SwitchToObjectRealm {
        /// Object pointer; a function's own realm wins over its object realm
        obj: Register,
    },
    /// Return to the realm that was current when the stub was entered
    SwitchToCallerRealm,
    /// Call a VM function (may GC; needs a stub frame). Pops its arguments.
    CallVM(VMFunctionId),
    /// Call a pure helper (never GCs). Pops its arguments.
    CallWithABI(VMFunctionId),
    /// Call a scripted function. Reads `this`, the arguments and `new.target`
    /// from the top of the stack without popping them.
    CallJit {
        /// Function pointer
        callee: Register,
        /// Argument count
        argc: Register,
        /// Whether `new.target` sits below the arguments
        constructing: bool,
        /// Entry point
        target: CallTarget,
    },
    /// Call a native function, same stack layout as `CallJit`
    CallNative {
        /// Function pointer
        callee: Register,
        /// Argument count
        argc: Register,
        /// Whether `new.target` sits below the arguments
        constructing: bool,
    },

    // IC bookkeeping
    /// Count an entry into the executing stub
    BumpEnteredCount,
    /// Branch if the value's type is in the executing stub's accepted set
    BranchTypeAccepted {
        /// Boxed value
        value: Register,
        /// Taken when the type is accepted
        target: Label,
    },
    /// Record R0's type in the fallback's monitor set
    TypeMonitor,
    /// Return the value in R0
    Ret,
    /// Give up on this stub and continue with the next one in the chain
    FailureExit,
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Bind(label) => write!(f, "{label}:"),
            Inst::Mov { dst, src } => write!(f, "    mov {dst}, {src}"),
            Inst::LoadStubWord { dst, offset } => write!(f, "    ldstub {dst}, [stub+{offset}]"),
            Inst::LoadStubValue { dst, offset } => write!(f, "    ldstubv {dst}, [stub+{offset}]"),
            Inst::Jump(label) => write!(f, "    jmp {label}"),
            Inst::Branch32 { cond, lhs, rhs, target } => {
                write!(f, "    b32.{cond:?} {lhs}, {rhs} -> {target}")
            }
            Inst::Branch64 { cond, lhs, rhs, target } => {
                write!(f, "    b64.{cond:?} {lhs}, {rhs} -> {target}")
            }
            Inst::Push(src) => write!(f, "    push {src}"),
            Inst::Pop(dst) => write!(f, "    pop {dst}"),
            Inst::CallVM(fun) => write!(f, "    callvm {}", fun.name()),
            Inst::CallWithABI(fun) => write!(f, "    callabi {}", fun.name()),
            other => write!(f, "    {other:?}"),
        }
    }
}

/// Linked stub code.
#[derive(Debug)]
pub struct JitCode {
    kind: CacheKind,
    insts: Box<[Inst]>,
    labels: Box<[u32]>,
    makes_gc_calls: bool,
}

impl JitCode {
    /// Cache kind the code was compiled for.
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Instructions.
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    /// Instruction index a label is bound to.
    #[inline]
    pub fn label_position(&self, label: Label) -> usize {
        self.labels[label.0 as usize] as usize
    }

    /// Whether the code contains a call that may collect.
    pub fn makes_gc_calls(&self) -> bool {
        self.makes_gc_calls
    }

    /// Number of instructions that load from stub data.
    pub fn stub_data_loads(&self) -> usize {
        self.insts
            .iter()
            .filter(|i| matches!(i, Inst::LoadStubWord { .. } | Inst::LoadStubValue { .. }))
            .count()
    }

    /// Listing, one instruction per line.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (i, inst) in self.insts.iter().enumerate() {
            out.push_str(&format!("{i:4} {inst}\n"));
        }
        out
    }
}

/// Instruction buffer with label management.
#[derive(Debug, Default)]
pub struct MacroAssembler {
    insts: Vec<Inst>,
    labels: Vec<Option<u32>>,
    makes_gc_calls: bool,
}

impl MacroAssembler {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh unbound label.
    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind `label` to the next instruction.
    pub fn bind(&mut self, label: Label) {
        debug_assert!(self.labels[label.0 as usize].is_none(), "label bound twice");
        self.labels[label.0 as usize] = Some(self.insts.len() as u32);
        self.insts.push(Inst::Bind(label));
    }

    /// Append an instruction.
    #[inline]
    pub fn emit(&mut self, inst: Inst) {
        match inst {
            Inst::CallVM(fun) => {
                debug_assert!(fun.can_gc(), "{} called through CallVM", fun.name());
                self.makes_gc_calls = true;
            }
            Inst::CallWithABI(fun) => {
                debug_assert!(!fun.can_gc(), "{} may GC, use CallVM", fun.name());
            }
            Inst::CallJit { .. } | Inst::CallNative { .. } => self.makes_gc_calls = true,
            _ => {}
        }
        self.insts.push(inst);
    }

    /// Instructions emitted so far.
    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    /// Whether a GC-capable call was emitted.
    pub fn makes_gc_calls(&self) -> bool {
        self.makes_gc_calls
    }

    // -----------------------------------------------------------------------
    // Shorthands
    // -----------------------------------------------------------------------

    /// `dst = src`
    pub fn mov(&mut self, src: impl Into<Operand>, dst: Register) {
        let src = src.into();
        if src != Operand::Reg(dst) {
            self.emit(Inst::Mov { dst, src });
        }
    }

    /// `dst = imm`
    pub fn mov_imm(&mut self, imm: u64, dst: Register) {
        self.emit(Inst::Mov { dst, src: Operand::Imm(imm) });
    }

    /// `dst = stub word at offset`
    pub fn load_stub_word(&mut self, offset: u32, dst: Register) {
        self.emit(Inst::LoadStubWord { dst, offset });
    }

    /// `dst = boxed stub value at offset`
    pub fn load_stub_value(&mut self, offset: u32, dst: Register) {
        self.emit(Inst::LoadStubValue { dst, offset });
    }

    /// `dst = box(ty, payload)`
    pub fn tag_value(&mut self, ty: ValueType, payload: Register, dst: Register) {
        self.emit(Inst::TagValue { ty, payload, dst });
    }

    /// `dst = payload(src)`
    pub fn unbox_non_double(&mut self, src: Register, dst: Register, ty: ValueType) {
        self.emit(Inst::UnboxNonDouble { src, dst, ty });
    }

    /// `dst = box(constant)`
    pub fn move_value(&mut self, bits: u64, dst: Register) {
        self.mov_imm(bits, dst);
    }

    /// Unconditional jump.
    pub fn jump(&mut self, target: Label) {
        self.emit(Inst::Jump(target));
    }

    /// 32-bit compare and branch.
    pub fn branch32(&mut self, cond: Condition, lhs: Register, rhs: impl Into<Operand>, target: Label) {
        self.emit(Inst::Branch32 { cond, lhs, rhs: rhs.into(), target });
    }

    /// 64-bit compare and branch.
    pub fn branch64(&mut self, cond: Condition, lhs: Register, rhs: impl Into<Operand>, target: Label) {
        self.emit(Inst::Branch64 { cond, lhs, rhs: rhs.into(), target });
    }

    /// Branch unless the value has tag `ty`.
    pub fn branch_test_not_type(&mut self, src: Register, ty: ValueType, target: Label) {
        self.emit(Inst::BranchTestType { equal: false, src, ty, target });
    }

    /// Branch if the value has tag `ty`.
    pub fn branch_test_type(&mut self, src: Register, ty: ValueType, target: Label) {
        self.emit(Inst::BranchTestType { equal: true, src, ty, target });
    }

    /// Push a word.
    pub fn push(&mut self, src: impl Into<Operand>) {
        self.emit(Inst::Push(src.into()));
    }

    /// Pop a word.
    pub fn pop(&mut self, dst: Register) {
        self.emit(Inst::Pop(dst));
    }

    /// Link into executable stub code.
    pub fn link(self, kind: CacheKind) -> JitResult<JitCode> {
        if self.insts.len() > MAX_STUB_INSTRUCTIONS {
            return Err(JitError::OutOfMemory { what: "stub code" });
        }
        let labels = self
            .labels
            .iter()
            .enumerate()
            .map(|(i, pos)| {
                debug_assert!(pos.is_some(), "label L{i} never bound");
                pos.unwrap_or(0)
            })
            .collect();
        Ok(JitCode {
            kind,
            insts: self.insts.into_boxed_slice(),
            labels,
            makes_gc_calls: self.makes_gc_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_set_takes_lowest_first() {
        let mut set = RegisterSet::empty();
        set.add(Register::R5);
        set.add(Register::R3);
        assert_eq!(set.take_any(), Some(Register::R3));
        assert_eq!(set.take_any(), Some(Register::R5));
        assert_eq!(set.take_any(), None);
        assert!(Register::R1.is_call_clobbered());
        assert!(!Register::R2.is_call_clobbered());
    }

    #[test]
    fn double_conditions_follow_js_nan_rules() {
        let nan = f64::NAN;
        assert!(!DoubleCondition::from_js_op(JSOp::Lt).eval(nan, 1.0));
        assert!(!DoubleCondition::from_js_op(JSOp::Eq).eval(nan, nan));
        assert!(DoubleCondition::from_js_op(JSOp::Ne).eval(nan, nan));
        assert!(DoubleCondition::Unordered.eval(1.0, nan));
    }

    #[test]
    fn int32_ops() {
        assert_eq!(Int32BinOp::Add.eval_checked(i32::MAX, 1), None);
        assert_eq!(Int32BinOp::Ursh.eval(-1, 0), -1);
        assert_eq!(Int32BinOp::Ursh.eval(-8, 1) as u32, 0x7FFF_FFFC);
        assert_eq!(Int32BinOp::Div.eval(7, 0), 0);
        assert_eq!(Int32BinOp::Lsh.eval(1, 33), 2);
    }

    #[test]
    fn min_max_handle_signed_zero() {
        assert!(js_min(0.0, -0.0).is_sign_negative());
        assert!(js_max(-0.0, 0.0).is_sign_positive());
        assert!(js_max(f64::NAN, 1.0).is_nan());
        assert!(js_pow(1.0, f64::INFINITY).is_nan());
    }

    #[test]
    fn link_resolves_labels() {
        let mut masm = MacroAssembler::new();
        let label = masm.new_label();
        masm.jump(label);
        masm.mov_imm(1, Register::R0);
        masm.bind(label);
        masm.emit(Inst::Ret);
        let code = masm.link(CacheKind::GetProp).unwrap();
        assert_eq!(code.label_position(label), 2);
        assert!(!code.makes_gc_calls());
        assert!(code.disassemble().contains("L0:"));
    }
}
