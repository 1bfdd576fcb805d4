//! The CacheIR opcode schema
//!
//! Every opcode is listed exactly once in the `define_cache_ir_ops!`
//! invocation below, with its class, its arguments and what it does to the
//! operand table. From that one table the macro generates:
//!
//! - [`CacheOp`], the opcode enum, with name, class and argument layout
//! - [`CacheIROps`], the handler trait both backends implement, one
//!   `emit_*` method per opcode
//! - [`dispatch_op`], which decodes one instruction and calls its handler
//! - one writer method per opcode on [`CacheIRWriter`]
//!
//! A backend that cannot compile an opcode panics inside its handler; the
//! set is closed and the trait keeps both backends exhaustive.

use crate::args::{ArgBits, ArgKind, FromArgBits};
use crate::error::CacheIRError;
use crate::operand::OperandIdType;
use crate::reader::CacheIRReader;
use crate::writer::CacheIRWriter;

/// Opcode class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    /// Fallible and pure
    Guard,
    /// Infallible and pure
    Def,
    /// Infallible metadata, no code
    Meta,
    /// Produces the IC result, infallible
    Result,
    /// Produces the IC result, may fail
    GuardResult,
    /// Mutates the heap or calls out. May only fail before its first write.
    Effect,
    /// Effectful and produces the IC result
    EffectResult,
    /// Ends the program
    Terminal,
}

impl OpClass {
    /// Whether the op can divert to the failure path (or bail out).
    pub const fn is_fallible(self) -> bool {
        matches!(self, OpClass::Guard | OpClass::GuardResult)
    }

    /// Whether the op has an observable side effect.
    pub const fn is_effectful(self) -> bool {
        matches!(self, OpClass::Effect | OpClass::EffectResult)
    }

    /// Whether the op writes the IC result.
    pub const fn produces_result(self) -> bool {
        matches!(
            self,
            OpClass::Result | OpClass::GuardResult | OpClass::EffectResult
        )
    }
}

/// Effect of an opcode on the operand table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpOutput {
    /// Nothing
    None,
    /// Defines the next operand id, of this kind
    Def(ArgKind),
    /// Narrows its first argument to this kind
    Narrow(ArgKind),
}

macro_rules! cache_ir_handler_type {
    (ValId) => { $crate::operand::ValOperandId };
    (ObjId) => { $crate::operand::ObjOperandId };
    (StrId) => { $crate::operand::StringOperandId };
    (SymId) => { $crate::operand::SymbolOperandId };
    (BigIntId) => { $crate::operand::BigIntOperandId };
    (BoolId) => { $crate::operand::BooleanOperandId };
    (Int32Id) => { $crate::operand::Int32OperandId };
    (NumId) => { $crate::operand::NumberOperandId };
    (ShapeField) => { u32 };
    (GroupField) => { u32 };
    (ObjectField) => { u32 };
    (ClassField) => { u32 };
    (StringField) => { u32 };
    (SymbolField) => { u32 };
    (RawWordField) => { u32 };
    (RawInt64Field) => { u32 };
    (ValueField) => { u32 };
    (IdField) => { u32 };
    (Byte) => { u8 };
    (Bool) => { bool };
    (Int32Imm) => { i32 };
    (UInt32Imm) => { u32 };
    (JSOp) => { $crate::flags::JSOp };
    (GuardClassKind) => { $crate::flags::GuardClassKind };
    (ValueType) => { otter_vm_core::ValueType };
    (CallFlags) => { $crate::flags::CallFlags };
    (MathFunction) => { $crate::flags::UnaryMathFunction };
}

macro_rules! cache_ir_writer_type {
    (ShapeField) => { otter_vm_core::ShapeId };
    (GroupField) => { otter_vm_core::GroupId };
    (ObjectField) => { otter_vm_core::ObjectId };
    (ClassField) => { otter_vm_core::ClassId };
    (StringField) => { otter_vm_core::StringId };
    (SymbolField) => { otter_vm_core::SymbolId };
    (RawWordField) => { u32 };
    (RawInt64Field) => { u64 };
    (ValueField) => { otter_vm_core::Value };
    (IdField) => { otter_vm_core::PropertyKey };
    ($other:ident) => { cache_ir_handler_type!($other) };
}

macro_rules! cache_ir_output {
    () => { OpOutput::None };
    (Def($kind:ident)) => { OpOutput::Def(ArgKind::$kind) };
    (Narrow($kind:ident)) => { OpOutput::Narrow(ArgKind::$kind) };
}

macro_rules! cache_ir_handler_fn {
    ($(#[$doc:meta])* $emit:ident ($($arg:ident : $kind:ident),*) Def($out:ident)) => {
        $(#[$doc])*
        fn $emit(
            &mut self,
            $($arg: cache_ir_handler_type!($kind),)*
            result: cache_ir_handler_type!($out),
        ) -> Result<(), Self::Error>;
    };
    ($(#[$doc:meta])* $emit:ident ($($arg:ident : $kind:ident),*) Narrow($out:ident)) => {
        cache_ir_handler_fn! { $(#[$doc])* $emit ($($arg: $kind),*) }
    };
    ($(#[$doc:meta])* $emit:ident ($($arg:ident : $kind:ident),*)) => {
        $(#[$doc])*
        fn $emit(&mut self, $($arg: cache_ir_handler_type!($kind)),*) -> Result<(), Self::Error>;
    };
}

macro_rules! cache_ir_dispatch {
    ($handler:ident, $reader:ident, $emit:ident ($($arg:ident : $kind:ident),*) Def($out:ident)) => {{
        $(
            let $arg: cache_ir_handler_type!($kind) =
                FromArgBits::from_arg_bits($reader.read_arg(ArgKind::$kind)?)?;
        )*
        let result: cache_ir_handler_type!($out) =
            FromArgBits::from_arg_bits($reader.read_arg(ArgKind::$out)?)?;
        $handler.$emit($($arg,)* result)
    }};
    ($handler:ident, $reader:ident, $emit:ident ($($arg:ident : $kind:ident),*) Narrow($out:ident)) => {
        cache_ir_dispatch!($handler, $reader, $emit ($($arg: $kind),*))
    };
    ($handler:ident, $reader:ident, $emit:ident ($($arg:ident : $kind:ident),*)) => {{
        $(
            let $arg: cache_ir_handler_type!($kind) =
                FromArgBits::from_arg_bits($reader.read_arg(ArgKind::$kind)?)?;
        )*
        $handler.$emit($($arg),*)
    }};
}

macro_rules! cache_ir_writer_fn {
    ($(#[$doc:meta])* $name:ident $method:ident ($($arg:ident : $kind:ident),*) Def($out:ident)) => {
        $(#[$doc])*
        pub fn $method(&mut self, $($arg: cache_ir_writer_type!($kind)),*) -> cache_ir_writer_type!($out) {
            self.write_op(CacheOp::$name);
            $( self.write_arg(ArgKind::$kind, ArgBits::into_arg_bits($arg)); )*
            let result = self.new_operand_id();
            self.write_arg(ArgKind::$out, result as u64);
            OperandIdType::from_raw(result)
        }
    };
    ($(#[$doc:meta])* $name:ident $method:ident
        ($first:ident : $first_kind:ident $(, $arg:ident : $kind:ident)*) Narrow($out:ident)) => {
        $(#[$doc])*
        pub fn $method(
            &mut self,
            $first: cache_ir_writer_type!($first_kind)
            $(, $arg: cache_ir_writer_type!($kind))*
        ) -> cache_ir_writer_type!($out) {
            self.write_op(CacheOp::$name);
            self.write_arg(ArgKind::$first_kind, ArgBits::into_arg_bits($first));
            $( self.write_arg(ArgKind::$kind, ArgBits::into_arg_bits($arg)); )*
            OperandIdType::from_raw($first.raw())
        }
    };
    ($(#[$doc:meta])* $name:ident $method:ident ($($arg:ident : $kind:ident),*)) => {
        $(#[$doc])*
        pub fn $method(&mut self, $($arg: cache_ir_writer_type!($kind)),*) {
            self.write_op(CacheOp::$name);
            $( self.write_arg(ArgKind::$kind, ArgBits::into_arg_bits($arg)); )*
        }
    };
}

macro_rules! define_cache_ir_ops {
    ($(
        $(#[$doc:meta])*
        $name:ident [$class:ident] ($($arg:ident : $kind:ident),* $(,)?) $(-> $out:ident ($out_kind:ident))?;
    )*) => {
        paste::paste! {
            /// A CacheIR opcode.
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            #[repr(u8)]
            pub enum CacheOp {
                $( $(#[$doc])* $name, )*
            }

            impl CacheOp {
                /// Every opcode, in encoding order.
                pub const ALL: &'static [CacheOp] = &[$(CacheOp::$name),*];

                /// Decode an opcode byte.
                #[inline]
                pub fn from_u8(byte: u8) -> Option<Self> {
                    Self::ALL.get(byte as usize).copied()
                }

                /// Opcode name.
                pub const fn name(self) -> &'static str {
                    match self {
                        $( CacheOp::$name => stringify!($name), )*
                    }
                }

                /// Opcode class.
                pub const fn class(self) -> OpClass {
                    match self {
                        $( CacheOp::$name => OpClass::$class, )*
                    }
                }

                /// Argument kinds, in encoding order (the defined operand,
                /// if any, is not included).
                pub const fn arg_kinds(self) -> &'static [ArgKind] {
                    match self {
                        $( CacheOp::$name => &[$(ArgKind::$kind),*], )*
                    }
                }

                /// Argument names, parallel to [`CacheOp::arg_kinds`].
                pub const fn arg_names(self) -> &'static [&'static str] {
                    match self {
                        $( CacheOp::$name => &[$(stringify!($arg)),*], )*
                    }
                }

                /// Effect on the operand table.
                pub const fn output(self) -> OpOutput {
                    match self {
                        $( CacheOp::$name => cache_ir_output!($($out($out_kind))?), )*
                    }
                }
            }

            /// One handler per opcode. Implemented by the Baseline compiler
            /// and the Warp transpiler.
            ///
            /// Stub-field arguments arrive as byte offsets into the stub data;
            /// operand arguments as typed ids; a defined operand as the trailing
            /// `result` argument.
            pub trait CacheIROps {
                /// Error returned by handlers.
                type Error;

                $(
                    cache_ir_handler_fn! {
                        $(#[$doc])*
                        [<emit_ $name:snake>] ($($arg: $kind),*) $($out($out_kind))?
                    }
                )*
            }

            /// Decode the arguments of `op` from `reader` and call its handler.
            pub fn dispatch_op<H>(
                handler: &mut H,
                op: CacheOp,
                reader: &mut CacheIRReader<'_>,
            ) -> Result<(), H::Error>
            where
                H: CacheIROps + ?Sized,
                H::Error: From<CacheIRError>,
            {
                match op {
                    $(
                        CacheOp::$name => cache_ir_dispatch!(
                            handler, reader, [<emit_ $name:snake>] ($($arg: $kind),*) $($out($out_kind))?
                        ),
                    )*
                }
            }

            impl CacheIRWriter {
                $(
                    cache_ir_writer_fn! {
                        $(#[$doc])*
                        $name [<$name:snake>] ($($arg: $kind),*) $($out($out_kind))?
                    }
                )*
            }
        }
    };
}

define_cache_ir_ops! {
    // Value guards

    /// Fail unless the value is an object.
    GuardToObject [Guard] (input: ValId) -> Narrow(ObjId);
    /// Fail unless the value is `null` or `undefined`.
    GuardIsNullOrUndefined [Guard] (input: ValId);
    /// Fail unless the value is `null`.
    GuardIsNull [Guard] (input: ValId);
    /// Fail unless the value is `undefined`.
    GuardIsUndefined [Guard] (input: ValId);
    /// Fail unless the value is a string.
    GuardToString [Guard] (input: ValId) -> Narrow(StrId);
    /// Fail unless the value is a symbol.
    GuardToSymbol [Guard] (input: ValId) -> Narrow(SymId);
    /// Fail unless the value is a bigint.
    GuardToBigInt [Guard] (input: ValId) -> Narrow(BigIntId);
    /// Fail unless the value is a boolean.
    GuardToBoolean [Guard] (input: ValId) -> Narrow(BoolId);
    /// Fail unless the value is an int32.
    GuardToInt32 [Guard] (input: ValId) -> Narrow(Int32Id);
    /// Fail unless the value is a number.
    GuardIsNumber [Guard] (input: ValId) -> Narrow(NumId);
    /// Fail unless the value has type tag `ty` (never `Double`).
    GuardNonDoubleType [Guard] (input: ValId, ty: ValueType);
    /// Int32 index from an int32, or a double with an exact int32 value.
    GuardToInt32Index [Guard] (input: ValId) -> Def(Int32Id);
    /// `0` or `1` from a boolean.
    GuardBooleanToInt32 [Def] (input: BoolId) -> Def(Int32Id);

    // Object guards

    /// Fail unless the object has the shape in the stub field.
    GuardShape [Guard] (obj: ObjId, shape: ShapeField);
    /// Fail unless the object has the group in the stub field.
    GuardGroup [Guard] (obj: ObjId, group: GroupField);
    /// Fail unless the object is of a builtin class.
    GuardClass [Guard] (obj: ObjId, kind: GuardClassKind);
    /// Fail unless the object's class is the one in the stub field.
    GuardAnyClass [Guard] (obj: ObjId, clasp: ClassField);
    /// Fail unless the object's prototype is the object in the stub field.
    GuardProto [Guard] (obj: ObjId, proto: ObjectField);
    /// Fail unless the object has a null prototype.
    GuardNullProto [Guard] (obj: ObjId);
    /// Fail unless the object is a proxy.
    GuardIsProxy [Guard] (obj: ObjId);
    /// Fail if the object is a proxy.
    GuardIsNotProxy [Guard] (obj: ObjId);
    /// Fail unless the object is the one in the stub field.
    GuardSpecificObject [Guard] (obj: ObjId, expected: ObjectField);
    /// Fail unless the function is the one in the stub field. Warp keeps
    /// the packed nargs and flags for inlining decisions.
    GuardSpecificFunction [Guard] (fun: ObjId, expected: ObjectField, nargs_and_flags: RawWordField);
    /// Fail unless the string is the atom in the stub field.
    GuardSpecificAtom [Guard] (str: StrId, expected: StringField);
    /// Fail unless the symbol is the one in the stub field.
    GuardSpecificSymbol [Guard] (sym: SymId, expected: SymbolField);
    /// Fail if the object has any initialized dense element.
    GuardNoDenseElements [Guard] (obj: ObjId);
    /// Fail unless the array's elements contain no hole.
    GuardArrayIsPacked [Guard] (array: ObjId);
    /// Fail unless the function is a constructor.
    GuardFunctionIsConstructor [Guard] (fun: ObjId);
    /// Fail unless the function has a JIT entry (and, when `constructing`,
    /// is a constructor).
    GuardFunctionHasJitEntry [Guard] (fun: ObjId, constructing: Bool);
    /// Fail if the function has a JIT entry.
    GuardFunctionHasNoJitEntry [Guard] (fun: ObjId);
    /// Fail if the function is a class constructor.
    GuardNotClassConstructor [Guard] (fun: ObjId);
    /// Fail if the int32 is negative.
    GuardInt32IsNonNegative [Guard] (index: Int32Id);

    // Definitions

    /// The object in the stub field.
    LoadObject [Def] (obj: ObjectField) -> Def(ObjId);
    /// The object's prototype; fails on a null prototype.
    LoadProto [Guard] (obj: ObjId) -> Def(ObjId);
    /// The int32 in the stub field.
    LoadInt32Constant [Def] (value: RawWordField) -> Def(Int32Id);
    /// A boolean constant.
    LoadBooleanConstant [Def] (value: Bool) -> Def(BoolId);
    /// `undefined`.
    LoadUndefined [Def] () -> Def(ValId);
    /// The atom in the stub field.
    LoadConstantString [Def] (str: StringField) -> Def(StrId);
    /// A call argument at a slot index known when the stub was generated.
    LoadArgumentFixedSlot [Def] (slot_index: Byte) -> Def(ValId);
    /// A call argument at `argc + slot_index`.
    LoadArgumentDynamicSlot [Def] (argc: Int32Id, slot_index: Byte) -> Def(ValId);
    /// `Math.min`/`Math.max` of two int32s.
    Int32MinMax [Def] (is_max: Bool, first: Int32Id, second: Int32Id) -> Def(Int32Id);
    /// `Math.min`/`Math.max` of two numbers.
    NumberMinMax [Def] (is_max: Bool, first: NumId, second: NumId) -> Def(NumId);
    /// Array length as an int32; fails if it does not fit.
    LoadInt32ArrayLength [Guard] (obj: ObjId) -> Def(Int32Id);

    // Results

    /// Load the fixed slot at the offset in the stub field.
    LoadFixedSlotResult [Result] (obj: ObjId, offset: RawWordField);
    /// Load the dynamic slot at the offset in the stub field.
    LoadDynamicSlotResult [Result] (obj: ObjId, offset: RawWordField);
    /// Load a dense element; fails when out of bounds or a hole.
    LoadDenseElementResult [GuardResult] (obj: ObjId, index: Int32Id);
    /// Load a dense element, `undefined` for holes and out-of-bounds
    /// indices; fails on negative indices.
    LoadDenseElementHoleResult [GuardResult] (obj: ObjId, index: Int32Id);
    /// Array length; fails if it does not fit an int32.
    LoadInt32ArrayLengthResult [GuardResult] (obj: ObjId);
    /// String length.
    LoadStringLengthResult [Result] (str: StrId);
    /// One-unit string at an index; fails when out of bounds.
    LoadStringCharResult [GuardResult] (str: StrId, index: Int32Id);
    /// UTF-16 code unit at an index; fails when out of bounds.
    LoadStringCharCodeResult [GuardResult] (str: StrId, index: Int32Id);
    /// Return an int32.
    LoadInt32Result [Result] (val: Int32Id);
    /// Return a number as a double.
    LoadDoubleResult [Result] (val: NumId);
    /// Return a boolean constant.
    LoadBooleanResult [Result] (val: Bool);
    /// Return `undefined`.
    LoadUndefinedResult [Result] ();
    /// Return an object.
    LoadObjectResult [Result] (obj: ObjId);
    /// Return a string.
    LoadStringResult [Result] (str: StrId);
    /// Return a symbol.
    LoadSymbolResult [Result] (sym: SymId);
    /// `typeof` of an object.
    LoadTypeOfObjectResult [Result] (obj: ObjId);
    /// Return the value in the stub field.
    LoadValueResult [Result] (val: ValueField);
    /// `ToBoolean(value)`.
    LoadValueTruthyResult [Result] (input: ValId);
    /// Whether the value is an object.
    IsObjectResult [Result] (input: ValId);
    /// Whether the value is callable.
    IsCallableResult [Result] (input: ValId);
    /// Whether the object's class is the one in the stub field.
    HasClassResult [Result] (obj: ObjId, clasp: ClassField);

    // Int32 arithmetic

    /// `lhs + rhs`; fails on overflow.
    Int32AddResult [GuardResult] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs - rhs`; fails on overflow.
    Int32SubResult [GuardResult] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs * rhs`; fails on overflow and negative zero.
    Int32MulResult [GuardResult] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs / rhs`; fails unless the quotient is an exact int32.
    Int32DivResult [GuardResult] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs % rhs`; fails on a zero divisor and negative zero.
    Int32ModResult [GuardResult] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs | rhs`
    Int32BitOrResult [Result] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs ^ rhs`
    Int32BitXorResult [Result] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs & rhs`
    Int32BitAndResult [Result] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs << rhs`
    Int32LeftShiftResult [Result] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs >> rhs`
    Int32RightShiftResult [Result] (lhs: Int32Id, rhs: Int32Id);
    /// `lhs >>> rhs`; results above `i32::MAX` fail unless `allow_double`.
    Int32UnsignedRightShiftResult [GuardResult] (lhs: Int32Id, rhs: Int32Id, allow_double: Bool);
    /// `~input`
    Int32NotResult [Result] (input: Int32Id);
    /// `-input`; fails on `0` and `i32::MIN`.
    Int32NegationResult [GuardResult] (input: Int32Id);
    /// `input + 1`; fails on overflow.
    Int32IncResult [GuardResult] (input: Int32Id);
    /// `input - 1`; fails on overflow.
    Int32DecResult [GuardResult] (input: Int32Id);

    // Double arithmetic

    /// `lhs + rhs`
    DoubleAddResult [Result] (lhs: NumId, rhs: NumId);
    /// `lhs - rhs`
    DoubleSubResult [Result] (lhs: NumId, rhs: NumId);
    /// `lhs * rhs`
    DoubleMulResult [Result] (lhs: NumId, rhs: NumId);
    /// `lhs / rhs`
    DoubleDivResult [Result] (lhs: NumId, rhs: NumId);
    /// `lhs % rhs`
    DoubleModResult [Result] (lhs: NumId, rhs: NumId);
    /// `lhs ** rhs`
    DoublePowResult [Result] (lhs: NumId, rhs: NumId);
    /// `-input`
    DoubleNegationResult [Result] (input: NumId);
    /// `input + 1`
    DoubleIncResult [Result] (input: NumId);
    /// `input - 1`
    DoubleDecResult [Result] (input: NumId);

    // Comparisons

    /// Compare two int32s.
    CompareInt32Result [Result] (op: JSOp, lhs: Int32Id, rhs: Int32Id);
    /// Compare two numbers.
    CompareDoubleResult [Result] (op: JSOp, lhs: NumId, rhs: NumId);
    /// Compare two strings.
    CompareStringResult [Result] (op: JSOp, lhs: StrId, rhs: StrId);
    /// Compare two objects for (in)equality.
    CompareObjectResult [Result] (op: JSOp, lhs: ObjId, rhs: ObjId);
    /// Compare two symbols for (in)equality.
    CompareSymbolResult [Result] (op: JSOp, lhs: SymId, rhs: SymId);
    /// Compare a value against `null` or `undefined`.
    CompareNullUndefinedResult [Result] (op: JSOp, is_undefined: Bool, input: ValId);

    // Math

    /// `Math.abs` of an int32; fails on `i32::MIN`.
    MathAbsInt32Result [GuardResult] (input: Int32Id);
    /// `Math.abs` of a number.
    MathAbsNumberResult [Result] (input: NumId);
    /// `Math.sqrt`
    MathSqrtNumberResult [Result] (input: NumId);
    /// `Math.floor` as an int32; fails if the result does not fit or is `-0`.
    MathFloorToInt32Result [GuardResult] (input: NumId);
    /// A unary `Math` function on a number.
    MathFunctionNumberResult [Result] (input: NumId, fun: MathFunction);
    /// `lhs + rhs` on strings.
    CallStringConcatResult [Result] (lhs: StrId, rhs: StrId);

    // Stores

    /// Store to the fixed slot at the offset in the stub field.
    StoreFixedSlot [Effect] (obj: ObjId, offset: RawWordField, rhs: ValId);
    /// Store to the dynamic slot at the offset in the stub field.
    StoreDynamicSlot [Effect] (obj: ObjId, offset: RawWordField, rhs: ValId);
    /// Add a property stored in a fixed slot.
    AddAndStoreFixedSlot [Effect] (
        obj: ObjId, offset: RawWordField, rhs: ValId,
        change_group: Bool, new_group: GroupField, new_shape: ShapeField,
    );
    /// Add a property stored in an existing dynamic slot.
    AddAndStoreDynamicSlot [Effect] (
        obj: ObjId, offset: RawWordField, rhs: ValId,
        change_group: Bool, new_group: GroupField, new_shape: ShapeField,
    );
    /// Grow the dynamic slots, then add a property stored in them.
    AllocateAndStoreDynamicSlot [Effect] (
        obj: ObjId, offset: RawWordField, rhs: ValId,
        change_group: Bool, new_group: GroupField, new_shape: ShapeField,
        num_new_slots: RawWordField,
    );
    /// Overwrite an existing dense element; fails when out of bounds or
    /// a hole.
    StoreDenseElement [Effect] (obj: ObjId, index: Int32Id, rhs: ValId);
    /// Store a dense element, filling a hole or (with `handle_add`)
    /// appending at the initialized length.
    StoreDenseElementHole [Effect] (obj: ObjId, index: Int32Id, rhs: ValId, handle_add: Bool);
    /// `array.push(rhs)`, returning the new length.
    ArrayPush [EffectResult] (obj: ObjId, rhs: ValId);

    // Proxies and megamorphic access

    /// Proxy `[[Get]]` of a constant key.
    ProxyGetResult [EffectResult] (obj: ObjId, id: IdField);
    /// Proxy `[[Get]]` of a computed key.
    ProxyGetByValueResult [EffectResult] (obj: ObjId, id: ValId);
    /// Proxy `[[HasProperty]]` or own-property check.
    ProxyHasPropResult [EffectResult] (obj: ObjId, id: ValId, has_own: Bool);
    /// Proxy `[[Set]]` of a constant key.
    ProxySet [Effect] (obj: ObjId, id: IdField, rhs: ValId, strict: Bool);
    /// Pure lookup along the prototype chain; fails when a proxy or
    /// accessor is found.
    MegamorphicLoadSlotResult [GuardResult] (obj: ObjId, name: IdField);
    /// Generic `[[Set]]` of a constant key.
    MegamorphicStoreSlot [Effect] (obj: ObjId, name: IdField, rhs: ValId);
    /// Pure `in` or own-property check; fails on proxies.
    MegamorphicHasPropResult [GuardResult] (obj: ObjId, id: ValId, has_own: Bool);

    // Accessor calls

    /// Call a scripted getter.
    CallScriptedGetterResult [EffectResult] (
        receiver: ValId, getter: ObjectField, same_realm: Bool, nargs_and_flags: RawWordField,
    );
    /// Call a native getter.
    CallNativeGetterResult [EffectResult] (
        receiver: ValId, getter: ObjectField, same_realm: Bool, nargs_and_flags: RawWordField,
    );
    /// Call a scripted setter.
    CallScriptedSetter [Effect] (
        receiver: ObjId, setter: ObjectField, rhs: ValId, same_realm: Bool,
        nargs_and_flags: RawWordField,
    );
    /// Call a native setter.
    CallNativeSetter [Effect] (
        receiver: ObjId, setter: ObjectField, rhs: ValId, same_realm: Bool,
        nargs_and_flags: RawWordField,
    );

    // Calls

    /// Call a function with a JIT entry.
    CallScriptedFunction [EffectResult] (callee: ObjId, argc: Int32Id, flags: CallFlags);
    /// Call a native function.
    CallNativeFunction [EffectResult] (callee: ObjId, argc: Int32Id, flags: CallFlags);
    /// Call a DOM method with a known `this` object.
    CallDomFunction [EffectResult] (callee: ObjId, argc: Int32Id, this_obj: ObjId, flags: CallFlags);
    /// Call a function Warp may inline, with the IC script it should use.
    CallInlinedFunction [EffectResult] (callee: ObjId, argc: Int32Id, ic_script: RawWordField, flags: CallFlags);
    /// The template object Warp may use to allocate `this`. No code.
    MetaScriptedTemplateObject [Meta] (callee: ObjectField, template: ObjectField);

    // Terminals

    /// Record the result type in the fallback's monitor set, then return.
    TypeMonitorResult [Terminal] ();
    /// Return to the IC caller.
    ReturnFromIc [Terminal] ();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes_roundtrip() {
        for (i, op) in CacheOp::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, i);
            assert_eq!(CacheOp::from_u8(i as u8), Some(*op));
        }
        assert_eq!(CacheOp::from_u8(CacheOp::ALL.len() as u8), None);
    }

    #[test]
    fn test_schema_metadata() {
        assert_eq!(CacheOp::GuardShape.name(), "GuardShape");
        assert_eq!(CacheOp::GuardShape.class(), OpClass::Guard);
        assert_eq!(
            CacheOp::GuardShape.arg_kinds(),
            &[ArgKind::ObjId, ArgKind::ShapeField]
        );
        assert_eq!(CacheOp::GuardShape.arg_names(), &["obj", "shape"]);
        assert_eq!(
            CacheOp::GuardToObject.output(),
            OpOutput::Narrow(ArgKind::ObjId)
        );
        assert_eq!(
            CacheOp::GuardToInt32Index.output(),
            OpOutput::Def(ArgKind::Int32Id)
        );
        assert_eq!(CacheOp::ReturnFromIc.output(), OpOutput::None);
    }

    #[test]
    fn test_arg_names_match_kinds() {
        for op in CacheOp::ALL {
            assert_eq!(op.arg_kinds().len(), op.arg_names().len(), "{}", op.name());
        }
    }

    #[test]
    fn test_classes() {
        assert!(CacheOp::Int32AddResult.class().is_fallible());
        assert!(CacheOp::Int32AddResult.class().produces_result());
        assert!(CacheOp::StoreFixedSlot.class().is_effectful());
        assert!(!CacheOp::StoreFixedSlot.class().produces_result());
        assert!(CacheOp::CallScriptedFunction.class().is_effectful());
        assert_eq!(CacheOp::ReturnFromIc.class(), OpClass::Terminal);
    }
}
