//! VM functions callable from stub code.
//!
//! Stubs only take the fast paths they were specialized for. Anything that
//! needs the full runtime (proxy traps, generic sets, native getters, string
//! concatenation) goes through a VM function.
//!
//! # Calling conventions
//!
//! ```text
//! CallVM(fun)       may collect; needs a stub frame; exceptions propagate
//! CallWithABI(fun)  pure; never collects; never throws
//! ```
//!
//! Arguments are pushed on the machine stack, last argument first, so the
//! first argument is on top. The callee pops them. Object and string
//! arguments are payloads, values are boxed. On return `R0` holds the result
//! (payload for booleans, objects and strings, boxed for values) and `R1` is
//! 1 unless a fallible helper could not answer.

use otter_vm_core::{ObjectId, PropertyKey, Runtime, StringId, Value, ValueType, VmResult};
use otter_cacheir::JSOp;

use crate::ic::ICStub;

// ---------------------------------------------------------------------------
// Function table
// ---------------------------------------------------------------------------

/// Identifies a VM function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VMFunctionId {
    /// `(proxy, key) -> value`
    ProxyGetProperty = 0,
    /// `(proxy, id_value) -> value`
    ProxyGetPropertyByValue = 1,
    /// `(proxy, id_value, has_own) -> bool`
    ProxyHasProp = 2,
    /// `(proxy, key, rhs, strict) -> ()`
    ProxySetProperty = 3,
    /// `(obj, key, rhs) -> ()`, generic `[[Set]]`
    SetPropertyMegamorphic = 4,
    /// `(getter, receiver) -> value`
    CallNativeGetter = 5,
    /// `(setter, receiver, rhs) -> ()`
    CallNativeSetter = 6,
    /// `(callee, new_target) -> object`
    CreateThis = 7,
    /// `(lhs, rhs) -> string`
    ConcatStrings = 8,
    /// `(obj, rhs) -> ()`; records the type and extends the stub's set
    DoTypeUpdateFallback = 9,
    /// `(old_value) -> ()`
    PreWriteBarrier = 10,
    /// `(holder) -> ()`
    PostWriteBarrier = 11,
    /// `(obj, new_capacity) -> bool`
    GrowSlotsPure = 12,
    /// `(obj) -> bool`
    AddDenseElementPure = 13,
    /// `(obj, key) -> value`, fallible
    MegamorphicLoadSlot = 14,
    /// `(obj, id_value, has_own) -> bool`, fallible
    MegamorphicHasProp = 15,
    /// `(op, lhs, rhs) -> bool`
    CompareStrings = 16,
    /// `(str, index) -> string`, fallible
    StringCharAt = 17,
    /// `(obj) -> string`
    TypeOfObject = 18,
    /// `(value) -> bool`
    ToBoolean = 19,
    /// `(obj) -> bool`
    IsCallable = 20,
}

/// Number of VM functions.
pub const VM_FUNCTION_COUNT: usize = 21;

/// What a VM function leaves in `R0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMResultKind {
    /// Nothing (`R0 = undefined`)
    Void,
    /// A boxed value
    Value,
    /// A boolean payload
    Bool,
    /// An object payload
    Object,
    /// A string payload
    String,
}

impl VMFunctionId {
    /// Every function, by id.
    pub const ALL: [VMFunctionId; VM_FUNCTION_COUNT] = [
        Self::ProxyGetProperty,
        Self::ProxyGetPropertyByValue,
        Self::ProxyHasProp,
        Self::ProxySetProperty,
        Self::SetPropertyMegamorphic,
        Self::CallNativeGetter,
        Self::CallNativeSetter,
        Self::CreateThis,
        Self::ConcatStrings,
        Self::DoTypeUpdateFallback,
        Self::PreWriteBarrier,
        Self::PostWriteBarrier,
        Self::GrowSlotsPure,
        Self::AddDenseElementPure,
        Self::MegamorphicLoadSlot,
        Self::MegamorphicHasProp,
        Self::CompareStrings,
        Self::StringCharAt,
        Self::TypeOfObject,
        Self::ToBoolean,
        Self::IsCallable,
    ];

    /// Symbol name used in disassembly.
    pub fn name(self) -> &'static str {
        match self {
            Self::ProxyGetProperty => "otter_vm_proxy_get_property",
            Self::ProxyGetPropertyByValue => "otter_vm_proxy_get_property_by_value",
            Self::ProxyHasProp => "otter_vm_proxy_has_prop",
            Self::ProxySetProperty => "otter_vm_proxy_set_property",
            Self::SetPropertyMegamorphic => "otter_vm_set_property_megamorphic",
            Self::CallNativeGetter => "otter_vm_call_native_getter",
            Self::CallNativeSetter => "otter_vm_call_native_setter",
            Self::CreateThis => "otter_vm_create_this",
            Self::ConcatStrings => "otter_vm_concat_strings",
            Self::DoTypeUpdateFallback => "otter_vm_do_type_update_fallback",
            Self::PreWriteBarrier => "otter_abi_pre_write_barrier",
            Self::PostWriteBarrier => "otter_abi_post_write_barrier",
            Self::GrowSlotsPure => "otter_abi_grow_slots_pure",
            Self::AddDenseElementPure => "otter_abi_add_dense_element_pure",
            Self::MegamorphicLoadSlot => "otter_abi_megamorphic_load_slot",
            Self::MegamorphicHasProp => "otter_abi_megamorphic_has_prop",
            Self::CompareStrings => "otter_abi_compare_strings",
            Self::StringCharAt => "otter_abi_string_char_at",
            Self::TypeOfObject => "otter_abi_type_of_object",
            Self::ToBoolean => "otter_abi_to_boolean",
            Self::IsCallable => "otter_abi_is_callable",
        }
    }

    /// Number of stack arguments.
    pub fn arity(self) -> usize {
        match self {
            Self::PreWriteBarrier
            | Self::PostWriteBarrier
            | Self::AddDenseElementPure
            | Self::TypeOfObject
            | Self::ToBoolean
            | Self::IsCallable => 1,
            Self::ProxyGetProperty
            | Self::ProxyGetPropertyByValue
            | Self::CallNativeGetter
            | Self::CreateThis
            | Self::ConcatStrings
            | Self::DoTypeUpdateFallback
            | Self::GrowSlotsPure
            | Self::MegamorphicLoadSlot
            | Self::StringCharAt => 2,
            Self::ProxyHasProp
            | Self::SetPropertyMegamorphic
            | Self::CallNativeSetter
            | Self::MegamorphicHasProp
            | Self::CompareStrings => 3,
            Self::ProxySetProperty => 4,
        }
    }

    /// Whether the function may run a collection. Such functions must be
    /// called with `CallVM` from inside a stub frame.
    pub fn can_gc(self) -> bool {
        (self as u8) < (Self::PreWriteBarrier as u8)
    }

    /// Result representation.
    pub fn result(self) -> VMResultKind {
        match self {
            Self::ProxyGetProperty
            | Self::ProxyGetPropertyByValue
            | Self::CallNativeGetter
            | Self::MegamorphicLoadSlot => VMResultKind::Value,
            Self::ProxyHasProp
            | Self::GrowSlotsPure
            | Self::AddDenseElementPure
            | Self::MegamorphicHasProp
            | Self::CompareStrings
            | Self::ToBoolean
            | Self::IsCallable => VMResultKind::Bool,
            Self::CreateThis => VMResultKind::Object,
            Self::ConcatStrings | Self::StringCharAt | Self::TypeOfObject => VMResultKind::String,
            Self::ProxySetProperty
            | Self::SetPropertyMegamorphic
            | Self::CallNativeSetter
            | Self::DoTypeUpdateFallback
            | Self::PreWriteBarrier
            | Self::PostWriteBarrier => VMResultKind::Void,
        }
    }

    /// Whether `R1` can come back 0.
    pub fn is_fallible(self) -> bool {
        matches!(
            self,
            Self::MegamorphicLoadSlot | Self::MegamorphicHasProp | Self::StringCharAt
        )
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// What a VM function returned: the `R0` word and the `R1` success flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VMReturn {
    /// Result word
    pub value: u64,
    /// Success flag of fallible helpers
    pub ok: bool,
}

impl VMReturn {
    fn value(v: Value) -> Self {
        Self { value: v.to_bits(), ok: true }
    }

    fn boolean(b: bool) -> Self {
        Self { value: b as u64, ok: true }
    }

    fn object(obj: ObjectId) -> Self {
        Self { value: obj.index() as u64, ok: true }
    }

    fn string(s: StringId) -> Self {
        Self { value: s.index() as u64, ok: true }
    }

    fn void() -> Self {
        Self::value(Value::UNDEFINED)
    }

    fn failed() -> Self {
        Self { value: 0, ok: false }
    }
}

fn object_arg(word: u64) -> ObjectId {
    ObjectId::new(word as u32)
}

fn string_arg(word: u64) -> StringId {
    StringId::new(word as u32)
}

fn key_arg(word: u64) -> PropertyKey {
    PropertyKey::from_bits(word).unwrap_or(PropertyKey::Index(0))
}

/// Property key of a primitive without side effects, if it has one.
pub fn pure_property_key(id: Value) -> Option<PropertyKey> {
    match id.value_type() {
        ValueType::Int32 => u32::try_from(id.as_int32()?).ok().map(PropertyKey::Index),
        ValueType::String => id.as_string().map(PropertyKey::Atom),
        ValueType::Symbol => id.as_symbol().map(PropertyKey::Symbol),
        _ => None,
    }
}

impl VMFunctionId {
    /// Run the function. `args[0]` is the first argument.
    pub fn invoke(self, rt: &mut Runtime, stub: &ICStub, args: &[u64]) -> VmResult<VMReturn> {
        debug_assert_eq!(args.len(), self.arity(), "{}", self.name());
        if self.can_gc() {
            rt.maybe_gc();
        }
        let boxed = |i: usize| Value::from_bits(args[i]);
        Ok(match self {
            Self::ProxyGetProperty => {
                let proxy = object_arg(args[0]);
                VMReturn::value(rt.proxy_get(proxy, key_arg(args[1]), Value::object(proxy))?)
            }
            Self::ProxyGetPropertyByValue => {
                let proxy = object_arg(args[0]);
                let key = rt.to_property_key(boxed(1))?;
                VMReturn::value(rt.proxy_get(proxy, key, Value::object(proxy))?)
            }
            Self::ProxyHasProp => {
                let proxy = object_arg(args[0]);
                let key = rt.to_property_key(boxed(1))?;
                let found = if args[2] != 0 {
                    rt.has_own_property(proxy, key)?
                } else {
                    rt.has_property(proxy, key)?
                };
                VMReturn::boolean(found)
            }
            Self::ProxySetProperty => {
                let proxy = object_arg(args[0]);
                rt.proxy_set(proxy, key_arg(args[1]), boxed(2), args[3] != 0)?;
                VMReturn::void()
            }
            Self::SetPropertyMegamorphic => {
                rt.set_property(object_arg(args[0]), key_arg(args[1]), boxed(2))?;
                VMReturn::void()
            }
            Self::CallNativeGetter => {
                VMReturn::value(rt.call_getter(object_arg(args[0]), boxed(1))?)
            }
            Self::CallNativeSetter => {
                rt.call_setter(object_arg(args[0]), boxed(1), boxed(2))?;
                VMReturn::void()
            }
            Self::CreateThis => {
                let callee = object_arg(args[0]);
                let new_target = boxed(1).as_object().unwrap_or(callee);
                VMReturn::object(rt.create_this(callee, new_target))
            }
            Self::ConcatStrings => {
                VMReturn::string(rt.concat_strings(string_arg(args[0]), string_arg(args[1])))
            }
            Self::DoTypeUpdateFallback => {
                let obj = object_arg(args[0]);
                let value = boxed(1);
                if let Some(key) = stub.update_key() {
                    let group = rt.group_of(obj);
                    rt.groups.add_type(group, key, value);
                }
                stub.accept_type(value);
                VMReturn::void()
            }
            Self::PreWriteBarrier => {
                rt.gc.pre_write_barrier(boxed(0));
                VMReturn::void()
            }
            Self::PostWriteBarrier => {
                rt.gc.put_whole_cell(object_arg(args[0]));
                VMReturn::void()
            }
            Self::GrowSlotsPure => {
                VMReturn::boolean(rt.grow_slots_pure(object_arg(args[0]), args[1] as u32))
            }
            Self::AddDenseElementPure => {
                VMReturn::boolean(rt.add_dense_element_pure(object_arg(args[0])))
            }
            Self::MegamorphicLoadSlot => {
                match rt.megamorphic_load_slot(object_arg(args[0]), key_arg(args[1])) {
                    Some(v) => VMReturn::value(v),
                    None => VMReturn::failed(),
                }
            }
            Self::MegamorphicHasProp => {
                let found = pure_property_key(boxed(1)).and_then(|key| {
                    rt.megamorphic_has_prop(object_arg(args[0]), key, args[2] != 0)
                });
                match found {
                    Some(b) => VMReturn::boolean(b),
                    None => VMReturn::failed(),
                }
            }
            Self::CompareStrings => {
                let op = JSOp::from_u8(args[0] as u8).unwrap_or(JSOp::StrictEq);
                let ordering = rt.compare_strings(string_arg(args[1]), string_arg(args[2]));
                VMReturn::boolean(op.eval(Some(ordering)))
            }
            Self::StringCharAt => {
                match rt.string_char_at(string_arg(args[0]), args[1] as u32 as usize) {
                    Some(s) => VMReturn::string(s),
                    None => VMReturn::failed(),
                }
            }
            Self::TypeOfObject => VMReturn::string(rt.type_of(Value::object(object_arg(args[0])))),
            Self::ToBoolean => VMReturn::boolean(rt.to_boolean(boxed(0))),
            Self::IsCallable => VMReturn::boolean(rt.is_callable(object_arg(args[0]))),
        })
    }
}
