//! Every program in the corpus gives the same outcome on both tiers, and
//! leaves the heap in the same state.
//!
//! Each case builds its heap twice from scratch, once per tier, so object
//! ids line up and results can be compared bit for bit.

mod common;

use std::sync::Arc;

use common::{BothTiers, agree, object_with};
use otter_cacheir::{
    ArgFormat, CacheIRWriter, CacheKind, CallFlags, GuardClassKind, Int32OperandId, JSOp, NumberOperandId,
    ObjOperandId, UnaryMathFunction,
};
use otter_vm_core::{
    CallArgs, ClassFlags, Exception, ForwardingHandler, JSWhyMagic, ObjectId, PropertyKey, Runtime, SlotLocation,
    Value,
};
use otter_vm_jit::ICInputs;
use otter_warp::CallSite;

/// One corpus entry, built against a fresh runtime.
struct Case {
    writer: CacheIRWriter,
    call_site: Option<CallSite>,
    inputs: Vec<ICInputs>,
    /// Objects whose state must match after every run.
    watched: Vec<ObjectId>,
}

impl Case {
    fn new(writer: CacheIRWriter, inputs: Vec<ICInputs>) -> Self {
        Self { writer, call_site: None, inputs, watched: Vec::new() }
    }

    fn call_site(mut self, argc: u32, constructing: bool) -> Self {
        self.call_site = Some(CallSite::new(argc, constructing));
        self
    }

    /// Let the oracle splice the callee at this call site.
    fn inlined(mut self) -> Self {
        if let Some(site) = &mut self.call_site {
            site.inlined = true;
        }
        self
    }

    fn watch(mut self, objects: &[ObjectId]) -> Self {
        self.watched.extend_from_slice(objects);
        self
    }
}

/// Observable state of `obj`: its shape, its slots and its elements.
fn heap_state(rt: &Runtime, obj: ObjectId) -> Vec<u64> {
    let data = rt.object(obj);
    let mut words = vec![data.shape.index() as u64, data.elements.length as u64];
    words.extend(data.fixed_slots.iter().map(|v| v.to_bits()));
    words.extend(data.dynamic_slots.iter().map(|v| v.to_bits()));
    words.extend(data.elements.values.iter().map(|v| v.to_bits()));
    words
}

fn check(name: &str, build: impl Fn(&mut Runtime) -> Case) {
    let mut base_rt = Runtime::new();
    let base = build(&mut base_rt);
    let mut warp_rt = Runtime::new();
    let warp = build(&mut warp_rt);
    let tiers = BothTiers::new(&base.writer, base.call_site);
    let home = base_rt.current_realm();

    for (i, (b, w)) in base.inputs.iter().zip(&warp.inputs).enumerate() {
        let baseline = tiers.baseline(&mut base_rt, b);
        let warped = tiers.warp(&mut warp_rt, w);
        assert!(agree(&baseline, &warped), "{name}[{i}]: baseline {baseline:?}, warp {warped:?}");
        for (&x, &y) in base.watched.iter().zip(&warp.watched) {
            assert_eq!(heap_state(&base_rt, x), heap_state(&warp_rt, y), "{name}[{i}]: heap differs");
        }
        assert!(base_rt.frames().is_empty() && warp_rt.frames().is_empty(), "{name}[{i}]: frame left behind");
        assert_eq!(base_rt.current_realm(), home, "{name}[{i}]: baseline left its realm");
        assert_eq!(warp_rt.current_realm(), home, "{name}[{i}]: warp left its realm");
    }
}

fn binary(kind: CacheKind, pairs: &[(Value, Value)]) -> Vec<ICInputs> {
    pairs.iter().map(|&(a, b)| ICInputs::new(kind, &[a, b])).collect()
}

fn int32_pairs(rt: &mut Runtime) -> Vec<(Value, Value)> {
    let x = rt.string_value("x");
    [(2, 3), (-6, 7), (0, -7), (12, 4), (7, 2), (1, 0), (0, -3), (i32::MAX, 1), (i32::MIN, -1), (1 << 20, 1 << 20)]
        .into_iter()
        .map(|(a, b)| (Value::int32(a), Value::int32(b)))
        .chain([(x, Value::int32(1)), (Value::double(1.5), Value::int32(1)), (Value::NULL, Value::int32(1))])
        .collect()
}

fn int32_arith(rt: &mut Runtime, emit: fn(&mut CacheIRWriter, Int32OperandId, Int32OperandId)) -> Case {
    let mut w = CacheIRWriter::new(CacheKind::BinaryArith);
    let lhs = w.guard_to_int32(w.input_val(0));
    let rhs = w.guard_to_int32(w.input_val(1));
    emit(&mut w, lhs, rhs);
    w.return_from_ic();
    let pairs = int32_pairs(rt);
    Case::new(w, binary(CacheKind::BinaryArith, &pairs))
}

#[test]
fn int32_arithmetic() {
    check("add", |rt| int32_arith(rt, |w, l, r| w.int32_add_result(l, r)));
    check("sub", |rt| int32_arith(rt, |w, l, r| w.int32_sub_result(l, r)));
    check("mul", |rt| int32_arith(rt, |w, l, r| w.int32_mul_result(l, r)));
    check("div", |rt| int32_arith(rt, |w, l, r| w.int32_div_result(l, r)));
    check("mod", |rt| int32_arith(rt, |w, l, r| w.int32_mod_result(l, r)));
}

#[test]
fn int32_comparisons() {
    for op in [JSOp::Lt, JSOp::Le, JSOp::Gt, JSOp::Ge, JSOp::StrictEq, JSOp::Ne] {
        let mut w = CacheIRWriter::new(CacheKind::Compare);
        let lhs = w.guard_to_int32(w.input_val(0));
        let rhs = w.guard_to_int32(w.input_val(1));
        w.compare_int32_result(op, lhs, rhs);
        w.return_from_ic();
        let mut base_rt = Runtime::new();
        let mut warp_rt = Runtime::new();
        let tiers = BothTiers::new(&w, None);
        for (a, b) in int32_pairs(&mut base_rt).into_iter().zip(int32_pairs(&mut warp_rt)) {
            let baseline = tiers.baseline(&mut base_rt, &ICInputs::new(CacheKind::Compare, &[a.0, a.1]));
            let warped = tiers.warp(&mut warp_rt, &ICInputs::new(CacheKind::Compare, &[b.0, b.1]));
            assert!(agree(&baseline, &warped), "{op:?}: baseline {baseline:?}, warp {warped:?}");
        }
    }
}

#[test]
fn shape_guarded_loads() {
    check("fixed slot", |rt| {
        let (obj, offset) = object_with(rt, "x", Value::int32(4));
        let (other, _) = object_with(rt, "y", Value::int32(5));
        let mut w = CacheIRWriter::new(CacheKind::GetProp);
        let o = w.guard_to_object(w.input_val(0));
        w.guard_shape(o, rt.shape_of(obj));
        w.load_fixed_slot_result(o, offset);
        w.return_from_ic();
        let s = rt.string_value("s");
        let inputs = [Value::object(obj), Value::object(other), Value::int32(1), s, Value::UNDEFINED]
            .into_iter()
            .map(|v| ICInputs::new(CacheKind::GetProp, &[v]))
            .collect();
        Case::new(w, inputs)
    });
}

#[test]
fn slot_stores() {
    check("store fixed slot", |rt| {
        let (obj, offset) = object_with(rt, "x", Value::int32(1));
        let (other, _) = object_with(rt, "y", Value::int32(5));
        let mut w = CacheIRWriter::new(CacheKind::SetProp);
        let o = w.guard_to_object(w.input_val(0));
        w.guard_shape(o, rt.shape_of(obj));
        w.store_fixed_slot(o, offset, w.input_val(1));
        w.return_from_ic();
        let s = rt.string_value("stored");
        let inputs = binary(
            CacheKind::SetProp,
            &[
                (Value::object(obj), Value::int32(9)),
                (Value::object(other), Value::int32(10)),
                (Value::object(obj), s),
                (Value::int32(3), Value::int32(11)),
            ],
        );
        Case::new(w, inputs).watch(&[obj, other])
    });
}

#[test]
fn array_push() {
    check("push", |rt| {
        let array = rt.new_array(vec![Value::int32(1), Value::int32(2)]);
        let plain = rt.new_object(None);
        let mut w = CacheIRWriter::new(CacheKind::SetProp);
        let o = w.guard_to_object(w.input_val(0));
        w.guard_class(o, GuardClassKind::Array);
        w.array_push(o, w.input_val(1));
        w.return_from_ic();
        let inputs = binary(
            CacheKind::SetProp,
            &[
                (Value::object(array), Value::int32(3)),
                (Value::object(plain), Value::int32(4)),
                (Value::object(array), Value::TRUE),
                (Value::object(array), Value::NULL),
            ],
        );
        Case::new(w, inputs).watch(&[array, plain])
    });
}

#[test]
fn dense_element_loads() {
    check("dense load", |rt| {
        let array = rt.new_array(vec![Value::int32(10), Value::int32(20), Value::magic(JSWhyMagic::ElementsHole)]);
        let mut w = CacheIRWriter::new(CacheKind::GetElem);
        let obj = w.guard_to_object(w.input_val(0));
        let index = w.guard_to_int32_index(w.input_val(1));
        w.load_dense_element_result(obj, index);
        w.type_monitor_result();
        let x = rt.string_value("x");
        let a = Value::object(array);
        let inputs = binary(
            CacheKind::GetElem,
            &[
                (a, Value::int32(0)),
                (a, Value::int32(1)),
                (a, Value::double(1.0)),
                (a, Value::double(1.5)),
                (a, Value::int32(2)),
                (a, Value::int32(3)),
                (a, Value::int32(-1)),
                (a, x),
            ],
        );
        Case::new(w, inputs).watch(&[array])
    });
}

#[test]
fn truthiness() {
    check("truthy", |rt| {
        let mut w = CacheIRWriter::new(CacheKind::ToBool);
        w.load_value_truthy_result(w.input_val(0));
        w.return_from_ic();
        let empty = rt.string_value("");
        let full = rt.string_value("no");
        let obj = rt.new_object(None);
        let inputs = [
            Value::UNDEFINED,
            Value::NULL,
            Value::TRUE,
            Value::int32(0),
            Value::int32(-3),
            Value::double(0.0),
            Value::double(f64::NAN),
            Value::double(2.5),
            empty,
            full,
            Value::object(obj),
        ]
        .into_iter()
        .map(|v| ICInputs::new(CacheKind::ToBool, &[v]))
        .collect();
        Case::new(w, inputs)
    });
}

fn call_program(slot: u8, callee: ObjectId, native: bool, flags: CallFlags) -> CacheIRWriter {
    let mut w = CacheIRWriter::new(CacheKind::Call);
    let argc = w.input_argc();
    let callee_val = w.load_argument_fixed_slot(slot);
    let callee_obj = w.guard_to_object(callee_val);
    w.guard_specific_function(callee_obj, callee, 0);
    if native {
        w.call_native_function(callee_obj, argc, flags);
    } else {
        w.call_scripted_function(callee_obj, argc, flags);
    }
    w.type_monitor_result();
    w
}

#[test]
fn calls() {
    check("scripted", |rt| {
        let sub = rt.new_scripted_function(2, |_, args| {
            let a = args.args[0].as_int32().unwrap_or(0);
            let b = args.args[1].as_int32().unwrap_or(0);
            Ok(Value::int32(a - b))
        });
        let other = rt.new_scripted_function(2, |_, _| Ok(Value::NULL));
        let w = call_program(3, sub, false, CallFlags::new(ArgFormat::Standard));
        let args = [Value::int32(10), Value::int32(4)];
        let inputs = vec![
            ICInputs::call(Value::object(sub), Value::UNDEFINED, &args, None),
            ICInputs::call(Value::object(other), Value::UNDEFINED, &args, None),
            ICInputs::call(Value::int32(0), Value::UNDEFINED, &args, None),
        ];
        Case::new(w, inputs).call_site(2, false)
    });

    check("rectified", |rt| {
        let f = rt.new_scripted_function(3, |_, args| {
            Ok(Value::boolean(args.argc == 1 && args.args.len() == 3 && args.args[2].is_undefined()))
        });
        let w = call_program(2, f, false, CallFlags::new(ArgFormat::Standard));
        let inputs = vec![ICInputs::call(Value::object(f), Value::UNDEFINED, &[Value::int32(1)], None)];
        Case::new(w, inputs).call_site(1, false)
    });

    check("native", |rt| {
        let obj = rt.new_object(None);
        let key = rt.atom_key("seen");
        let record = rt.new_native_function(1, move |rt, args| {
            rt.define_property(obj, key, args.args[0]);
            Ok(Value::int32(args.argc as i32))
        });
        let w = call_program(2, record, true, CallFlags::new(ArgFormat::Standard));
        let inputs = vec![
            ICInputs::call(Value::object(record), Value::UNDEFINED, &[Value::int32(8)], None),
            ICInputs::call(Value::object(record), Value::UNDEFINED, &[Value::TRUE], None),
        ];
        Case::new(w, inputs).call_site(1, false).watch(&[obj])
    });

    check("throwing", |rt| {
        let thrower = rt.new_native_function(0, |_, _| Err(Exception::new(Value::int32(42))));
        let w = call_program(1, thrower, true, CallFlags::new(ArgFormat::Standard));
        let inputs = vec![ICInputs::call(Value::object(thrower), Value::UNDEFINED, &[], None)];
        Case::new(w, inputs).call_site(0, false)
    });

    check("constructor", |rt| {
        let ctor = rt.new_scripted_function(0, |_, _| Ok(Value::int32(3)));
        let w = call_program(2, ctor, false, CallFlags::constructing(ArgFormat::Standard));
        let constructing = Value::magic(JSWhyMagic::IsConstructing);
        let inputs = vec![ICInputs::call(Value::object(ctor), constructing, &[], Some(Value::object(ctor)))];
        Case::new(w, inputs).call_site(0, true)
    });
}

fn number_pairs(rt: &mut Runtime) -> Vec<(Value, Value)> {
    let x = rt.string_value("x");
    [(1.5, 2.0), (-0.0, 0.0), (5.0, 0.0), (-7.5, 2.0), (1e308, 1e308), (f64::NAN, 1.0), (2.0, 0.5)]
        .into_iter()
        .map(|(a, b)| (Value::double(a), Value::double(b)))
        .chain([
            (Value::int32(7), Value::double(0.25)),
            (Value::int32(-3), Value::int32(2)),
            (x, Value::double(1.0)),
            (Value::double(1.0), Value::TRUE),
        ])
        .collect()
}

fn double_arith(rt: &mut Runtime, emit: fn(&mut CacheIRWriter, NumberOperandId, NumberOperandId)) -> Case {
    let mut w = CacheIRWriter::new(CacheKind::BinaryArith);
    let lhs = w.guard_is_number(w.input_val(0));
    let rhs = w.guard_is_number(w.input_val(1));
    emit(&mut w, lhs, rhs);
    w.return_from_ic();
    let pairs = number_pairs(rt);
    Case::new(w, binary(CacheKind::BinaryArith, &pairs))
}

fn number_unary(rt: &mut Runtime, emit: impl Fn(&mut CacheIRWriter, NumberOperandId)) -> Case {
    let mut w = CacheIRWriter::new(CacheKind::UnaryArith);
    let input = w.guard_is_number(w.input_val(0));
    emit(&mut w, input);
    w.return_from_ic();
    let s = rt.string_value("1");
    let inputs = [
        Value::double(2.5),
        Value::double(-2.5),
        Value::double(-0.0),
        Value::double(0.3),
        Value::double(f64::NAN),
        Value::double(f64::INFINITY),
        Value::double(3e10),
        Value::int32(-9),
        Value::int32(i32::MIN),
        s,
        Value::UNDEFINED,
    ]
    .into_iter()
    .map(|v| ICInputs::new(CacheKind::UnaryArith, &[v]))
    .collect();
    Case::new(w, inputs)
}

#[test]
fn double_arithmetic() {
    check("add", |rt| double_arith(rt, |w, l, r| w.double_add_result(l, r)));
    check("sub", |rt| double_arith(rt, |w, l, r| w.double_sub_result(l, r)));
    check("mul", |rt| double_arith(rt, |w, l, r| w.double_mul_result(l, r)));
    check("div", |rt| double_arith(rt, |w, l, r| w.double_div_result(l, r)));
    check("mod", |rt| double_arith(rt, |w, l, r| w.double_mod_result(l, r)));
    check("pow", |rt| double_arith(rt, |w, l, r| w.double_pow_result(l, r)));
    check("negate", |rt| number_unary(rt, |w, n| w.double_negation_result(n)));
    check("inc", |rt| number_unary(rt, |w, n| w.double_inc_result(n)));
    check("dec", |rt| number_unary(rt, |w, n| w.double_dec_result(n)));
    for op in [JSOp::Lt, JSOp::Ge, JSOp::StrictEq, JSOp::Ne] {
        check("compare", move |rt| {
            let mut w = CacheIRWriter::new(CacheKind::Compare);
            let lhs = w.guard_is_number(w.input_val(0));
            let rhs = w.guard_is_number(w.input_val(1));
            w.compare_double_result(op, lhs, rhs);
            w.return_from_ic();
            let pairs = number_pairs(rt);
            Case::new(w, binary(CacheKind::Compare, &pairs))
        });
    }
}

#[test]
fn math_results() {
    check("abs int32", |_| {
        let mut w = CacheIRWriter::new(CacheKind::UnaryArith);
        let input = w.guard_to_int32(w.input_val(0));
        w.math_abs_int32_result(input);
        w.return_from_ic();
        let inputs = [Value::int32(-4), Value::int32(4), Value::int32(0), Value::int32(i32::MIN), Value::double(-4.5)]
            .into_iter()
            .map(|v| ICInputs::new(CacheKind::UnaryArith, &[v]))
            .collect();
        Case::new(w, inputs)
    });
    check("abs", |rt| number_unary(rt, |w, n| w.math_abs_number_result(n)));
    check("sqrt", |rt| number_unary(rt, |w, n| w.math_sqrt_number_result(n)));
    check("floor to int32", |rt| number_unary(rt, |w, n| w.math_floor_to_int32_result(n)));
    for fun in [UnaryMathFunction::Sin, UnaryMathFunction::Log, UnaryMathFunction::Ceil, UnaryMathFunction::Trunc] {
        check("math function", move |rt| number_unary(rt, |w, n| w.math_function_number_result(n, fun)));
    }
}

#[test]
fn string_results() {
    check("concat", |rt| {
        let mut w = CacheIRWriter::new(CacheKind::BinaryArith);
        let lhs = w.guard_to_string(w.input_val(0));
        let rhs = w.guard_to_string(w.input_val(1));
        w.call_string_concat_result(lhs, rhs);
        w.return_from_ic();
        let (ab, cd, empty) = (rt.string_value("ab"), rt.string_value("cd"), rt.string_value(""));
        let pairs = [(ab, cd), (empty, ab), (ab, empty), (Value::int32(1), ab), (ab, Value::NULL)];
        Case::new(w, binary(CacheKind::BinaryArith, &pairs))
    });

    check("length", |rt| {
        let mut w = CacheIRWriter::new(CacheKind::GetProp);
        let str = w.guard_to_string(w.input_val(0));
        w.load_string_length_result(str);
        w.return_from_ic();
        let inputs = [rt.string_value("hello"), rt.string_value(""), rt.string_value("\u{e9}t\u{e9}"), Value::int32(5)]
            .into_iter()
            .map(|v| ICInputs::new(CacheKind::GetProp, &[v]))
            .collect();
        Case::new(w, inputs)
    });

    for char_code in [false, true] {
        check("char at", move |rt| {
            let mut w = CacheIRWriter::new(CacheKind::GetElem);
            let str = w.guard_to_string(w.input_val(0));
            let index = w.guard_to_int32_index(w.input_val(1));
            if char_code {
                w.load_string_char_code_result(str, index);
            } else {
                w.load_string_char_result(str, index);
            }
            w.return_from_ic();
            let hey = rt.string_value("hey");
            let empty = rt.string_value("");
            let pairs = [
                (hey, Value::int32(0)),
                (hey, Value::int32(2)),
                (hey, Value::double(1.0)),
                (hey, Value::int32(3)),
                (hey, Value::int32(-1)),
                (empty, Value::int32(0)),
                (Value::object(rt.new_object(None)), Value::int32(0)),
            ];
            Case::new(w, binary(CacheKind::GetElem, &pairs))
        });
    }

    for op in [JSOp::Lt, JSOp::Le, JSOp::Gt, JSOp::Ge, JSOp::StrictEq, JSOp::Ne] {
        check("compare strings", move |rt| {
            let mut w = CacheIRWriter::new(CacheKind::Compare);
            let lhs = w.guard_to_string(w.input_val(0));
            let rhs = w.guard_to_string(w.input_val(1));
            w.compare_string_result(op, lhs, rhs);
            w.return_from_ic();
            let (a, ab, b, empty) = (rt.string_value("a"), rt.string_value("ab"), rt.string_value("b"), rt.string_value(""));
            let pairs = [(a, b), (b, a), (a, ab), (ab, ab), (empty, a), (a, Value::int32(1))];
            Case::new(w, binary(CacheKind::Compare, &pairs))
        });
    }
}

/// `obj` with an own `x`, and a prototype holding `y`.
fn object_and_proto(rt: &mut Runtime) -> (ObjectId, ObjectId) {
    let proto = rt.new_object(None);
    let y = rt.atom_key("y");
    rt.define_property(proto, y, Value::int32(2));
    let obj = rt.new_object(Some(proto));
    let x = rt.atom_key("x");
    rt.define_property(obj, x, Value::int32(1));
    (obj, proto)
}

/// Realm index of the running code, or the thrown value when `throws`.
fn realm_reporter(rt: &mut Runtime, native: bool, throws: bool) -> ObjectId {
    let body = move |rt: &mut Runtime, args: &CallArgs| {
        let realm = Value::int32(rt.current_realm().index() as i32);
        if throws {
            return Err(Exception::new(realm));
        }
        if let Some(&value) = args.args.first() {
            let seen = rt.atom_key("seen");
            if let Some(receiver) = args.this.as_object() {
                rt.define_property(receiver, seen, value);
            }
        }
        Ok(realm)
    };
    if native {
        rt.new_native_function(0, body)
    } else {
        rt.new_scripted_function(0, body)
    }
}

/// An accessor `x` on a fresh object whose functions live in another realm
/// unless `same_realm`.
fn accessor_object(rt: &mut Runtime, native: bool, same_realm: bool, throws: bool) -> (ObjectId, ObjectId) {
    let home = rt.current_realm();
    if !same_realm {
        let other = rt.new_realm("other");
        rt.set_current_realm(other);
    }
    let accessor = realm_reporter(rt, native, throws);
    rt.set_current_realm(home);
    let obj = rt.new_object(None);
    let x = rt.atom_key("x");
    rt.define_accessor(obj, x, Some(accessor), Some(accessor));
    (obj, accessor)
}

#[test]
fn getters() {
    for native in [false, true] {
        for same_realm in [true, false] {
            for throws in [false, true] {
                check("getter", move |rt| {
                    let (obj, getter) = accessor_object(rt, native, same_realm, throws);
                    let (plain, _) = object_with(rt, "x", Value::int32(3));
                    let mut w = CacheIRWriter::new(CacheKind::GetProp);
                    let o = w.guard_to_object(w.input_val(0));
                    w.guard_shape(o, rt.shape_of(obj));
                    if native {
                        w.call_native_getter_result(w.input_val(0), getter, same_realm, 0);
                    } else {
                        w.call_scripted_getter_result(w.input_val(0), getter, same_realm, 0);
                    }
                    w.type_monitor_result();
                    let inputs = [Value::object(obj), Value::object(plain), Value::int32(0), Value::object(obj)]
                        .into_iter()
                        .map(|v| ICInputs::new(CacheKind::GetProp, &[v]))
                        .collect();
                    Case::new(w, inputs)
                });
            }
        }
    }
}

#[test]
fn setters() {
    for native in [false, true] {
        for same_realm in [true, false] {
            for throws in [false, true] {
                check("setter", move |rt| {
                    let (obj, setter) = accessor_object(rt, native, same_realm, throws);
                    let (plain, _) = object_with(rt, "x", Value::int32(3));
                    let mut w = CacheIRWriter::new(CacheKind::SetProp);
                    let o = w.guard_to_object(w.input_val(0));
                    w.guard_shape(o, rt.shape_of(obj));
                    if native {
                        w.call_native_setter(o, setter, w.input_val(1), same_realm, 0);
                    } else {
                        w.call_scripted_setter(o, setter, w.input_val(1), same_realm, 0);
                    }
                    w.return_from_ic();
                    let s = rt.string_value("set");
                    let inputs = binary(
                        CacheKind::SetProp,
                        &[
                            (Value::object(obj), Value::int32(9)),
                            (Value::object(plain), Value::int32(10)),
                            (Value::object(obj), s),
                        ],
                    );
                    Case::new(w, inputs).watch(&[obj, plain])
                });
            }
        }
    }
}

/// A forwarding proxy over [`object_and_proto`]'s object, whose `boom`
/// getter throws, and a proxy with no target.
fn proxies(rt: &mut Runtime) -> (ObjectId, ObjectId, ObjectId) {
    let (target, _) = object_and_proto(rt);
    let thrower = rt.new_native_function(0, |rt, _| Err(rt.type_error("boom")));
    let boom = rt.atom_key("boom");
    rt.define_accessor(target, boom, Some(thrower), None);
    let proxy = rt.new_proxy(Arc::new(ForwardingHandler), Some(target));
    let empty = rt.new_proxy(Arc::new(ForwardingHandler), None);
    (proxy, empty, target)
}

#[test]
fn proxy_access() {
    for name in ["x", "y", "boom", "missing"] {
        check("proxy get", move |rt| {
            let (proxy, empty, target) = proxies(rt);
            let key = rt.atom_key(name);
            let mut w = CacheIRWriter::new(CacheKind::GetProp);
            let o = w.guard_to_object(w.input_val(0));
            w.guard_is_proxy(o);
            w.proxy_get_result(o, key);
            w.type_monitor_result();
            let inputs = [proxy, empty, target]
                .into_iter()
                .map(|obj| ICInputs::new(CacheKind::GetProp, &[Value::object(obj)]))
                .collect();
            Case::new(w, inputs).watch(&[target])
        });
    }

    check("proxy get by value", |rt| {
        let (proxy, empty, target) = proxies(rt);
        let mut w = CacheIRWriter::new(CacheKind::GetElem);
        let o = w.guard_to_object(w.input_val(0));
        w.guard_is_proxy(o);
        w.proxy_get_by_value_result(o, w.input_val(1));
        w.type_monitor_result();
        let (x, boom) = (rt.string_value("x"), rt.string_value("boom"));
        let (p, e) = (Value::object(proxy), Value::object(empty));
        let pairs = [(p, x), (p, boom), (p, Value::int32(0)), (p, Value::TRUE), (e, x), (Value::object(target), x)];
        Case::new(w, binary(CacheKind::GetElem, &pairs))
    });

    for has_own in [false, true] {
        check("proxy has", move |rt| {
            let (proxy, empty, target) = proxies(rt);
            let mut w = CacheIRWriter::new(CacheKind::In);
            let o = w.guard_to_object(w.input_val(1));
            w.guard_is_proxy(o);
            w.proxy_has_prop_result(o, w.input_val(0), has_own);
            w.return_from_ic();
            let (x, y, z) = (rt.string_value("x"), rt.string_value("y"), rt.string_value("z"));
            let (p, e) = (Value::object(proxy), Value::object(empty));
            let pairs = [(x, p), (y, p), (z, p), (x, e), (x, Value::object(target))];
            Case::new(w, binary(CacheKind::In, &pairs))
        });
    }

    for strict in [false, true] {
        check("proxy set", move |rt| {
            let (proxy, empty, target) = proxies(rt);
            let x = rt.atom_key("x");
            let mut w = CacheIRWriter::new(CacheKind::SetProp);
            let o = w.guard_to_object(w.input_val(0));
            w.guard_is_proxy(o);
            w.proxy_set(o, x, w.input_val(1), strict);
            w.return_from_ic();
            let inputs = binary(
                CacheKind::SetProp,
                &[
                    (Value::object(proxy), Value::int32(5)),
                    (Value::object(empty), Value::int32(6)),
                    (Value::object(target), Value::int32(7)),
                ],
            );
            Case::new(w, inputs).watch(&[target])
        });
    }
}

#[test]
fn megamorphic_access() {
    for name in ["x", "y", "missing", "getter"] {
        check("megamorphic load", move |rt| {
            let (obj, proto) = object_and_proto(rt);
            let getter = rt.new_native_function(0, |_, _| Ok(Value::int32(8)));
            let getter_key = rt.atom_key("getter");
            rt.define_accessor(proto, getter_key, Some(getter), None);
            let (proxy, ..) = proxies(rt);
            let key = rt.atom_key(name);
            let mut w = CacheIRWriter::new(CacheKind::GetProp);
            let o = w.guard_to_object(w.input_val(0));
            w.megamorphic_load_slot_result(o, key);
            w.type_monitor_result();
            let inputs = [Value::object(obj), Value::object(proto), Value::object(proxy), Value::NULL]
                .into_iter()
                .map(|v| ICInputs::new(CacheKind::GetProp, &[v]))
                .collect();
            Case::new(w, inputs)
        });
    }

    check("megamorphic store", |rt| {
        let (obj, proto) = object_and_proto(rt);
        let fresh = rt.new_object(None);
        let x = rt.atom_key("x");
        let mut w = CacheIRWriter::new(CacheKind::SetProp);
        let o = w.guard_to_object(w.input_val(0));
        w.megamorphic_store_slot(o, x, w.input_val(1));
        w.return_from_ic();
        let s = rt.string_value("s");
        let inputs = binary(
            CacheKind::SetProp,
            &[
                (Value::object(obj), Value::int32(10)),
                (Value::object(fresh), s),
                (Value::object(proto), Value::int32(11)),
                (Value::object(fresh), Value::int32(12)),
                (Value::int32(1), Value::int32(13)),
            ],
        );
        Case::new(w, inputs).watch(&[obj, proto, fresh])
    });

    for has_own in [false, true] {
        check("megamorphic has", move |rt| {
            let (obj, _) = object_and_proto(rt);
            let array = rt.new_array(vec![Value::int32(1)]);
            let (proxy, ..) = proxies(rt);
            let mut w = CacheIRWriter::new(CacheKind::In);
            let o = w.guard_to_object(w.input_val(1));
            w.megamorphic_has_prop_result(o, w.input_val(0), has_own);
            w.return_from_ic();
            let (x, y, z) = (rt.string_value("x"), rt.string_value("y"), rt.string_value("z"));
            let (o, a) = (Value::object(obj), Value::object(array));
            let pairs = [
                (x, o),
                (y, o),
                (z, o),
                (Value::int32(0), a),
                (Value::int32(1), a),
                (Value::double(0.5), a),
                (x, Value::object(proxy)),
            ];
            Case::new(w, binary(CacheKind::In, &pairs))
        });
    }
}

fn element_store(
    rt: &mut Runtime,
    values: Vec<Value>,
    emit: impl Fn(&mut CacheIRWriter, ObjOperandId, Int32OperandId),
) -> (CacheIRWriter, ObjectId) {
    let array = rt.new_array(values);
    let mut w = CacheIRWriter::new(CacheKind::SetElem);
    let o = w.guard_to_object(w.input_val(0));
    w.guard_class(o, GuardClassKind::Array);
    let index = w.guard_to_int32_index(w.input_val(1));
    emit(&mut w, o, index);
    w.return_from_ic();
    (w, array)
}

fn set_elem(rt: &mut Runtime, array: ObjectId, stores: &[(Value, Value)]) -> Vec<ICInputs> {
    let plain = rt.new_object(None);
    stores
        .iter()
        .map(|&(index, value)| ICInputs::new(CacheKind::SetElem, &[Value::object(array), index, value]))
        .chain([ICInputs::new(CacheKind::SetElem, &[Value::object(plain), Value::int32(0), Value::TRUE])])
        .collect()
}

#[test]
fn element_stores() {
    let hole = Value::magic(JSWhyMagic::ElementsHole);
    check("dense store", move |rt| {
        let (w, array) = element_store(rt, vec![Value::int32(1), hole, Value::int32(3)], |w, o, index| {
            w.store_dense_element(o, index, w.input_val(2))
        });
        let s = rt.string_value("s");
        let stores = [
            (Value::int32(0), Value::int32(9)),
            (Value::int32(1), Value::int32(9)),
            (Value::double(2.0), s),
            (Value::int32(3), Value::int32(9)),
            (Value::int32(-1), Value::int32(9)),
        ];
        let inputs = set_elem(rt, array, &stores);
        Case::new(w, inputs).watch(&[array])
    });

    for handle_add in [false, true] {
        check("dense store hole", move |rt| {
            let (w, array) = element_store(rt, vec![hole, Value::int32(2)], |w, o, index| {
                w.store_dense_element_hole(o, index, w.input_val(2), handle_add)
            });
            let stores = [
                (Value::int32(0), Value::int32(7)),
                (Value::int32(2), Value::int32(8)),
                (Value::int32(5), Value::int32(9)),
                (Value::int32(3), Value::NULL),
                (Value::int32(1), Value::TRUE),
            ];
            let inputs = set_elem(rt, array, &stores);
            Case::new(w, inputs).watch(&[array])
        });
    }
}

/// `obj` and `twin` filled up to their last fixed slot, and the shape
/// and dynamic slot of the next property added to them.
fn full_objects(rt: &mut Runtime) -> (ObjectId, ObjectId, u32, ObjectId) {
    let obj = rt.new_object(None);
    let twin = rt.new_object(None);
    let sample = rt.new_object(None);
    let mut i = 0;
    loop {
        let key = rt.atom_key(&format!("p{i}"));
        rt.define_property(sample, key, Value::int32(i));
        if let Some(SlotLocation::Dynamic(offset)) = rt.slot_location(sample, key) {
            return (obj, twin, offset, sample);
        }
        rt.define_property(obj, key, Value::int32(i));
        rt.define_property(twin, key, Value::int32(i));
        i += 1;
    }
}

#[test]
fn dynamic_slot_allocation() {
    check("allocate and store", |rt| {
        let (obj, twin, offset, sample) = full_objects(rt);
        let (other, _) = object_with(rt, "q", Value::int32(0));
        let num_slots = rt.object(sample).dynamic_slots.len() as u32;
        let mut w = CacheIRWriter::new(CacheKind::SetProp);
        let o = w.guard_to_object(w.input_val(0));
        w.guard_shape(o, rt.shape_of(obj));
        w.allocate_and_store_dynamic_slot(o, offset, w.input_val(1), false, rt.group_of(obj), rt.shape_of(sample), num_slots);
        w.return_from_ic();
        let s = rt.string_value("dyn");
        let inputs = binary(
            CacheKind::SetProp,
            &[
                (Value::object(obj), Value::int32(40)),
                (Value::object(obj), Value::int32(41)),
                (Value::object(other), Value::int32(42)),
                (Value::object(twin), s),
            ],
        );
        Case::new(w, inputs).watch(&[obj, twin, other])
    });
}

#[test]
fn dom_calls() {
    check("dom method", |rt| {
        let class = rt.register_class("Node", ClassFlags::empty());
        let node = rt.new_object_with_class(class, None, 2);
        let plain = rt.new_object(None);
        let method = rt.new_dom_function(1, class, move |_, args| {
            let offset = if args.this.as_object() == Some(node) { 100 } else { -100 };
            Ok(Value::int32(args.args[0].as_int32().unwrap_or(0) + offset))
        });
        let mut w = CacheIRWriter::new(CacheKind::Call);
        let argc = w.input_argc();
        let callee_val = w.load_argument_fixed_slot(2);
        let callee = w.guard_to_object(callee_val);
        w.guard_specific_function(callee, method, 0);
        let this_val = w.load_argument_fixed_slot(1);
        let this_obj = w.guard_to_object(this_val);
        w.guard_any_class(this_obj, class);
        w.call_dom_function(callee, argc, this_obj, CallFlags::new(ArgFormat::Standard));
        w.type_monitor_result();
        let m = Value::object(method);
        let inputs = vec![
            ICInputs::call(m, Value::object(node), &[Value::int32(5)], None),
            ICInputs::call(m, Value::object(plain), &[Value::int32(5)], None),
            ICInputs::call(m, Value::int32(0), &[Value::int32(5)], None),
            ICInputs::call(m, Value::object(node), &[Value::NULL], None),
        ];
        Case::new(w, inputs).call_site(1, false)
    });
}

/// Guards for an array argument in frame slot `slot`.
fn guard_packed_array(w: &mut CacheIRWriter, slot: u8) {
    let array_val = w.load_argument_fixed_slot(slot);
    let array = w.guard_to_object(array_val);
    w.guard_class(array, GuardClassKind::Array);
    w.guard_array_is_packed(array);
}

#[test]
fn array_argument_calls() {
    check("spread", |rt| {
        let sum = rt.new_native_function(0, |_, args| {
            let total: i32 = args.args.iter().filter_map(|v| v.as_int32()).sum();
            Ok(Value::int32(total * 10 + args.argc as i32))
        });
        let mut w = CacheIRWriter::new(CacheKind::Call);
        let argc = w.input_argc();
        let callee_val = w.load_argument_fixed_slot(2);
        let callee = w.guard_to_object(callee_val);
        w.guard_specific_function(callee, sum, 0);
        guard_packed_array(&mut w, 0);
        w.call_native_function(callee, argc, CallFlags::new(ArgFormat::Spread));
        w.type_monitor_result();
        let full = rt.new_array(vec![Value::int32(1), Value::int32(2), Value::int32(3)]);
        let empty = rt.new_array(Vec::new());
        let holey = rt.new_array(vec![Value::int32(1), Value::magic(JSWhyMagic::ElementsHole)]);
        let s = Value::object(sum);
        let inputs = [Value::object(full), Value::object(empty), Value::object(holey), Value::int32(4)]
            .into_iter()
            .map(|array| ICInputs::call(s, Value::UNDEFINED, &[array], None))
            .collect();
        Case::new(w, inputs).call_site(1, false)
    });

    check("apply", |rt| {
        let apply = rt.new_native_function(2, |_, _| Ok(Value::UNDEFINED));
        let sub = rt.new_scripted_function(2, |_, args| {
            let this = args.this.as_int32().unwrap_or(0);
            let a = args.args[0].as_int32().unwrap_or(0);
            let b = args.args[1].as_int32().unwrap_or(0);
            Ok(Value::int32(this * 100 + a - b))
        });
        let other = rt.new_scripted_function(2, |_, _| Ok(Value::NULL));
        let mut w = CacheIRWriter::new(CacheKind::Call);
        let argc = w.input_argc();
        let fun_val = w.load_argument_fixed_slot(2);
        let fun = w.guard_to_object(fun_val);
        w.guard_specific_function(fun, sub, 0);
        guard_packed_array(&mut w, 0);
        w.call_scripted_function(fun, argc, CallFlags::new(ArgFormat::FunApplyArray));
        w.type_monitor_result();
        let pair = rt.new_array(vec![Value::int32(10), Value::int32(4)]);
        let one = rt.new_array(vec![Value::int32(10)]);
        let holey = rt.new_array(vec![Value::magic(JSWhyMagic::ElementsHole), Value::int32(4)]);
        let a = Value::object(apply);
        let inputs = [
            (sub, Value::object(pair)),
            (sub, Value::object(one)),
            (other, Value::object(pair)),
            (sub, Value::object(holey)),
            (sub, Value::NULL),
        ]
        .into_iter()
        .map(|(f, array)| ICInputs::call(a, Value::object(f), &[Value::int32(7), array], None))
        .collect();
        Case::new(w, inputs).call_site(2, false)
    });
}

fn inlined_program(callee: ObjectId, slot: u8, flags: CallFlags) -> CacheIRWriter {
    let mut w = CacheIRWriter::new(CacheKind::Call);
    let argc = w.input_argc();
    let callee_val = w.load_argument_fixed_slot(slot);
    let callee_obj = w.guard_to_object(callee_val);
    w.guard_specific_function(callee_obj, callee, 0);
    w.call_inlined_function(callee_obj, argc, 0x40, flags);
    w.type_monitor_result();
    w
}

#[test]
fn inlined_calls() {
    for inlined in [false, true] {
        check("inlined", move |rt| {
            let twice = rt.new_scripted_function(2, |_, args| {
                let a = args.args[0].as_int32().unwrap_or(-1);
                Ok(Value::int32(a * 2 + args.args[1].is_undefined() as i32))
            });
            let other = rt.new_scripted_function(0, |_, _| Ok(Value::NULL));
            let w = inlined_program(twice, 2, CallFlags::new(ArgFormat::Standard));
            let inputs = vec![
                ICInputs::call(Value::object(twice), Value::UNDEFINED, &[Value::int32(21)], None),
                ICInputs::call(Value::object(other), Value::UNDEFINED, &[Value::int32(21)], None),
                ICInputs::call(Value::object(twice), Value::UNDEFINED, &[Value::TRUE], None),
            ];
            let case = Case::new(w, inputs).call_site(1, false);
            if inlined { case.inlined() } else { case }
        });
    }

    check("inlined throw", |rt| {
        let thrower = rt.new_scripted_function(0, |_, _| Err(Exception::new(Value::int32(13))));
        let w = inlined_program(thrower, 1, CallFlags::new(ArgFormat::Standard));
        let inputs = vec![ICInputs::call(Value::object(thrower), Value::UNDEFINED, &[], None)];
        Case::new(w, inputs).call_site(0, false).inlined()
    });
}

#[test]
fn template_constructor() {
    check("template", |rt| {
        let log = rt.new_object(None);
        let shape_key = rt.atom_key("shape");
        let ctor = rt.new_scripted_function(1, move |rt, args| {
            if let Some(this) = args.this.as_object() {
                let shape = rt.shape_of(this).index() as i32;
                rt.define_property(log, shape_key, Value::int32(shape));
                let x = rt.atom_key("x");
                rt.define_property(this, x, args.args[0]);
            }
            Ok(Value::UNDEFINED)
        });
        let proto = rt.new_object(None);
        let prototype = PropertyKey::Atom(rt.names().prototype);
        rt.define_property(ctor, prototype, Value::object(proto));
        let template = rt.new_object(Some(proto));

        let mut w = CacheIRWriter::new(CacheKind::Call);
        let argc = w.input_argc();
        let callee_val = w.load_argument_fixed_slot(3);
        let callee = w.guard_to_object(callee_val);
        w.guard_specific_function(callee, ctor, 0);
        w.meta_scripted_template_object(ctor, template);
        w.call_scripted_function(callee, argc, CallFlags::constructing(ArgFormat::Standard));
        w.type_monitor_result();
        let constructing = Value::magic(JSWhyMagic::IsConstructing);
        let c = Value::object(ctor);
        let inputs = vec![
            ICInputs::call(c, constructing, &[Value::int32(5)], Some(c)),
            ICInputs::call(c, constructing, &[Value::TRUE], Some(c)),
        ];
        Case::new(w, inputs).call_site(1, true).watch(&[log, template])
    });
}
