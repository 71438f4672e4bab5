//! Root-source coverage
//!
//! Every slot the collector scans - operand stack, call frames, checkpoint
//! chain, globals, macros, the error slot, features, libraries and
//! registered compiled procedures - must keep its objects alive on its own.

use std::rc::Rc;

use shrimp::{Irep, State, Value};

/// A weak map rooted in the arena whose single entry reports whether `v` is
/// still alive after a collection.
fn tombstone(st: &mut State, v: Value) -> Value {
    let w = st.make_weak();
    st.weak_set(w, v, Value::Bool(true));
    w
}

#[test]
fn the_operand_stack_is_a_root() {
    let mut st = State::new();
    let base = st.enter();
    let p = st.cons(Value::Int(1), Value::Nil);
    let w = tombstone(&mut st, p);
    st.push_value(p);
    st.leave(base);
    let w = st.protect(w);
    st.collect();
    assert_eq!(st.weak_len(w), 1);
    assert_eq!(st.car(p), Value::Int(1));
    st.pop_value();
    st.collect();
    assert_eq!(st.weak_len(w), 0);
}

#[test]
fn call_frames_root_their_context_chain() {
    let mut st = State::new();
    let base = st.enter();
    let outer = st.make_context(1, Value::Nil);
    let inner = st.make_context(2, outer);
    let payload = st.cons(Value::Int(5), Value::Nil);
    st.context_set_reg(outer, 0, payload);
    st.push_frame(inner);
    st.leave(base);
    st.collect();
    // the frame keeps inner, inner keeps outer through `up`, outer keeps
    // its register contents
    assert_eq!(st.context_reg(inner, 0), Value::Undef);
    assert_eq!(st.car(st.context_reg(outer, 0)), Value::Int(5));
    st.pop_frame();
    st.collect();
}

#[test]
fn the_checkpoint_chain_roots_its_wind_procedures() {
    fn noop(_st: &mut State) -> Value {
        Value::Undef
    }
    let mut st = State::new();
    let base = st.enter();
    let before = st.make_func(noop, 1);
    let after = st.make_func(noop, 0);
    let guard = st.cons(Value::Int(9), Value::Nil);
    st.func_set_local(before, 0, guard);
    st.push_checkpoint(before, after);
    st.push_checkpoint(Value::Nil, before);
    st.leave(base);
    st.collect();
    // both links of the chain and the captured local survived
    assert_eq!(st.car(st.func_local(before, 0)), Value::Int(9));
    st.pop_checkpoint();
    st.pop_checkpoint();
    st.collect();
}

#[test]
fn global_and_macro_tables_are_roots() {
    let mut st = State::new();
    let base = st.enter();
    let key = st.intern("kernel-value");
    let val = st.make_string("payload");
    st.global_set(key, val);
    let mkey = st.intern("kernel-macro");
    let mval = st.cons(Value::Int(3), Value::Nil);
    st.macro_set(mkey, mval);
    st.leave(base);
    st.collect();
    let key = st.intern("kernel-value");
    let val = match st.global_ref(key) {
        Some(v) => v,
        None => panic!("global binding lost"),
    };
    assert_eq!(st.string_str(val), "payload");
    let mkey = st.intern("kernel-macro");
    let mval = match st.macro_ref(mkey) {
        Some(v) => v,
        None => panic!("macro binding lost"),
    };
    assert_eq!(st.car(mval), Value::Int(3));
}

#[test]
fn the_error_slot_is_a_root() {
    let mut st = State::new();
    let base = st.enter();
    let ty = st.intern("file-error");
    let irrs = st.cons(Value::Int(2), Value::Nil);
    let err = st.make_error(ty, "file not found", irrs);
    st.set_error(err);
    st.leave(base);
    st.collect();
    let err = st.error();
    assert!(err.is_obj());
    st.set_error(Value::Nil);
    st.collect();
}

#[test]
fn libraries_root_name_env_and_exports() {
    let mut st = State::new();
    let base = st.enter();
    let name_sym = st.intern("scheme-base");
    let name = st.cons(name_sym, Value::Nil);
    let env = st.make_env(Value::Nil);
    let exports = st.make_dict();
    let exported = st.cons(Value::Int(11), Value::Nil);
    st.dict_set(exports, name_sym, exported);
    st.add_library(name, env, exports);
    st.leave(base);
    st.collect();
    let sym = st.intern("scheme-base");
    let hit = match st.dict_ref(exports, sym) {
        Some(v) => v,
        None => panic!("export lost"),
    };
    assert_eq!(st.car(hit), Value::Int(11));
}

#[test]
fn registered_irep_pools_are_roots() {
    let mut st = State::new();
    let base = st.enter();
    let lit = st.make_string("literal");
    let w = tombstone(&mut st, lit);
    let irep = Rc::new(Irep {
        argc: 1,
        varg: false,
        code: vec![0x01, 0x02],
        pool: vec![lit, Value::Int(4)],
    });
    st.register_irep(irep.clone());
    let cxt = st.make_context(1, Value::Nil);
    let closure = st.make_closure(irep.clone(), cxt);
    st.leave(base);
    let w = st.protect(w);
    let closure = st.protect(closure);
    st.collect();
    // the literal survives through the registered pool, not the closure
    assert_eq!(st.weak_len(w), 1);
    assert_eq!(st.string_str(lit), "literal");
    // the closure keeps its captured context chain
    assert_eq!(st.context_reg(cxt, 0), Value::Undef);
    let _ = closure;
    st.unregister_irep(&irep);
    st.collect();
    // with the pool unregistered the literal has no root left
    assert_eq!(st.weak_len(w), 0);
}

#[test]
fn environments_trace_entries_and_parents() {
    let mut st = State::new();
    let base = st.enter();
    let parent = st.make_env(Value::Nil);
    let child = st.make_env(parent);
    let name = st.make_string("x");
    let id = st.make_ident(name, Value::Nil);
    let usym = st.intern("x.0");
    let uid = st.make_ident(usym, child);
    st.env_define(parent, id, uid);
    st.leave(base);
    let child = st.protect(child);
    st.collect();
    // child keeps parent; parent's table keeps both identifiers and,
    // through them, the name string and the renamed symbol
    assert_eq!(st.env_lookup(child, id), Some(uid));
    assert_eq!(st.symbol_name(usym), "x.0");
    assert_eq!(st.string_str(name), "x");
    assert_eq!(st.env_lookup(child, uid), None);
}

#[test]
fn records_trace_type_and_datum_chains() {
    let mut st = State::new();
    let base = st.enter();
    let ty = st.intern("box");
    // a deep datum chain exercises the iterative trace
    let mut datum = Value::Int(0);
    for _ in 0..10_000 {
        datum = st.make_record(ty, datum);
    }
    st.leave(base);
    let mut cursor = st.protect(datum);
    st.collect();
    let mut depth = 0;
    while cursor.is_obj() {
        depth += 1;
        cursor = st.record_datum(cursor);
    }
    assert_eq!(depth, 10_000);
    assert_eq!(cursor, Value::Int(0));
}

#[test]
fn ports_and_blobs_are_leaf_objects() {
    let mut st = State::new();
    let ai = st.enter();
    let port = st.make_port(core::ptr::null_mut());
    let blob = st.make_blob(&[9, 9, 9]);
    st.collect();
    assert!(port.is_obj());
    assert_eq!(st.blob_bytes(blob), &[9, 9, 9]);
    st.leave(ai);
}
