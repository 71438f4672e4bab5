//! End-to-end collection tests
//!
//! Long chains, cycles, heap growth and the stress/disable toggles, all
//! observed through the public state API.

use shrimp::{State, Value};

/// Build a rooted list of `n` pairs and return the (protected) head.
fn make_list(st: &mut State, n: usize) -> Value {
    let ai = st.enter();
    let mut head = Value::Nil;
    for i in 0..n {
        // each cons protects the new head, which keeps the whole tail alive
        head = st.cons(Value::Int(i as i32), head);
    }
    st.leave(ai);
    st.protect(head)
}

fn list_len(st: &State, mut v: Value) -> usize {
    let mut n = 0;
    while v.is_obj() {
        n += 1;
        v = st.cdr(v);
    }
    n
}

#[test]
fn linear_chain_survives_while_rooted_and_dies_after() {
    let mut st = State::new();
    let ai = st.enter();
    let head = make_list(&mut st, 10_000);
    // tracing a 10k-element cdr chain must not blow the host stack
    st.collect();
    st.collect();
    assert_eq!(list_len(&st, head), 10_000);
    let live_before = st.memory_stats().live_units;
    assert!(live_before > 10_000);
    st.leave(ai);
    st.collect();
    let live_after = st.memory_stats().live_units;
    // only the global/macro tables remain
    assert!(live_after < 50, "live_after = {}", live_after);
}

#[test]
fn self_referential_pair_is_reclaimed() {
    let mut st = State::new();
    let ai = st.enter();
    let w = st.make_weak();
    let a = st.cons(Value::Nil, Value::Nil);
    st.set_cdr(a, a);
    st.weak_set(w, a, Value::Bool(true));
    st.collect();
    // while rooted, the cycle survives and stays readable
    assert_eq!(st.weak_len(w), 1);
    assert_eq!(st.cdr(a), a);
    // drop the root; refcounting could never reclaim this, tracing must
    st.leave(ai);
    let w = st.protect(w);
    st.collect();
    assert_eq!(st.weak_len(w), 0);
}

#[test]
fn heap_grows_under_pressure_and_settles_when_clear() {
    let mut st = State::new();
    let base_pages = st.memory_stats().pages;
    let ai = st.enter();
    let head = make_list(&mut st, 5_000);
    assert_eq!(list_len(&st, head), 5_000);
    // filling several pages forces collect-then-morecore, never an error
    let grown = st.memory_stats().pages;
    assert!(grown > base_pages);
    st.leave(ai);
    st.collect();
    let settled = st.memory_stats().pages;
    st.collect();
    st.collect();
    // little is live, so the growth policy asks for nothing more
    assert_eq!(st.memory_stats().pages, settled);
    let stats = st.memory_stats();
    assert!(stats.live_units * 8 < stats.total_units * 7);
}

#[test]
fn stress_collection_preserves_reachable_structure() {
    let mut st = State::new();
    st.set_gc_stress(true);
    let ai = st.enter();
    let head = make_list(&mut st, 200);
    let v = st.make_vector(4, Value::Nil);
    st.vector_set(v, 0, head);
    let s = st.make_string("stress");
    st.vector_set(v, 1, s);
    let d = st.make_dict();
    st.dict_set(d, Value::Int(1), v);
    st.collect();
    assert_eq!(list_len(&st, head), 200);
    assert_eq!(st.string_str(s), "stress");
    assert_eq!(st.dict_ref(d, Value::Int(1)), Some(v));
    st.leave(ai);
}

#[test]
fn disabled_collection_still_grows_the_heap() {
    let mut st = State::new();
    st.set_gc_enabled(false);
    let ai = st.enter();
    let head = make_list(&mut st, 3_000);
    assert_eq!(list_len(&st, head), 3_000);
    st.collect(); // no-op while disabled
    assert_eq!(list_len(&st, head), 3_000);
    st.leave(ai);
    st.set_gc_enabled(true);
    st.collect();
}

#[test]
fn consecutive_collections_reclaim_nothing_new() {
    let mut st = State::new();
    let ai = st.enter();
    let w = st.make_weak();
    for i in 0..64 {
        let k = st.cons(Value::Int(i), Value::Nil);
        st.weak_set(w, k, Value::Int(i));
    }
    st.leave(ai);
    let w = st.protect(w);
    st.collect();
    let live = st.memory_stats().live_units;
    assert_eq!(st.weak_len(w), 0);
    st.collect();
    assert_eq!(st.memory_stats().live_units, live);
    assert_eq!(st.weak_len(w), 0);
}

#[test]
fn vectors_trace_their_elements() {
    let mut st = State::new();
    let ai = st.enter();
    let inner = st.make_vector(1, Value::Int(5));
    let outer = st.make_vector(3, inner);
    st.leave(ai);
    let outer = st.protect(outer);
    st.collect();
    let inner = st.vector_ref(outer, 2);
    assert_eq!(st.vector_ref(inner, 0), Value::Int(5));
}
