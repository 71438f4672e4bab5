//! Mark and sweep
//!
//! A collection stops the world, walks every root slot on the state and
//! traces objects by variant, resolves weak maps with an ephemeron fixed
//! point, then sweeps: dead weak entries are purged first, dead interned
//! symbols second, dead cells are finalized and reclaimed third, and the
//! growth policy runs last. That ordering is the only one the collector
//! guarantees.
//!
//! Tracing follows linear chains (pair cdr, env and cxt parents, record
//! datum, error stack, checkpoint out-chain, symbol name) iteratively, so a
//! ten-thousand-element list cannot overflow the host stack.

use core::ptr;

use crate::memory::heap::Heap;
use crate::object::data::ObjData;
use crate::object::proc::{ObjCheckpoint, ObjClosure, ObjContext, ObjError, ObjFunc};
use crate::object::symbol::{ObjIdent, ObjSymbol};
use crate::object::table::{ObjDict, ObjEnv, ObjWeak};
use crate::object::{self, ObjHeader, ObjPair, ObjRecord, ObjVector, Tag};
use crate::state::State;
use crate::value::Value;

/// Tracing handle passed to `DATA` mark hooks.
pub struct Tracer<'a> {
    pub(crate) heap: &'a mut Heap,
}

impl Tracer<'_> {
    /// Mark `v` and everything reachable from it.
    pub fn mark(&mut self, v: Value) {
        // SAFETY: a tracer only exists during a collection, when every
        // reachable object is live.
        unsafe { mark_value(self.heap, v) }
    }
}

/// Mark the object behind `v`, if any. Immediates are no-ops.
pub(crate) unsafe fn mark_value(heap: &mut Heap, v: Value) {
    if let Value::Obj(obj) = v {
        mark_object(heap, obj.as_ptr());
    }
}

/// Mark `obj` and trace its outgoing edges.
pub(crate) unsafe fn mark_object(heap: &mut Heap, mut obj: *mut ObjHeader) {
    loop {
        if heap.is_marked(obj) {
            return;
        }
        heap.set_mark(obj);
        match (*obj).tag() {
            Tag::Pair => {
                let p = object::cast::<ObjPair>(obj);
                mark_value(heap, (*p).car);
                match (*p).cdr {
                    Value::Obj(next) => obj = next.as_ptr(),
                    _ => return,
                }
            }
            Tag::Vector => {
                let v = object::cast::<ObjVector>(obj);
                for i in 0..(&(*v).data).len() {
                    mark_value(heap, (*v).data[i]);
                }
                return;
            }
            Tag::Blob | Tag::String | Tag::Port => return,
            Tag::Dict => {
                let d = object::cast::<ObjDict>(obj);
                for (k, v) in (*d).table.iter() {
                    mark_value(heap, k.0);
                    mark_value(heap, *v);
                }
                return;
            }
            Tag::Weak => {
                // ephemeron: entries are resolved by the fixed-point loop
                // after the root pass, not traced here
                let w = object::cast::<ObjWeak>(obj);
                (*w).prev = heap.weaks;
                heap.weaks = w;
                return;
            }
            Tag::Env => {
                let e = object::cast::<ObjEnv>(obj);
                for (k, v) in (*e).table.iter() {
                    mark_object(heap, k.0.as_ptr());
                    mark_object(heap, v.0.as_ptr());
                }
                if (*e).up.is_null() {
                    return;
                }
                obj = (*e).up.cast::<ObjHeader>();
            }
            Tag::Ident => {
                let id = object::cast::<ObjIdent>(obj);
                mark_object(heap, (*id).inner.as_ptr());
                if (*id).env.is_null() {
                    return;
                }
                obj = (*id).env.cast::<ObjHeader>();
            }
            Tag::Symbol => {
                let s = object::cast::<ObjSymbol>(obj);
                obj = (*s).name.cast::<ObjHeader>();
            }
            Tag::Record => {
                let r = object::cast::<ObjRecord>(obj);
                mark_value(heap, (*r).ty);
                match (*r).datum {
                    Value::Obj(next) => obj = next.as_ptr(),
                    _ => return,
                }
            }
            Tag::Data => {
                let d = object::cast::<ObjData>(obj);
                if let Some(markf) = (*d).ty.mark {
                    let mut tracer = Tracer {
                        heap: &mut *heap,
                    };
                    markf((*d).data, &mut tracer);
                }
                return;
            }
            Tag::Context => {
                let c = object::cast::<ObjContext>(obj);
                for i in 0..(&(*c).regs).len() {
                    mark_value(heap, (*c).regs[i]);
                }
                if (*c).up.is_null() {
                    return;
                }
                obj = (*c).up.cast::<ObjHeader>();
            }
            Tag::Func => {
                let f = object::cast::<ObjFunc>(obj);
                for i in 0..(&(*f).locals).len() {
                    mark_value(heap, (*f).locals[i]);
                }
                return;
            }
            Tag::Closure => {
                // the literal pool is rooted through the registered irep
                // list, not through closures
                let c = object::cast::<ObjClosure>(obj);
                if (*c).cxt.is_null() {
                    return;
                }
                obj = (*c).cxt.cast::<ObjHeader>();
            }
            Tag::Error => {
                let e = object::cast::<ObjError>(obj);
                mark_value(heap, (*e).ty);
                mark_value(heap, (*e).msg);
                mark_value(heap, (*e).irrs);
                match (*e).stack {
                    Value::Obj(next) => obj = next.as_ptr(),
                    _ => return,
                }
            }
            Tag::Checkpoint => {
                let cp = object::cast::<ObjCheckpoint>(obj);
                if !(*cp).prev.is_null() {
                    mark_object(heap, (*cp).prev.cast::<ObjHeader>());
                }
                mark_value(heap, (*cp).wind_in);
                match (*cp).wind_out {
                    Value::Obj(next) => obj = next.as_ptr(),
                    _ => return,
                }
            }
        }
    }
}

/// Run a full collection: back-end preparation, mark, sweep.
pub(crate) fn collect(st: &mut State) {
    if !st.gc_enabled {
        return;
    }
    st.heap.gc_init();
    // SAFETY: single-threaded, stop-the-world; every root slot points at
    // live objects.
    unsafe {
        mark_phase(st);
        sweep_phase(st);
    }
}

unsafe fn mark_phase(st: &mut State) {
    // dynamic-wind checkpoint chain
    if !st.checkpoint.is_null() {
        mark_object(&mut st.heap, st.checkpoint.cast::<ObjHeader>());
    }
    // operand stack
    for &v in &st.stack {
        mark_value(&mut st.heap, v);
    }
    // call frames: each frame's register context
    for frame in &st.frames {
        if !frame.cxt.is_null() {
            mark_object(&mut st.heap, frame.cxt.cast::<ObjHeader>());
        }
    }
    // root registry (arena)
    for &obj in &st.arena {
        mark_object(&mut st.heap, obj.as_ptr());
    }
    // literal pools of registered compiled procedures
    for irep in &st.ireps {
        for &v in &irep.pool {
            mark_value(&mut st.heap, v);
        }
    }
    // global state
    mark_value(&mut st.heap, st.globals);
    mark_value(&mut st.heap, st.macros);
    mark_value(&mut st.heap, st.err);
    mark_value(&mut st.heap, st.features);
    for lib in &st.libs {
        mark_value(&mut st.heap, lib.name);
        mark_value(&mut st.heap, lib.env);
        mark_value(&mut st.heap, lib.exports);
    }

    // Ephemeron fixed point: a weak entry's value is live only once its key
    // is. A single pass is not enough when one entry's value is another
    // entry's key, so repeat until a full pass marks nothing new. Marking a
    // value may push further weak maps onto the chain; the next pass walks
    // them too.
    loop {
        let mut fresh = 0usize;
        let mut weak = st.heap.weaks;
        while !weak.is_null() {
            for (k, v) in (*weak).table.iter() {
                if !st.heap.is_marked(k.0.as_ptr()) {
                    continue;
                }
                if let Value::Obj(o) = *v {
                    if !st.heap.is_marked(o.as_ptr()) {
                        mark_object(&mut st.heap, o.as_ptr());
                        fresh += 1;
                    }
                }
            }
            weak = (*weak).prev;
        }
        if fresh == 0 {
            break;
        }
    }
}

unsafe fn sweep_phase(st: &mut State) {
    // 1. purge dead entries from every weak map reached during marking,
    //    draining the transient chain as it goes
    let mut weak = st.heap.weaks;
    while !weak.is_null() {
        let next = (*weak).prev;
        let heap = &st.heap;
        (*weak).table.retain(|k, _| {
            // SAFETY: keys point at objects that are still allocated; the
            // page sweep runs only after this purge.
            unsafe { heap.is_marked(k.0.as_ptr()) }
        });
        (*weak).prev = ptr::null_mut();
        weak = next;
    }
    st.heap.weaks = ptr::null_mut();

    // 2. purge interned symbols that did not survive marking, so the oblist
    //    never holds a dangling entry
    let heap = &st.heap;
    st.oblist.retain(|_, sym| {
        // SAFETY: as above; symbol cells are reclaimed only below.
        unsafe { heap.is_marked(sym.as_ptr()) }
    });

    // 3. finalize and reclaim dead cells, resetting survivors to white
    let stats = st.heap.sweep(&st.alloc);
    st.last_sweep = stats;

    // 4. adaptive growth: a sweep that recovered little means the mutator
    //    is about to come back for more
    if stats.inuse >= growth_floor(stats.total, st.growth_threshold) {
        st.heap.morecore(&st.alloc);
    }
}

fn growth_floor(total: usize, threshold: f64) -> usize {
    (total as f64 * threshold) as usize
}
