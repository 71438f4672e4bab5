//! The interpreter state
//!
//! A [`State`] owns the object heap and every mutable root the collector
//! scans: the root registry (arena), the evaluator's operand stack and call
//! frames, the dynamic-wind checkpoint chain, the global and macro tables,
//! the current error, the feature list, the library table, the registered
//! compiled procedures and the interned-symbol table. All allocation and
//! collection goes through it.
//!
//! # Rooting discipline
//!
//! Any call that allocates is a potential collection point. A value that is
//! reachable only through host locals must be protected in the arena (or
//! stored in another root slot) before the next allocation; [`State::enter`]
//! and [`State::leave`] bracket scopes so whole groups of protections pop at
//! once.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::memory::alloc::{AllocFn, Allocator};
use crate::memory::gc;
use crate::memory::heap::Heap;
use crate::memory::SweepStats;
use crate::object::data::{DataType, ObjData};
use crate::object::proc::{
    IrepRef, NativeFn, ObjCheckpoint, ObjClosure, ObjContext, ObjError, ObjFunc,
};
use crate::object::symbol::{ObjIdent, ObjSymbol};
use crate::object::table::{ObjDict, ObjEnv, ObjWeak};
use crate::object::{
    HeapObject, ObjBlob, ObjHeader, ObjPair, ObjPort, ObjRecord, ObjString, ObjVector, Rope, Tag,
};
use crate::value::{EqKey, ObjKey, Value};

/// Default heap-growth trigger: grow when a sweep leaves at least this
/// fraction of all units in use.
pub const DEFAULT_GROWTH_THRESHOLD: f64 = 7.0 / 8.0;

/// One evaluator call frame, as seen by the collector.
#[derive(Debug, Clone, Copy)]
pub struct CallInfo {
    pub(crate) cxt: *mut ObjContext,
}

/// One entry in the library table. All three fields are roots.
pub struct Library {
    /// Library name (usually a list of symbols).
    pub name: Value,
    /// The library's top-level environment.
    pub env: Value,
    /// The library's export table.
    pub exports: Value,
}

/// Memory statistics snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    /// Heap pages currently allocated.
    pub pages: usize,
    /// Total allocation units across all pages.
    pub total_units: usize,
    /// Units occupied by live objects at the end of the last sweep.
    pub live_units: usize,
}

/// An interpreter instance.
///
/// # Example
///
/// ```rust
/// use shrimp::{State, Value};
///
/// let mut st = State::new();
/// let ai = st.enter();
/// let v = st.make_vector(3, Value::Int(7));
/// st.collect();
/// assert_eq!(st.vector_ref(v, 2), Value::Int(7));
/// st.leave(ai);
/// ```
pub struct State {
    pub(crate) alloc: Allocator,
    pub(crate) heap: Heap,
    pub(crate) arena: Vec<NonNull<ObjHeader>>,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallInfo>,
    pub(crate) checkpoint: *mut ObjCheckpoint,
    pub(crate) globals: Value,
    pub(crate) macros: Value,
    pub(crate) err: Value,
    pub(crate) features: Value,
    pub(crate) libs: Vec<Library>,
    pub(crate) ireps: Vec<IrepRef>,
    pub(crate) oblist: BTreeMap<Rope, NonNull<ObjHeader>>,
    pub(crate) gc_enabled: bool,
    pub(crate) gc_stress: bool,
    pub(crate) growth_threshold: f64,
    pub(crate) last_sweep: SweepStats,
}

impl State {
    /// Create a state backed by the global Rust allocator.
    pub fn new() -> Self {
        Self::open(Allocator::system())
    }

    /// Create a state whose raw memory flows through `allocf`.
    ///
    /// # Safety
    ///
    /// `allocf` must implement the [`AllocFn`] contract.
    pub unsafe fn with_allocf(allocf: AllocFn, userdata: *mut u8) -> Self {
        Self::open(Allocator::new(allocf, userdata))
    }

    fn open(alloc: Allocator) -> Self {
        let heap = Heap::open(&alloc);
        let mut st = State {
            alloc,
            heap,
            arena: Vec::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            checkpoint: ptr::null_mut(),
            globals: Value::Nil,
            macros: Value::Nil,
            err: Value::Nil,
            features: Value::Nil,
            libs: Vec::new(),
            ireps: Vec::new(),
            oblist: BTreeMap::new(),
            gc_enabled: true,
            gc_stress: cfg!(feature = "gc-stress"),
            growth_threshold: DEFAULT_GROWTH_THRESHOLD,
            last_sweep: SweepStats::default(),
        };
        let ai = st.enter();
        st.globals = st.make_dict();
        st.macros = st.make_dict();
        st.leave(ai);
        st
    }

    // ---- allocation ----------------------------------------------------

    /// Allocate a cell for `value` without protecting the result; the
    /// caller must store the object into a root slot before the next
    /// allocation.
    pub(crate) fn alloc_obj_unsafe<T: HeapObject>(&mut self, value: T) -> NonNull<ObjHeader> {
        if self.gc_stress {
            gc::collect(self);
        }
        let size = size_of::<T>();
        let mut p = self.heap.alloc(size);
        if p.is_null() {
            gc::collect(self);
            p = self.heap.alloc(size);
        }
        if p.is_null() {
            self.heap.morecore(&self.alloc);
            p = self.heap.alloc(size);
        }
        let Some(obj) = NonNull::new(p) else {
            panic!("(GC) memory exhausted");
        };
        // SAFETY: the cell is fresh and at least `size` bytes; writing the
        // fully built value initializes header and payload in place.
        unsafe { obj.as_ptr().cast::<T>().write(value) };
        obj
    }

    /// Allocate a cell for `value` and protect it in the arena.
    pub(crate) fn alloc_obj<T: HeapObject>(&mut self, value: T) -> NonNull<ObjHeader> {
        let obj = self.alloc_obj_unsafe(value);
        self.arena.push(obj);
        obj
    }

    /// Checked downcast of a value to a concrete object type.
    fn as_object<T: HeapObject>(&self, v: Value) -> *mut T {
        match v {
            Value::Obj(obj) => {
                // SAFETY: heap values point at live objects with a valid
                // header.
                let tt = unsafe { (*obj.as_ptr()).tag() };
                assert!(
                    tt == T::TAG,
                    "type mismatch: expected {:?}, got {:?}",
                    T::TAG,
                    tt
                );
                debug_assert!(self.heap.contains(obj.as_ptr()));
                obj.as_ptr().cast::<T>()
            }
            _ => panic!("type mismatch: expected {:?}", T::TAG),
        }
    }

    // ---- root registry -------------------------------------------------

    /// Protect `v` in the root registry. Immediates pass through untouched.
    pub fn protect(&mut self, v: Value) -> Value {
        if let Value::Obj(obj) = v {
            self.arena.push(obj);
        }
        v
    }

    /// Arena checkpoint for a later [`leave`](State::leave).
    pub fn enter(&self) -> usize {
        self.arena.len()
    }

    /// Drop every protection taken since the matching [`enter`](State::enter).
    pub fn leave(&mut self, mark: usize) {
        debug_assert!(mark <= self.arena.len());
        self.arena.truncate(mark);
    }

    // ---- collection ----------------------------------------------------

    /// Run a full mark/sweep collection. No-op while collection is
    /// disabled.
    pub fn collect(&mut self) {
        gc::collect(self);
    }

    /// Enable or disable collection. While disabled, allocation still grows
    /// the heap on demand.
    pub fn set_gc_enabled(&mut self, on: bool) {
        self.gc_enabled = on;
    }

    /// When on, every allocation starts with a full collection. Seeded by
    /// the `gc-stress` feature.
    pub fn set_gc_stress(&mut self, on: bool) {
        self.gc_stress = on;
    }

    /// Set the heap growth trigger: the fraction of units still live after
    /// a sweep above which the heap requests another page. Clamped to
    /// `(0, 1]`.
    pub fn set_growth_threshold(&mut self, threshold: f64) {
        self.growth_threshold = threshold.clamp(f64::MIN_POSITIVE, 1.0);
    }

    /// Memory statistics as of the last sweep.
    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            pages: self.heap.pages.page_count(),
            total_units: self.heap.pages.total_units(),
            live_units: self.last_sweep.inuse,
        }
    }

    // ---- constructors --------------------------------------------------
    //
    // Every constructor protects its result. Arguments must already be
    // rooted by the caller: building the new object is an allocation and
    // therefore a potential collection point.

    /// Allocate a pair.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Value {
        Value::Obj(self.alloc_obj(ObjPair {
            header: ObjHeader::new(Tag::Pair),
            car,
            cdr,
        }))
    }

    /// Allocate a vector of `len` copies of `fill`.
    pub fn make_vector(&mut self, len: usize, fill: Value) -> Value {
        let data = vec![fill; len].into_boxed_slice();
        Value::Obj(self.alloc_obj(ObjVector {
            header: ObjHeader::new(Tag::Vector),
            data,
        }))
    }

    /// Allocate a blob holding a copy of `bytes`.
    pub fn make_blob(&mut self, bytes: &[u8]) -> Value {
        let data: Box<[u8]> = Box::from(bytes);
        Value::Obj(self.alloc_obj(ObjBlob {
            header: ObjHeader::new(Tag::Blob),
            data,
        }))
    }

    /// Allocate a string.
    pub fn make_string(&mut self, s: &str) -> Value {
        self.make_string_rope(Rc::from(s))
    }

    pub(crate) fn make_string_rope(&mut self, rope: Rope) -> Value {
        Value::Obj(self.alloc_obj(ObjString {
            header: ObjHeader::new(Tag::String),
            rope,
        }))
    }

    /// Allocate an empty dictionary.
    pub fn make_dict(&mut self) -> Value {
        Value::Obj(self.alloc_obj(ObjDict {
            header: ObjHeader::new(Tag::Dict),
            table: BTreeMap::new(),
        }))
    }

    /// Allocate an empty weak (ephemeron) map.
    pub fn make_weak(&mut self) -> Value {
        Value::Obj(self.alloc_obj(ObjWeak {
            header: ObjHeader::new(Tag::Weak),
            table: BTreeMap::new(),
            prev: ptr::null_mut(),
        }))
    }

    /// Allocate an environment chained to `up` (`Nil` for a top level).
    pub fn make_env(&mut self, up: Value) -> Value {
        let up = match up {
            Value::Nil => ptr::null_mut(),
            v => self.as_object::<ObjEnv>(v),
        };
        Value::Obj(self.alloc_obj(ObjEnv {
            header: ObjHeader::new(Tag::Env),
            table: BTreeMap::new(),
            up,
        }))
    }

    /// Allocate an identifier wrapping `inner` (a symbol, identifier or
    /// string) introduced in `env` (`Nil` for bare names).
    pub fn make_ident(&mut self, inner: Value, env: Value) -> Value {
        let Some(inner) = inner.as_obj() else {
            panic!("identifier payload must be a symbol, identifier or string")
        };
        // SAFETY: heap values point at live objects with a valid header.
        let tt = unsafe { (*inner.as_ptr()).tag() };
        assert!(
            matches!(tt, Tag::Symbol | Tag::Ident | Tag::String),
            "identifier payload must be a symbol, identifier or string"
        );
        let env = match env {
            Value::Nil => ptr::null_mut(),
            v => self.as_object::<ObjEnv>(v),
        };
        Value::Obj(self.alloc_obj(ObjIdent {
            header: ObjHeader::new(Tag::Ident),
            inner,
            env,
        }))
    }

    /// Intern `name`: return the existing symbol or create and register a
    /// fresh one. Interning keeps no root; an unreferenced symbol is purged
    /// from the table by the next collection.
    pub fn intern(&mut self, name: &str) -> Value {
        if let Some(&sym) = self.oblist.get(name) {
            return self.protect(Value::Obj(sym));
        }
        let ai = self.enter();
        let rope: Rope = Rc::from(name);
        let name_obj = self.make_string_rope(rope.clone());
        let name_ptr = self.as_object::<ObjString>(name_obj);
        let sym = self.alloc_obj(ObjSymbol {
            header: ObjHeader::new(Tag::Symbol),
            name: name_ptr,
        });
        self.oblist.insert(rope, sym);
        self.leave(ai);
        self.protect(Value::Obj(sym))
    }

    /// Allocate a record instance.
    pub fn make_record(&mut self, ty: Value, datum: Value) -> Value {
        Value::Obj(self.alloc_obj(ObjRecord {
            header: ObjHeader::new(Tag::Record),
            ty,
            datum,
        }))
    }

    /// Allocate a `DATA` object wrapping `data` with the given vtable.
    pub fn make_data(&mut self, ty: &'static DataType, data: *mut u8) -> Value {
        Value::Obj(self.alloc_obj(ObjData {
            header: ObjHeader::new(Tag::Data),
            ty,
            data,
        }))
    }

    /// Allocate `size` bytes of zeroed scratch memory whose lifetime tracks
    /// a protected `DATA` object: the buffer is freed when that object is
    /// collected. Returns null for `size == 0`.
    pub fn alloca(&mut self, size: usize) -> *mut u8 {
        static BUFFER: DataType = DataType {
            name: "buffer",
            size: 0,
            mark: None,
            dtor: Some(buffer_dtor),
        };
        let buf = self.alloc.calloc(size, 1);
        self.make_data(&BUFFER, buf);
        buf
    }

    /// Allocate a register frame with `regc` registers chained to `up`
    /// (`Nil` or a context).
    pub fn make_context(&mut self, regc: usize, up: Value) -> Value {
        let up = match up {
            Value::Nil => ptr::null_mut(),
            v => self.as_object::<ObjContext>(v),
        };
        let regs = vec![Value::Undef; regc].into_boxed_slice();
        Value::Obj(self.alloc_obj(ObjContext {
            header: ObjHeader::new(Tag::Context),
            up,
            regs,
        }))
    }

    /// Allocate a native closure with `localc` captured locals.
    pub fn make_func(&mut self, func: NativeFn, localc: usize) -> Value {
        let locals = vec![Value::Undef; localc].into_boxed_slice();
        Value::Obj(self.alloc_obj(ObjFunc {
            header: ObjHeader::new(Tag::Func),
            func,
            locals,
        }))
    }

    /// Allocate a closure over a compiled procedure body, capturing `cxt`
    /// (`Nil` or a context).
    pub fn make_closure(&mut self, irep: IrepRef, cxt: Value) -> Value {
        let cxt = match cxt {
            Value::Nil => ptr::null_mut(),
            v => self.as_object::<ObjContext>(v),
        };
        Value::Obj(self.alloc_obj(ObjClosure {
            header: ObjHeader::new(Tag::Closure),
            irep,
            cxt,
        }))
    }

    /// Allocate a port wrapping embedder-owned state.
    pub fn make_port(&mut self, handle: *mut u8) -> Value {
        Value::Obj(self.alloc_obj(ObjPort {
            header: ObjHeader::new(Tag::Port),
            handle,
        }))
    }

    /// Allocate a condition object with an empty captured stack.
    pub fn make_error(&mut self, ty: Value, msg: &str, irrs: Value) -> Value {
        let ai = self.enter();
        let msg = self.make_string(msg);
        let err = self.alloc_obj(ObjError {
            header: ObjHeader::new(Tag::Error),
            ty,
            msg,
            irrs,
            stack: Value::Nil,
        });
        self.leave(ai);
        self.protect(Value::Obj(err))
    }

    // ---- dynamic-wind checkpoints --------------------------------------

    /// Push a new dynamic-wind checkpoint over the current one. The chain
    /// head is itself a root, so the new checkpoint needs no arena slot.
    pub fn push_checkpoint(&mut self, wind_in: Value, wind_out: Value) -> Value {
        let cp = self.alloc_obj_unsafe(ObjCheckpoint {
            header: ObjHeader::new(Tag::Checkpoint),
            prev: self.checkpoint,
            wind_in,
            wind_out,
        });
        self.checkpoint = cp.as_ptr().cast::<ObjCheckpoint>();
        Value::Obj(cp)
    }

    /// Pop the current checkpoint, restoring its predecessor.
    pub fn pop_checkpoint(&mut self) {
        assert!(!self.checkpoint.is_null(), "checkpoint chain is empty");
        // SAFETY: the chain head is a live checkpoint object.
        self.checkpoint = unsafe { (*self.checkpoint).prev };
    }

    /// The current checkpoint, or `Nil`.
    pub fn checkpoint(&self) -> Value {
        match NonNull::new(self.checkpoint.cast::<ObjHeader>()) {
            Some(obj) => Value::Obj(obj),
            None => Value::Nil,
        }
    }

    // ---- evaluator root slots ------------------------------------------

    /// Push onto the operand stack (a root).
    pub fn push_value(&mut self, v: Value) {
        self.stack.push(v);
    }

    /// Pop from the operand stack.
    pub fn pop_value(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Push a call frame whose register context is `cxt` (`Nil` or a
    /// context).
    pub fn push_frame(&mut self, cxt: Value) {
        let cxt = match cxt {
            Value::Nil => ptr::null_mut(),
            v => self.as_object::<ObjContext>(v),
        };
        self.frames.push(CallInfo { cxt });
    }

    /// Pop the innermost call frame.
    pub fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Bind `key` to `v` in the global table.
    pub fn global_set(&mut self, key: Value, v: Value) {
        let d = self.as_object::<ObjDict>(self.globals);
        // SAFETY: the global table is a live dictionary.
        unsafe { (*d).table.insert(EqKey(key), v) };
    }

    /// Look `key` up in the global table.
    pub fn global_ref(&self, key: Value) -> Option<Value> {
        let d = self.as_object::<ObjDict>(self.globals);
        // SAFETY: the global table is a live dictionary.
        unsafe { (*d).table.get(&EqKey(key)).copied() }
    }

    /// Bind `key` to `v` in the macro table.
    pub fn macro_set(&mut self, key: Value, v: Value) {
        let d = self.as_object::<ObjDict>(self.macros);
        // SAFETY: the macro table is a live dictionary.
        unsafe { (*d).table.insert(EqKey(key), v) };
    }

    /// Look `key` up in the macro table.
    pub fn macro_ref(&self, key: Value) -> Option<Value> {
        let d = self.as_object::<ObjDict>(self.macros);
        // SAFETY: the macro table is a live dictionary.
        unsafe { (*d).table.get(&EqKey(key)).copied() }
    }

    /// Set the current error value (a root).
    pub fn set_error(&mut self, v: Value) {
        self.err = v;
    }

    /// The current error value.
    pub fn error(&self) -> Value {
        self.err
    }

    /// Cons the symbol for `name` onto the feature list.
    pub fn add_feature(&mut self, name: &str) {
        let ai = self.enter();
        let sym = self.intern(name);
        self.features = self.cons(sym, self.features);
        self.leave(ai);
    }

    /// The feature list.
    pub fn features(&self) -> Value {
        self.features
    }

    /// Register a library; its name, environment and exports become roots.
    pub fn add_library(&mut self, name: Value, env: Value, exports: Value) {
        self.libs.push(Library { name, env, exports });
    }

    /// Register a compiled procedure body; its literal pool becomes a root.
    pub fn register_irep(&mut self, irep: IrepRef) {
        self.ireps.push(irep);
    }

    /// Unregister a compiled procedure body.
    pub fn unregister_irep(&mut self, irep: &IrepRef) {
        self.ireps.retain(|r| !Rc::ptr_eq(r, irep));
    }

    // ---- accessors -----------------------------------------------------

    /// First element of a pair.
    pub fn car(&self, pair: Value) -> Value {
        let p = self.as_object::<ObjPair>(pair);
        // SAFETY: checked live pair.
        unsafe { (*p).car }
    }

    /// Rest of a pair.
    pub fn cdr(&self, pair: Value) -> Value {
        let p = self.as_object::<ObjPair>(pair);
        // SAFETY: checked live pair.
        unsafe { (*p).cdr }
    }

    /// Replace the first element of a pair.
    pub fn set_car(&mut self, pair: Value, v: Value) {
        let p = self.as_object::<ObjPair>(pair);
        // SAFETY: checked live pair.
        unsafe { (*p).car = v };
    }

    /// Replace the rest of a pair.
    pub fn set_cdr(&mut self, pair: Value, v: Value) {
        let p = self.as_object::<ObjPair>(pair);
        // SAFETY: checked live pair.
        unsafe { (*p).cdr = v };
    }

    /// Vector length.
    pub fn vector_len(&self, vector: Value) -> usize {
        let v = self.as_object::<ObjVector>(vector);
        // SAFETY: checked live vector.
        unsafe { (&(*v).data).len() }
    }

    /// Vector element. Panics when out of bounds.
    pub fn vector_ref(&self, vector: Value, i: usize) -> Value {
        let v = self.as_object::<ObjVector>(vector);
        // SAFETY: checked live vector.
        unsafe { (*v).data[i] }
    }

    /// Replace a vector element. Panics when out of bounds.
    pub fn vector_set(&mut self, vector: Value, i: usize, x: Value) {
        let v = self.as_object::<ObjVector>(vector);
        // SAFETY: checked live vector.
        unsafe { (*v).data[i] = x };
    }

    /// Blob contents.
    pub fn blob_bytes(&self, blob: Value) -> &[u8] {
        let b = self.as_object::<ObjBlob>(blob);
        // SAFETY: checked live blob; the borrow is tied to &self.
        unsafe { &(*b).data }
    }

    /// String contents.
    pub fn string_str(&self, string: Value) -> &str {
        let s = self.as_object::<ObjString>(string);
        // SAFETY: checked live string; the borrow is tied to &self.
        unsafe { &(*s).rope }
    }

    /// A symbol's name.
    pub fn symbol_name(&self, symbol: Value) -> &str {
        let s = self.as_object::<ObjSymbol>(symbol);
        // SAFETY: a symbol keeps its name string alive.
        unsafe { &(*(*s).name).rope }
    }

    /// Bind `key` to `v` in a dictionary.
    pub fn dict_set(&mut self, dict: Value, key: Value, v: Value) {
        let d = self.as_object::<ObjDict>(dict);
        // SAFETY: checked live dictionary.
        unsafe { (*d).table.insert(EqKey(key), v) };
    }

    /// Look `key` up in a dictionary.
    pub fn dict_ref(&self, dict: Value, key: Value) -> Option<Value> {
        let d = self.as_object::<ObjDict>(dict);
        // SAFETY: checked live dictionary.
        unsafe { (*d).table.get(&EqKey(key)).copied() }
    }

    /// Number of entries in a dictionary.
    pub fn dict_len(&self, dict: Value) -> usize {
        let d = self.as_object::<ObjDict>(dict);
        // SAFETY: checked live dictionary.
        unsafe { (*d).table.len() }
    }

    /// Bind `key` (a heap object) to `v` in a weak map.
    pub fn weak_set(&mut self, weak: Value, key: Value, v: Value) {
        let w = self.as_object::<ObjWeak>(weak);
        let Value::Obj(key) = key else {
            panic!("weak map keys must be heap objects")
        };
        // SAFETY: checked live weak map.
        unsafe { (*w).table.insert(ObjKey(key), v) };
    }

    /// Look `key` up in a weak map.
    pub fn weak_ref(&self, weak: Value, key: Value) -> Option<Value> {
        let w = self.as_object::<ObjWeak>(weak);
        let Value::Obj(key) = key else {
            panic!("weak map keys must be heap objects")
        };
        // SAFETY: checked live weak map; lookup compares addresses only.
        unsafe { (*w).table.get(&ObjKey(key)).copied() }
    }

    /// Number of entries in a weak map.
    pub fn weak_len(&self, weak: Value) -> usize {
        let w = self.as_object::<ObjWeak>(weak);
        // SAFETY: checked live weak map.
        unsafe { (*w).table.len() }
    }

    /// Record a rename of `id` to `uid` in an environment.
    pub fn env_define(&mut self, env: Value, id: Value, uid: Value) {
        let e = self.as_object::<ObjEnv>(env);
        let (Value::Obj(id), Value::Obj(uid)) = (id, uid) else {
            panic!("environment entries must be identifiers")
        };
        // SAFETY: checked live environment.
        unsafe { (*e).table.insert(ObjKey(id), ObjKey(uid)) };
    }

    /// Resolve `id` through an environment chain.
    pub fn env_lookup(&self, env: Value, id: Value) -> Option<Value> {
        let mut e = self.as_object::<ObjEnv>(env);
        let Value::Obj(id) = id else {
            panic!("environment entries must be identifiers")
        };
        // SAFETY: the environment chain consists of live objects.
        unsafe {
            while !e.is_null() {
                if let Some(hit) = (*e).table.get(&ObjKey(id)) {
                    return Some(Value::Obj(hit.0));
                }
                e = (*e).up;
            }
        }
        None
    }

    /// A record's type descriptor.
    pub fn record_type(&self, record: Value) -> Value {
        let r = self.as_object::<ObjRecord>(record);
        // SAFETY: checked live record.
        unsafe { (*r).ty }
    }

    /// A record's payload.
    pub fn record_datum(&self, record: Value) -> Value {
        let r = self.as_object::<ObjRecord>(record);
        // SAFETY: checked live record.
        unsafe { (*r).datum }
    }

    /// The opaque payload pointer of a `DATA` object.
    pub fn data_ptr(&self, data: Value) -> *mut u8 {
        let d = self.as_object::<ObjData>(data);
        // SAFETY: checked live data object.
        unsafe { (*d).data }
    }

    /// Read a context register. Panics when out of bounds.
    pub fn context_reg(&self, cxt: Value, i: usize) -> Value {
        let c = self.as_object::<ObjContext>(cxt);
        // SAFETY: checked live context.
        unsafe { (*c).regs[i] }
    }

    /// Write a context register. Panics when out of bounds.
    pub fn context_set_reg(&mut self, cxt: Value, i: usize, v: Value) {
        let c = self.as_object::<ObjContext>(cxt);
        // SAFETY: checked live context.
        unsafe { (*c).regs[i] = v };
    }

    /// Read a captured local of a native closure.
    pub fn func_local(&self, func: Value, i: usize) -> Value {
        let f = self.as_object::<ObjFunc>(func);
        // SAFETY: checked live closure.
        unsafe { (*f).locals[i] }
    }

    /// Write a captured local of a native closure.
    pub fn func_set_local(&mut self, func: Value, i: usize, v: Value) {
        let f = self.as_object::<ObjFunc>(func);
        // SAFETY: checked live closure.
        unsafe { (*f).locals[i] = v };
    }
}

fn buffer_dtor(alloc: &Allocator, data: *mut u8) {
    // SAFETY: `data` came from this allocator via `alloca`.
    unsafe { alloc.free(data) };
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        // Closing the page heap never runs finalizers, so clear every root
        // slot and run one final collection to release all owned storage
        // first.
        self.gc_enabled = true;
        self.gc_stress = false;
        self.arena.clear();
        self.stack.clear();
        self.frames.clear();
        self.checkpoint = ptr::null_mut();
        self.globals = Value::Nil;
        self.macros = Value::Nil;
        self.err = Value::Nil;
        self.features = Value::Nil;
        self.libs.clear();
        self.ireps.clear();
        self.oblist.clear();
        gc::collect(self);
        self.heap.close(&self.alloc);
    }
}
