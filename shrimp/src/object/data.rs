//! Embedder-defined opaque objects.

use crate::memory::alloc::Allocator;
use crate::memory::gc::Tracer;
use crate::object::{HeapObject, ObjHeader, Tag};

/// Vtable describing an embedder-defined [`ObjData`] variant.
///
/// Both hooks must be reentrancy-safe with respect to the collector: `mark`
/// may only report owned values through the tracer it is handed, and `dtor`
/// may free memory through the allocator but must not allocate heap objects
/// or mark anything.
pub struct DataType {
    /// Human-readable type name.
    pub name: &'static str,
    /// Advisory size of the external payload in bytes; 0 when variable.
    pub size: usize,
    /// Trace hook: reports every heap [`Value`](crate::Value) owned by the
    /// payload. `None` when the payload holds no values.
    pub mark: Option<fn(*mut u8, &mut Tracer<'_>)>,
    /// Finalize hook: releases the payload. `None` when there is nothing to
    /// release.
    pub dtor: Option<fn(&Allocator, *mut u8)>,
}

/// `DATA` - an opaque embedder payload together with its vtable.
#[repr(C)]
pub struct ObjData {
    pub(crate) header: ObjHeader,
    /// The payload's vtable.
    pub ty: &'static DataType,
    /// The opaque payload.
    pub data: *mut u8,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjData {
    const TAG: Tag = Tag::Data;
}
