//! Allocator shim
//!
//! Every raw byte the heap uses - pages, scratch buffers - flows through a
//! single realloc-style callback so embedders can redirect the engine to a
//! pool allocator or instrument allocation. The shim adds nothing beyond
//! uniform out-of-memory handling: a failed non-zero-size request is fatal.

use core::alloc::Layout;
use core::ptr;

use ::alloc::alloc::{alloc as sys_alloc, dealloc as sys_dealloc, realloc as sys_realloc};

/// Raw allocation hook with realloc/free semantics:
///
/// * `ptr.is_null()` and `size > 0` allocates,
/// * both non-null/non-zero reallocates,
/// * `size == 0` frees `ptr` and returns null,
/// * returns null on failure.
pub type AllocFn = unsafe fn(userdata: *mut u8, ptr: *mut u8, size: usize) -> *mut u8;

/// Thin wrapper over the embedder's [`AllocFn`].
///
/// Any non-zero-size request the hook cannot satisfy panics with
/// `"memory exhausted"`; there is no recovery path below this point.
#[derive(Clone, Copy)]
pub struct Allocator {
    allocf: AllocFn,
    userdata: *mut u8,
}

impl Allocator {
    /// Wrap an embedder-provided allocation hook.
    ///
    /// # Safety
    ///
    /// `allocf` must implement the [`AllocFn`] contract: memory it returns
    /// must stay valid until freed through the same hook, and must be
    /// aligned to at least 16 bytes.
    pub unsafe fn new(allocf: AllocFn, userdata: *mut u8) -> Self {
        Allocator { allocf, userdata }
    }

    /// An allocator routed through the global Rust allocator.
    pub fn system() -> Self {
        Allocator {
            allocf: system_allocf,
            userdata: ptr::null_mut(),
        }
    }

    /// Allocate `size` bytes. Returns null only for `size == 0`.
    pub fn malloc(&self, size: usize) -> *mut u8 {
        // SAFETY: the hook upholds the AllocFn contract per `new`.
        let p = unsafe { (self.allocf)(self.userdata, ptr::null_mut(), size) };
        if p.is_null() && size > 0 {
            panic!("memory exhausted");
        }
        p
    }

    /// Allocate a zero-filled array of `count` elements of `size` bytes.
    pub fn calloc(&self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            panic!("memory exhausted");
        };
        let p = self.malloc(total);
        if total > 0 {
            // SAFETY: `p` is valid for `total` bytes.
            unsafe { ptr::write_bytes(p, 0, total) };
        }
        p
    }

    /// Resize an allocation, preserving its contents.
    ///
    /// # Safety
    ///
    /// `p` must be null or an allocation obtained from this allocator that
    /// has not been freed.
    pub unsafe fn realloc(&self, p: *mut u8, size: usize) -> *mut u8 {
        let q = (self.allocf)(self.userdata, p, size);
        if q.is_null() && size > 0 {
            panic!("memory exhausted");
        }
        q
    }

    /// Free an allocation. Null is ignored.
    ///
    /// # Safety
    ///
    /// `p` must be null or an allocation obtained from this allocator that
    /// has not been freed.
    pub unsafe fn free(&self, p: *mut u8) {
        if !p.is_null() {
            (self.allocf)(self.userdata, p, 0);
        }
    }
}

// The global Rust allocator wants the allocation size back on free, so the
// default hook keeps it in a 16-byte prefix ahead of the returned pointer.
const HEADER: usize = 16;

fn layout(total: usize) -> Layout {
    match Layout::from_size_align(total, HEADER) {
        Ok(l) => l,
        Err(_) => panic!("memory exhausted"),
    }
}

unsafe fn system_allocf(_userdata: *mut u8, ptr: *mut u8, size: usize) -> *mut u8 {
    if size == 0 {
        if !ptr.is_null() {
            let base = ptr.sub(HEADER);
            let total = base.cast::<usize>().read();
            sys_dealloc(base, layout(total));
        }
        return ptr::null_mut();
    }
    let total = size + HEADER;
    let base = if ptr.is_null() {
        sys_alloc(layout(total))
    } else {
        let old = ptr.sub(HEADER);
        let old_total = old.cast::<usize>().read();
        sys_realloc(old, layout(old_total), total)
    };
    if base.is_null() {
        return ptr::null_mut();
    }
    base.cast::<usize>().write(total);
    base.add(HEADER)
}
