//! Heap facade shared by both page back-ends.
//!
//! The facade pairs the selected page store with the transient weak-map
//! chain the mark phase builds, so the collector sees one interface no
//! matter which back-end is compiled in.

use core::ptr;

use crate::memory::alloc::Allocator;
use crate::memory::SweepStats;
use crate::object::table::ObjWeak;
use crate::object::ObjHeader;

#[cfg(feature = "bitmap-gc")]
pub(crate) use crate::memory::bitmap::PageHeap;
#[cfg(not(feature = "bitmap-gc"))]
pub(crate) use crate::memory::freelist::PageHeap;

pub(crate) struct Heap {
    pub(crate) pages: PageHeap,
    /// Head of the transient chain of weak maps reached during the current
    /// mark phase (linked through each map's `prev` field).
    pub(crate) weaks: *mut ObjWeak,
}

impl Heap {
    pub(crate) fn open(alloc: &Allocator) -> Self {
        Heap {
            pages: PageHeap::open(alloc),
            weaks: ptr::null_mut(),
        }
    }

    /// Free every page. Finalizers do not run; the caller is expected to
    /// have terminated all live state first.
    pub(crate) fn close(&mut self, alloc: &Allocator) {
        self.pages.close(alloc);
        self.weaks = ptr::null_mut();
    }

    pub(crate) fn alloc(&mut self, size: usize) -> *mut ObjHeader {
        self.pages.alloc(size)
    }

    pub(crate) fn morecore(&mut self, alloc: &Allocator) {
        self.pages.morecore(alloc);
    }

    /// Back-end preparation at the start of a collection.
    pub(crate) fn gc_init(&mut self) {
        self.weaks = ptr::null_mut();
        self.pages.gc_init();
    }

    /// # Safety
    ///
    /// `obj` must point at a live object allocated from this heap.
    pub(crate) unsafe fn is_marked(&self, obj: *const ObjHeader) -> bool {
        self.pages.is_marked(obj)
    }

    /// # Safety
    ///
    /// `obj` must point at a live object allocated from this heap.
    pub(crate) unsafe fn set_mark(&mut self, obj: *mut ObjHeader) {
        self.pages.set_mark(obj);
    }

    pub(crate) fn sweep(&mut self, alloc: &Allocator) -> SweepStats {
        self.pages.sweep(alloc)
    }

    pub(crate) fn contains(&self, obj: *const ObjHeader) -> bool {
        self.pages.contains(obj)
    }
}
