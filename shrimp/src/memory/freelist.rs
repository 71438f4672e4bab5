//! Free-list page back-end
//!
//! Classical first-fit storage over a circular, address-ordered free list
//! with an off-page sentinel node. Free regions keep a `{next, units}`
//! header in their first unit; an allocated block keeps its length in the
//! unit just ahead of the object so the sweep can walk a page block by
//! block. Each page starts with a permanent zero-size block that anchors
//! the page in the free list and gives the sweep a stable entry point.
//!
//! Marks live in the object header in this back-end.

use core::mem::size_of;
use core::ptr;

use crate::memory::alloc::Allocator;
use crate::memory::{SweepStats, PAGE_UNITS, UNIT_SIZE};
use crate::object::{self, Color, ObjHeader};

/// One allocation unit.
#[repr(C)]
struct Unit {
    next: *mut Unit,
    units: usize,
}

const _: () = assert!(size_of::<Unit>() == UNIT_SIZE);

#[repr(C)]
struct Page {
    next: *mut Page,
    basis: [Unit; PAGE_UNITS],
}

pub(crate) struct PageHeap {
    /// Zero-size node anchoring the circular free list.
    sentinel: *mut Unit,
    /// Rover for the first-fit scan.
    freep: *mut Unit,
    pages: *mut Page,
    page_count: usize,
}

impl PageHeap {
    pub(crate) fn open(alloc: &Allocator) -> Self {
        let sentinel = alloc.malloc(UNIT_SIZE).cast::<Unit>();
        // SAFETY: fresh allocation sized for one Unit.
        unsafe {
            sentinel.write(Unit {
                next: sentinel,
                units: 0,
            });
        }
        let mut heap = PageHeap {
            sentinel,
            freep: sentinel,
            pages: ptr::null_mut(),
            page_count: 0,
        };
        heap.morecore(alloc);
        heap
    }

    /// Free every page and the sentinel. No finalizers run here.
    pub(crate) fn close(&mut self, alloc: &Allocator) {
        let mut page = self.pages;
        while !page.is_null() {
            // SAFETY: page list nodes were allocated through `alloc` and are
            // freed exactly once.
            unsafe {
                let next = (*page).next;
                alloc.free(page.cast::<u8>());
                page = next;
            }
        }
        self.pages = ptr::null_mut();
        self.page_count = 0;
        // SAFETY: the sentinel was allocated through `alloc` in `open`.
        unsafe { alloc.free(self.sentinel.cast::<u8>()) };
        self.sentinel = ptr::null_mut();
        self.freep = ptr::null_mut();
    }

    /// Request one more page and donate its units to the free list.
    pub(crate) fn morecore(&mut self, alloc: &Allocator) {
        let page = alloc.malloc(size_of::<Page>()).cast::<Page>();
        // SAFETY: `page` is a fresh allocation of size_of::<Page>() bytes;
        // the marker and body headers are written before either is linked.
        unsafe {
            (*page).next = self.pages;
            self.pages = page;
            self.page_count += 1;
            let base = ptr::addr_of_mut!((*page).basis).cast::<Unit>();
            // permanent zero-size block: never allocated, anchors the sweep
            base.write(Unit {
                next: ptr::null_mut(),
                units: 0,
            });
            self.free_block(base);
            let body = base.add(1);
            (*body).units = PAGE_UNITS - 1;
            self.free_block(body);
        }
    }

    /// First-fit allocation. Returns null when no block is big enough.
    pub(crate) fn alloc(&mut self, size: usize) -> *mut ObjHeader {
        let nunits = 1 + size.div_ceil(UNIT_SIZE);
        // SAFETY: the free list is well formed; every node is live.
        unsafe {
            let mut prevp = self.freep;
            let mut p = (*prevp).next;
            loop {
                if (*p).units >= nunits {
                    break;
                }
                if p == self.freep {
                    return ptr::null_mut();
                }
                prevp = p;
                p = (*p).next;
            }
            if (*p).units == nunits {
                (*prevp).next = (*p).next;
            } else {
                // carve the tail off the block
                (*p).units -= nunits;
                p = p.add((*p).units);
                (*p).units = nunits;
            }
            self.freep = prevp;
            p.add(1).cast::<ObjHeader>()
        }
    }

    /// Insert the block headed at `bp` into the circular address-ordered
    /// free list, coalescing with adjacent neighbours.
    ///
    /// # Safety
    ///
    /// `bp` must head a block whose `units` field is valid and which is not
    /// already on the free list.
    unsafe fn free_block(&mut self, bp: *mut Unit) {
        let mut p = self.freep;
        loop {
            let next = (*p).next;
            if (bp > p && bp < next) || (p >= next && (bp > p || bp < next)) {
                break;
            }
            p = next;
        }
        let next = (*p).next;
        if next != self.sentinel && bp.add((*bp).units) == next {
            // merge with the upper neighbour
            (*bp).units += (*next).units;
            (*bp).next = (*next).next;
        } else {
            (*bp).next = next;
        }
        if p != self.sentinel && (*p).units > 0 && p.add((*p).units) == bp {
            // merge with the lower neighbour
            (*p).units += (*bp).units;
            (*p).next = (*bp).next;
        } else {
            (*p).next = bp;
        }
        self.freep = p;
    }

    pub(crate) fn gc_init(&mut self) {}

    /// # Safety
    ///
    /// `obj` must point at a live object allocated from this heap.
    pub(crate) unsafe fn is_marked(&self, obj: *const ObjHeader) -> bool {
        (*obj).mark == Color::Black
    }

    /// # Safety
    ///
    /// `obj` must point at a live object allocated from this heap.
    pub(crate) unsafe fn set_mark(&mut self, obj: *mut ObjHeader) {
        (*obj).mark = Color::Black;
    }

    /// Finalize and reclaim every unmarked object, resetting survivors to
    /// white. Returns the surviving unit count.
    pub(crate) fn sweep(&mut self, alloc: &Allocator) -> SweepStats {
        let mut stats = SweepStats {
            inuse: 0,
            total: self.page_count * PAGE_UNITS,
        };
        let mut page = self.pages;
        while !page.is_null() {
            // SAFETY: page list nodes are live until close().
            unsafe {
                stats.inuse += self.sweep_page(alloc, page);
                page = (*page).next;
            }
        }
        stats
    }

    /// Walk one page block by block, hopping between the free blocks that
    /// bound the allocated runs.
    unsafe fn sweep_page(&mut self, alloc: &Allocator, page: *mut Page) -> usize {
        let base = ptr::addr_of_mut!((*page).basis).cast::<Unit>();
        let end = base.add(PAGE_UNITS);
        let mut alive = 0;
        let mut dead: *mut Unit = ptr::null_mut();
        let mut dead_tail: *mut Unit = ptr::null_mut();
        let mut bp = base;
        'page: loop {
            // the page marker has size 0; force the scan past it
            let stop = (*bp).next;
            let mut p = bp.add(if (*bp).units == 0 { 1 } else { (*bp).units });
            while p != stop {
                if p < base || end <= p {
                    break 'page;
                }
                let obj = p.add(1).cast::<ObjHeader>();
                if (*obj).mark == Color::Black {
                    (*obj).mark = Color::White;
                    alive += (*p).units;
                } else {
                    object::finalize(alloc, obj);
                    // the dead block's link field is free for reuse
                    if dead.is_null() {
                        dead = p;
                    } else {
                        (*dead_tail).next = p;
                    }
                    dead_tail = p;
                    (*p).next = ptr::null_mut();
                }
                p = p.add((*p).units);
            }
            bp = stop;
        }
        while !dead.is_null() {
            let p = dead;
            dead = (*p).next;
            self.free_block(p);
        }
        alive
    }

    pub(crate) fn contains(&self, obj: *const ObjHeader) -> bool {
        let target = obj.cast::<u8>();
        let mut page = self.pages;
        while !page.is_null() {
            // SAFETY: page list nodes are live; only addresses are compared.
            unsafe {
                let base = ptr::addr_of!((*page).basis).cast::<u8>();
                let end = base.add(PAGE_UNITS * UNIT_SIZE);
                if target >= base && target < end {
                    return true;
                }
                page = (*page).next;
            }
        }
        false
    }

    pub(crate) fn page_count(&self) -> usize {
        self.page_count
    }

    pub(crate) fn total_units(&self) -> usize {
        self.page_count * PAGE_UNITS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjPair, Tag};
    use crate::value::Value;

    fn raw_pair(heap: &mut PageHeap) -> *mut ObjHeader {
        let p = heap.alloc(size_of::<ObjPair>());
        assert!(!p.is_null());
        // SAFETY: `p` heads a fresh cell big enough for an ObjPair.
        unsafe {
            p.cast::<ObjPair>().write(ObjPair {
                header: ObjHeader::new(Tag::Pair),
                car: Value::Nil,
                cdr: Value::Nil,
            });
        }
        p
    }

    #[test]
    fn allocations_are_distinct_and_owned() {
        let alloc = Allocator::system();
        let mut heap = PageHeap::open(&alloc);
        let a = raw_pair(&mut heap);
        let b = raw_pair(&mut heap);
        assert_ne!(a, b);
        assert!(heap.contains(a));
        assert!(heap.contains(b));
        assert!(!heap.contains(ptr::null()));
        heap.close(&alloc);
    }

    #[test]
    fn first_fit_exhausts_then_grows() {
        let alloc = Allocator::system();
        let mut heap = PageHeap::open(&alloc);
        let mut count = 0;
        while !heap.alloc(size_of::<ObjPair>()).is_null() {
            count += 1;
        }
        // one page of 2048 units, minus the marker, in 4-unit blocks
        assert!(count >= 500 && count <= PAGE_UNITS / 4);
        assert_eq!(heap.page_count(), 1);
        heap.morecore(&alloc);
        assert_eq!(heap.page_count(), 2);
        assert!(!heap.alloc(size_of::<ObjPair>()).is_null());
        heap.close(&alloc);
    }

    #[test]
    fn sweep_reclaims_unmarked_blocks() {
        let alloc = Allocator::system();
        let mut heap = PageHeap::open(&alloc);
        let a = raw_pair(&mut heap);
        let b = raw_pair(&mut heap);
        let _c = raw_pair(&mut heap);
        // SAFETY: a and b are live objects from this heap.
        unsafe { heap.set_mark(b) };
        let stats = heap.sweep(&alloc);
        let block_units = 1 + size_of::<ObjPair>().div_ceil(UNIT_SIZE);
        assert_eq!(stats.inuse, block_units);
        assert_eq!(stats.total, PAGE_UNITS);
        // the survivor was reset to white
        // SAFETY: b survived the sweep.
        unsafe { assert!(!heap.is_marked(b)) };
        // freed space is reused
        let d = raw_pair(&mut heap);
        let _ = (a, d);
        heap.close(&alloc);
    }

    #[test]
    fn sweep_of_all_dead_blocks_coalesces() {
        let alloc = Allocator::system();
        let mut heap = PageHeap::open(&alloc);
        for _ in 0..100 {
            raw_pair(&mut heap);
        }
        let stats = heap.sweep(&alloc);
        assert_eq!(stats.inuse, 0);
        // the whole page is available again as a contiguous run
        let mut count = 0;
        while !heap.alloc(size_of::<ObjPair>()).is_null() {
            count += 1;
        }
        assert!(count >= 500);
        heap.close(&alloc);
    }
}
