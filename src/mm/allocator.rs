//! Interrupt-safe Heap Front-end
//!
//! Wraps the single heap arena (`linked_list_allocator::Heap`) so that tasks
//! and interrupt handlers can both allocate from it.
//!
//! # Locking
//! Every arena call runs inside a [`CriticalSection`] with the arena's spin
//! lock held. Only the arena call itself is guarded: header bookkeeping,
//! zero filling and the `reallocate` copy all run with interrupts enabled.
//!
//! On a single core with interrupts masked nobody can be holding the arena
//! lock except the current execution path, so a lock that is already taken
//! means the arena was re-entered. That is fatal, never a spin.
//!
//! # Failure Model
//! - Exhaustion is an ordinary `None` (or [`Exhausted`]) result.
//! - Double release, foreign pointers, re-entrant use and a second `init`
//!   are contract violations and go through [`fault::fatal`].

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicUsize, Ordering};

use linked_list_allocator::Heap;
use log::{debug, warn};
use spin::Mutex;

use super::block::{Allocation, BlockHeader, HEADER_SIZE};
use crate::config::BLOCK_ALIGN;
use crate::critical::{CriticalSection, InterruptControl};
use crate::fault::{self, Fault};

/// Smallest region `init` accepts: one header plus alignment slack.
pub const MIN_REGION: usize = HEADER_SIZE + 2 * BLOCK_ALIGN;

/// Returned by [`HeapShim::reallocate`] when the arena has no room for the
/// new block. The original block, if any, is handed back untouched.
#[derive(Debug)]
pub struct Exhausted {
    /// The block passed to `reallocate`, still valid and still yours.
    pub original: Option<Allocation>,
}

/// Arena usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Total arena size in bytes.
    pub size: usize,
    /// Bytes currently handed out, headers included.
    pub used: usize,
    /// Bytes still available.
    pub free: usize,
}

/// Heap front-end over a single arena.
pub struct HeapShim<C: InterruptControl> {
    arena: Mutex<Heap>,
    control: C,
    /// Arena bounds, zero until `init`.
    bottom: AtomicUsize,
    top: AtomicUsize,
}

impl<C: InterruptControl> HeapShim<C> {
    /// Create a front-end with an empty arena.
    ///
    /// Every allocation fails until [`init`](Self::init) is called.
    pub const fn new(control: C) -> Self {
        Self {
            arena: Mutex::new(Heap::empty()),
            control,
            bottom: AtomicUsize::new(0),
            top: AtomicUsize::new(0),
        }
    }

    /// Hand the arena its memory.
    ///
    /// # Panics
    /// Fatal if the arena already has a region or `region` is shorter than
    /// [`MIN_REGION`].
    pub fn init(&self, region: &'static mut [u8]) {
        if self.bottom.load(Ordering::SeqCst) != 0 {
            fault::fatal(Fault::ArenaReinitialised);
        }
        if region.len() < MIN_REGION {
            fault::fatal(Fault::ArenaTooSmall { len: region.len() });
        }

        let start = region.as_mut_ptr();
        let len = region.len();
        let (bottom, top) = self.with_arena(|heap| {
            // SAFETY: `region` is a 'static exclusive borrow that we never
            // hand out again; the arena owns it from here on.
            unsafe { heap.init(start, len) };
            (heap.bottom() as usize, heap.top() as usize)
        });
        self.bottom.store(bottom, Ordering::SeqCst);
        self.top.store(top, Ordering::SeqCst);

        debug!("[HEAP] arena {:#x}..{:#x} ({} bytes)", bottom, top, top - bottom);
    }

    /// Run `f` on the arena with interrupts masked.
    fn with_arena<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        let _section = CriticalSection::enter(&self.control);
        let Some(mut heap) = self.arena.try_lock() else {
            fault::fatal(Fault::ReentrantArena);
        };
        f(&mut heap)
    }

    /// Allocate a block of at least `size` bytes.
    ///
    /// Returns `None` when the arena cannot satisfy the request. A zero
    /// `size` yields a valid, unique, empty block.
    #[must_use]
    pub fn allocate(&self, size: usize) -> Option<Allocation> {
        let layout = block_layout(size)?;
        match self.with_arena(|heap| heap.allocate_first_fit(layout)) {
            // SAFETY: the arena just gave us `layout.size()` exclusive bytes
            // aligned to BLOCK_ALIGN.
            Ok(base) => Some(unsafe { Allocation::stamp(base, size) }),
            Err(()) => {
                warn!("[HEAP] out of memory: {} bytes requested", size);
                None
            }
        }
    }

    /// Allocate `count * size` bytes, all zero.
    ///
    /// Returns `None` if the product overflows or the arena is exhausted.
    #[must_use]
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Allocation> {
        let Some(total) = count.checked_mul(size) else {
            warn!("[HEAP] zeroed allocation overflows: {} x {}", count, size);
            return None;
        };
        let mut block = self.allocate(total)?;
        block.as_mut_slice().fill(0);
        Some(block)
    }

    /// Allocate `size` zeroed bytes. Same as `allocate_zeroed(1, size)`.
    #[inline]
    #[must_use]
    pub fn zalloc(&self, size: usize) -> Option<Allocation> {
        self.allocate_zeroed(1, size)
    }

    /// Resize a block by moving it.
    ///
    /// - `block == None` behaves like [`allocate`](Self::allocate).
    /// - `new_size == 0` releases the block and returns `Ok(None)`.
    /// - Otherwise the first `min(new_size, old size)` bytes are carried
    ///   over into a fresh block and the old one is released.
    ///
    /// On exhaustion the original block is returned inside [`Exhausted`].
    pub fn reallocate(
        &self,
        block: Option<Allocation>,
        new_size: usize,
    ) -> Result<Option<Allocation>, Exhausted> {
        let Some(old) = block else {
            return match self.allocate(new_size) {
                Some(new) => Ok(Some(new)),
                None => Err(Exhausted { original: None }),
            };
        };

        if new_size == 0 {
            self.release(old);
            return Ok(None);
        }

        let old_size = self.checked_header(old.raw()).size();
        let Some(new) = self.allocate(new_size) else {
            return Err(Exhausted {
                original: Some(old),
            });
        };

        let keep = old_size.min(new_size);
        // SAFETY: both blocks are live, distinct, and at least `keep` bytes.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), keep) };
        self.release(old);
        Ok(Some(new))
    }

    /// Give a block back to the arena.
    ///
    /// # Panics
    /// Fatal if the block lies outside the arena or is not live.
    pub fn release(&self, block: Allocation) {
        let user = block.into_raw();
        let base = user.as_ptr().wrapping_sub(HEADER_SIZE);

        // Check and poison under the guard, so two releases of the same
        // block from task and interrupt context cannot both pass.
        self.with_arena(|heap| {
            let header = self.checked_header(user);
            // SAFETY: `checked_header` proved the header is inside the arena.
            unsafe { BlockHeader::poison(user) };
            // SAFETY: the header check guarantees this block came from the
            // arena with exactly this layout and has not been released yet.
            unsafe {
                heap.deallocate(NonNull::new_unchecked(base), block_layout_unchecked(header.size()))
            }
        });
    }

    /// Current arena usage.
    pub fn stats(&self) -> HeapStats {
        self.with_arena(|heap| HeapStats {
            size: heap.size(),
            used: heap.used(),
            free: heap.free(),
        })
    }

    /// Validate a user pointer and read its header.
    fn checked_header(&self, user: NonNull<u8>) -> BlockHeader {
        let addr = user.as_ptr() as usize;
        let bottom = self.bottom.load(Ordering::SeqCst);
        let top = self.top.load(Ordering::SeqCst);

        let in_arena = bottom != 0
            && addr >= bottom + HEADER_SIZE
            && addr <= top
            && addr % BLOCK_ALIGN == 0;
        if !in_arena {
            fault::fatal(Fault::ForeignRelease { addr });
        }

        // SAFETY: the header lies inside the arena and is aligned.
        let header = unsafe { BlockHeader::read(user) };
        if !header.is_live() {
            fault::fatal(Fault::DoubleRelease { addr });
        }
        if header.size() > top - addr {
            fault::fatal(Fault::ForeignRelease { addr });
        }
        header
    }

    /// Allocate straight from the arena for alignments above `BLOCK_ALIGN`.
    fn allocate_aligned(&self, layout: Layout) -> *mut u8 {
        self.with_arena(|heap| heap.allocate_first_fit(layout))
            .map_or(ptr::null_mut(), NonNull::as_ptr)
    }
}

/// Arena layout of a block with `size` user bytes.
fn block_layout(size: usize) -> Option<Layout> {
    let total = size.checked_add(HEADER_SIZE)?;
    Layout::from_size_align(total, BLOCK_ALIGN).ok()
}

/// Layout of a block whose size was already accepted by `block_layout`.
///
/// # Safety
/// `size` must have produced a valid layout at allocation time.
unsafe fn block_layout_unchecked(size: usize) -> Layout {
    // SAFETY: guaranteed by the caller.
    unsafe { Layout::from_size_align_unchecked(size + HEADER_SIZE, BLOCK_ALIGN) }
}

// SAFETY: every path hands out exclusive arena memory and takes it back
// with the layout it was allocated with.
unsafe impl<C: InterruptControl + Sync> GlobalAlloc for HeapShim<C> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_ALIGN {
            return self.allocate_aligned(layout);
        }
        self.allocate(layout.size())
            .map_or(ptr::null_mut(), |block| block.into_raw().as_ptr())
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > BLOCK_ALIGN {
            let ptr = self.allocate_aligned(layout);
            if !ptr.is_null() {
                // SAFETY: the arena returned `layout.size()` bytes at `ptr`.
                unsafe { ptr::write_bytes(ptr, 0, layout.size()) };
            }
            return ptr;
        }
        self.zalloc(layout.size())
            .map_or(ptr::null_mut(), |block| block.into_raw().as_ptr())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else {
            return;
        };
        if layout.align() > BLOCK_ALIGN {
            // SAFETY: blocks with large alignment come straight from the
            // arena with this layout.
            self.with_arena(|heap| unsafe { heap.deallocate(ptr, layout) });
            return;
        }
        // SAFETY: `ptr` came from `alloc` above; `release` re-checks it.
        self.release(unsafe { Allocation::from_raw(ptr) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critical::SimulatedInterrupts;
    use core::sync::atomic::AtomicBool;

    fn region(len: usize) -> &'static mut [u8] {
        let words: &'static mut [u64] = Box::leak(vec![0u64; len / 8].into_boxed_slice());
        unsafe { core::slice::from_raw_parts_mut(words.as_mut_ptr().cast::<u8>(), len) }
    }

    fn heap(len: usize) -> HeapShim<SimulatedInterrupts> {
        let shim = HeapShim::new(SimulatedInterrupts::new());
        shim.init(region(len));
        shim
    }

    fn filled(shim: &HeapShim<SimulatedInterrupts>, len: usize) -> Allocation {
        let mut block = shim.allocate(len).unwrap();
        for (i, byte) in block.as_mut_slice().iter_mut().enumerate() {
            *byte = i as u8;
        }
        block
    }

    #[test]
    fn test_allocate_before_init_is_exhaustion() {
        let shim = HeapShim::new(SimulatedInterrupts::new());
        assert!(shim.allocate(16).is_none());
    }

    #[test]
    #[should_panic(expected = "heap arena initialised twice")]
    fn test_second_init_is_fatal() {
        let shim = heap(4096);
        shim.init(region(4096));
    }

    #[test]
    fn test_live_blocks_never_overlap() {
        let shim = heap(8192);
        let blocks: Vec<Allocation> = (0..16u8)
            .map(|i| {
                let mut block = shim.allocate(40 + i as usize).unwrap();
                block.as_mut_slice().fill(i);
                block
            })
            .collect();

        for (i, a) in blocks.iter().enumerate() {
            assert!(a.as_slice().iter().all(|&b| b == i as u8));
            assert_eq!(a.as_ptr() as usize % BLOCK_ALIGN, 0);
            for b in blocks.iter().skip(i + 1) {
                let (a0, a1) = (a.as_ptr() as usize, a.as_ptr() as usize + a.len());
                let (b0, b1) = (b.as_ptr() as usize, b.as_ptr() as usize + b.len());
                assert!(a1 <= b0 || b1 <= a0);
            }
        }

        for block in blocks {
            shim.release(block);
        }
        assert_eq!(shim.stats().used, 0);
    }

    #[test]
    fn test_release_makes_room_again() {
        let shim = heap(1024);
        let mut held = Vec::new();
        while let Some(block) = shim.allocate(64) {
            held.push(block);
        }
        assert!(!held.is_empty());
        assert!(shim.allocate(64).is_none());

        shim.release(held.pop().unwrap());
        assert!(shim.allocate(64).is_some());
    }

    #[test]
    fn test_zero_size_blocks_are_unique() {
        let shim = heap(1024);
        let a = shim.allocate(0).unwrap();
        let b = shim.allocate(0).unwrap();
        assert!(a.is_empty());
        assert_ne!(a.as_ptr(), b.as_ptr());
        shim.release(a);
        shim.release(b);
    }

    #[test]
    fn test_allocate_zeroed_clears_reused_memory() {
        let shim = heap(1024);
        let mut dirty = shim.allocate(96).unwrap();
        dirty.as_mut_slice().fill(0xFF);
        shim.release(dirty);

        let clean = shim.allocate_zeroed(12, 8).unwrap();
        assert_eq!(clean.len(), 96);
        assert!(clean.as_slice().iter().all(|&b| b == 0));

        let z = shim.zalloc(5).unwrap();
        assert_eq!(z.as_slice(), &[0; 5]);
    }

    #[test]
    fn test_allocate_zeroed_overflow_fails() {
        let shim = heap(1024);
        assert!(shim.allocate_zeroed(usize::MAX, 2).is_none());
        assert!(shim.allocate_zeroed(2, usize::MAX / 2 + 1).is_none());
        assert!(shim.allocate_zeroed(usize::MAX, 1).is_none());
        assert!(shim.allocate_zeroed(0, usize::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_reallocate_shrink_keeps_prefix() {
        let shim = heap(2048);
        let old = filled(&shim, 64);
        let new = shim.reallocate(Some(old), 10).unwrap().unwrap();
        assert_eq!(new.len(), 10);
        assert_eq!(new.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_reallocate_grow_copies_only_old_size() {
        let shim = heap(2048);
        // Neighbour right behind the old block, so over-reading would pick
        // up its bytes.
        let old = filled(&shim, 16);
        let mut neighbour = shim.allocate(64).unwrap();
        neighbour.as_mut_slice().fill(0xEE);

        let new = shim.reallocate(Some(old), 48).unwrap().unwrap();
        assert_eq!(new.len(), 48);
        let expected: Vec<u8> = (0..16).collect();
        assert_eq!(&new.as_slice()[..16], &expected[..]);
        assert!(neighbour.as_slice().iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_reallocate_to_zero_releases() {
        let shim = heap(1024);
        let block = filled(&shim, 32);
        assert!(shim.reallocate(Some(block), 0).unwrap().is_none());
        assert_eq!(shim.stats().used, 0);
    }

    #[test]
    fn test_reallocate_none_allocates() {
        let shim = heap(1024);
        let block = shim.reallocate(None, 24).unwrap().unwrap();
        assert_eq!(block.len(), 24);
    }

    #[test]
    fn test_reallocate_failure_keeps_original() {
        let shim = heap(512);
        let old = filled(&shim, 32);
        let addr = old.as_ptr();

        let err = shim.reallocate(Some(old), 4096).unwrap_err();
        let original = err.original.unwrap();
        assert_eq!(original.as_ptr(), addr);
        assert_eq!(original.len(), 32);
        assert_eq!(original.as_slice()[31], 31);
        shim.release(original);
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn test_double_release_is_fatal() {
        let shim = heap(1024);
        let raw = shim.allocate(32).unwrap().into_raw();
        shim.release(unsafe { Allocation::from_raw(raw) });
        shim.release(unsafe { Allocation::from_raw(raw) });
    }

    #[test]
    #[should_panic(expected = "release of foreign pointer")]
    fn test_foreign_release_is_fatal() {
        let shim = heap(1024);
        let mut outside = [0u64; 4];
        let ptr = NonNull::new(outside[2..].as_mut_ptr().cast::<u8>()).unwrap();
        shim.release(unsafe { Allocation::from_raw(ptr) });
    }

    #[test]
    #[should_panic(expected = "re-entrant heap arena access")]
    fn test_reentrant_arena_is_fatal() {
        let shim = heap(1024);
        let _held = shim.arena.lock();
        let _ = shim.allocate(8);
    }

    #[test]
    fn test_interrupts_restored_after_every_operation() {
        let shim = heap(1024);
        let block = shim.allocate(8).unwrap();
        assert!(shim.control.enabled());
        assert!(shim.reallocate(Some(block), 0).unwrap().is_none());
        assert!(shim.control.enabled());
        let _ = shim.allocate(1 << 20);
        assert!(shim.control.enabled());
    }

    #[test]
    fn test_stats_track_usage() {
        let shim = heap(4096);
        let before = shim.stats();
        assert_eq!(before.used, 0);
        assert_eq!(before.free, before.size);

        let block = shim.allocate(100).unwrap();
        let during = shim.stats();
        assert!(during.used >= 100 + HEADER_SIZE);
        assert_eq!(during.used + during.free, during.size);

        shim.release(block);
        assert_eq!(shim.stats(), before);
    }

    #[test]
    fn test_global_alloc_paths() {
        let shim = heap(4096);
        unsafe {
            let small = Layout::from_size_align(24, 4).unwrap();
            let p = shim.alloc_zeroed(small);
            assert!(!p.is_null());
            assert!(core::slice::from_raw_parts(p, 24).iter().all(|&b| b == 0));
            shim.dealloc(p, small);

            let wide = Layout::from_size_align(64, 64).unwrap();
            let q = shim.alloc(wide);
            assert!(!q.is_null());
            assert_eq!(q as usize % 64, 0);
            shim.dealloc(q, wide);
        }
        assert_eq!(shim.stats().used, 0);
    }

    #[test]
    fn test_blocks_meet_c_max_alignment() {
        let shim = heap(4096);
        assert!(BLOCK_ALIGN >= 2 * core::mem::size_of::<usize>());
        let blocks: Vec<Allocation> = [1, 8, 24, 3, 40, 5, 0, 17]
            .iter()
            .map(|&n| shim.allocate(n).unwrap())
            .collect();
        for block in &blocks {
            assert_eq!(block.as_ptr() as usize % BLOCK_ALIGN, 0);
        }
        let z = shim.allocate_zeroed(3, 7).unwrap();
        assert_eq!(z.as_ptr() as usize % BLOCK_ALIGN, 0);
        shim.release(z);
        for block in blocks {
            shim.release(block);
        }
    }

    #[test]
    #[should_panic(expected = "heap region of 8 bytes too small")]
    fn test_tiny_region_is_fatal() {
        let shim = HeapShim::new(SimulatedInterrupts::new());
        shim.init(region(8));
    }

    #[test]
    fn test_smallest_region_is_accepted() {
        let shim = heap(MIN_REGION);
        assert!(shim.stats().size > 0);
    }

    /// Records whether a watched block was still live when interrupts were
    /// masked.
    struct PeekingInterrupts {
        watch: AtomicUsize,
        live_when_masked: AtomicBool,
    }

    impl InterruptControl for PeekingInterrupts {
        type State = ();

        fn disable(&self) {
            if let Some(user) = NonNull::new(self.watch.load(Ordering::SeqCst) as *mut u8) {
                let live = unsafe { BlockHeader::read(user) }.is_live();
                self.live_when_masked.store(live, Ordering::SeqCst);
            }
        }

        unsafe fn restore(&self, _state: ()) {}
    }

    #[test]
    fn test_release_checks_and_poisons_under_guard() {
        let shim = HeapShim::new(PeekingInterrupts {
            watch: AtomicUsize::new(0),
            live_when_masked: AtomicBool::new(false),
        });
        shim.init(region(1024));

        let block = shim.allocate(32).unwrap();
        shim.control.watch.store(block.as_ptr() as usize, Ordering::SeqCst);
        shim.release(block);
        shim.control.watch.store(0, Ordering::SeqCst);

        // The header was still live when the section opened, so the check
        // and the poisoning both ran with interrupts masked.
        assert!(shim.control.live_when_masked.load(Ordering::SeqCst));
        assert_eq!(shim.stats().used, 0);
    }
}
