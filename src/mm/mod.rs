//! Memory management
//!
//! Provides:
//! - The interrupt-safe heap front-end ([`HeapShim`])
//! - The process-wide heap instance every subsystem allocates from
//! - C allocation entry points (feature `c-abi`)
//!
//! # Principles
//! - There is exactly one heap arena; it is never split or duplicated
//! - Every arena access runs inside a short critical section
//! - Exhaustion is an ordinary result, misuse is fatal

mod allocator;
mod block;
mod libc;

use core::sync::atomic::{AtomicBool, Ordering};

pub use allocator::{Exhausted, HeapShim, HeapStats};
pub use block::Allocation;

use crate::config::DEFAULT_HEAP_SIZE;
use crate::critical::arch::{self, Platform};
use crate::fault::{self, Fault};

/// The process-wide heap.
///
/// Firmware installs it with `#[global_allocator]` so Rust collections share
/// the arena with C code and interrupt handlers.
pub static HEAP: HeapShim<Platform> = HeapShim::new(arch::platform());

/// Hand the global heap its region.
///
/// Must be called once during early boot, before the first allocation and
/// before interrupts are enabled.
pub fn init_heap(region: &'static mut [u8]) {
    HEAP.init(region);
}

/// Initialize the global heap from a built-in static region of
/// [`DEFAULT_HEAP_SIZE`] bytes.
///
/// For boards without a linker-provided heap region.
pub fn init_default_heap() {
    #[repr(C, align(16))]
    struct Region([u8; DEFAULT_HEAP_SIZE]);

    static mut HEAP_MEMORY: Region = Region([0; DEFAULT_HEAP_SIZE]);
    static TAKEN: AtomicBool = AtomicBool::new(false);

    if TAKEN.swap(true, Ordering::SeqCst) {
        fault::fatal(Fault::ArenaReinitialised);
    }

    // SAFETY: TAKEN guarantees this is the only borrow of HEAP_MEMORY ever
    // created; no other code names the static.
    let region = unsafe { &mut (*core::ptr::addr_of_mut!(HEAP_MEMORY)).0 };
    HEAP.init(region);
}

/// Size of the global heap arena in bytes, zero before initialization.
pub fn heap_size() -> usize {
    HEAP.stats().size
}

/// Bytes still free in the global heap.
pub fn free_heap() -> usize {
    HEAP.stats().free
}
