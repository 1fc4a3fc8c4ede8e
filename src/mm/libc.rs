//! C Allocation Entry Points
//!
//! `malloc`, `calloc`, `realloc`, `free` and `zalloc` for precompiled C
//! objects. The helpers here work on any [`HeapShim`]; with feature `c-abi`
//! the exported symbols forward them to the global [`HEAP`](super::HEAP).
//! Null means exhaustion; misuse of `free`/`realloc` is fatal.

#![cfg_attr(not(any(test, feature = "c-abi")), allow(dead_code))]

use core::ffi::c_void;
use core::ptr::{self, NonNull};

use super::{Allocation, HeapShim};
use crate::critical::InterruptControl;

fn into_c(block: Option<Allocation>) -> *mut c_void {
    block.map_or(ptr::null_mut(), |block| block.into_raw().as_ptr().cast())
}

/// # Safety
/// `ptr` must be null or come from one of these entry points.
unsafe fn adopt(ptr: *mut c_void) -> Option<Allocation> {
    // SAFETY: forwarded to the caller; release paths re-validate the header.
    NonNull::new(ptr.cast::<u8>()).map(|ptr| unsafe { Allocation::from_raw(ptr) })
}

pub(crate) fn heap_malloc<C: InterruptControl>(heap: &HeapShim<C>, size: usize) -> *mut c_void {
    into_c(heap.allocate(size))
}

pub(crate) fn heap_calloc<C: InterruptControl>(
    heap: &HeapShim<C>,
    count: usize,
    size: usize,
) -> *mut c_void {
    into_c(heap.allocate_zeroed(count, size))
}

pub(crate) fn heap_zalloc<C: InterruptControl>(heap: &HeapShim<C>, size: usize) -> *mut c_void {
    into_c(heap.zalloc(size))
}

/// # Safety
/// `ptr` must be null or a live pointer from `heap`.
pub(crate) unsafe fn heap_realloc<C: InterruptControl>(
    heap: &HeapShim<C>,
    ptr: *mut c_void,
    size: usize,
) -> *mut c_void {
    // SAFETY: forwarded to the caller.
    let block = unsafe { adopt(ptr) };
    match heap.reallocate(block, size) {
        Ok(block) => into_c(block),
        Err(exhausted) => {
            // The caller still owns the old pointer.
            let _ = exhausted.original.map(Allocation::into_raw);
            ptr::null_mut()
        }
    }
}

/// # Safety
/// `ptr` must be null or a live pointer from `heap`.
pub(crate) unsafe fn heap_free<C: InterruptControl>(heap: &HeapShim<C>, ptr: *mut c_void) {
    // SAFETY: forwarded to the caller.
    if let Some(block) = unsafe { adopt(ptr) } {
        heap.release(block);
    }
}

#[cfg(all(feature = "c-abi", not(test)))]
mod exports {
    use core::ffi::c_void;

    use super::*;
    use crate::mm::HEAP;

    #[no_mangle]
    pub extern "C" fn malloc(size: usize) -> *mut c_void {
        heap_malloc(&HEAP, size)
    }

    #[no_mangle]
    pub extern "C" fn calloc(count: usize, size: usize) -> *mut c_void {
        heap_calloc(&HEAP, count, size)
    }

    #[no_mangle]
    pub extern "C" fn zalloc(size: usize) -> *mut c_void {
        heap_zalloc(&HEAP, size)
    }

    /// # Safety
    /// `ptr` must be null or a live pointer from this heap.
    #[no_mangle]
    pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
        // SAFETY: forwarded to the caller.
        unsafe { heap_realloc(&HEAP, ptr, size) }
    }

    /// # Safety
    /// `ptr` must be null or a live pointer from this heap.
    #[no_mangle]
    pub unsafe extern "C" fn free(ptr: *mut c_void) {
        // SAFETY: forwarded to the caller.
        unsafe { heap_free(&HEAP, ptr) }
    }
}
