//! Heap Blocks
//!
//! Every block handed out by the heap front-end is preceded by a header
//! that records the size the caller asked for and whether the block is
//! still live:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────┐
//! │ magic: usize │ size: usize  │ user bytes (size)        │
//! └──────────────┴──────────────┴──────────────────────────┘
//! ^ arena block                 ^ Allocation::as_ptr()
//! ```
//!
//! The recorded size is what `reallocate` copies from, so growing a block
//! never reads past the end of the old one. The magic word catches double
//! releases: it is poisoned before the block goes back to the arena.

use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::config::BLOCK_ALIGN;

/// Magic word of a block that is currently owned by a caller.
const LIVE: usize = 0xB10C_A11C;

/// Magic word written into a block as it is released.
const RELEASED: usize = 0xDEAD_B10C;

/// Bookkeeping stored in front of every block.
///
/// Two words, so exactly `BLOCK_ALIGN` bytes and user data stays aligned.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockHeader {
    magic: usize,
    size: usize,
}

/// Bytes reserved in front of the user data.
pub(crate) const HEADER_SIZE: usize = size_of::<BlockHeader>();

const _: () = assert!(HEADER_SIZE % BLOCK_ALIGN == 0);

impl BlockHeader {
    /// Whether the header belongs to a live block.
    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.magic == LIVE
    }

    /// Size recorded when the block was handed out.
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Header of the block whose user data starts at `user`.
    ///
    /// # Safety
    /// `user - HEADER_SIZE` must lie inside the heap arena and be aligned
    /// to `BLOCK_ALIGN`.
    #[inline]
    pub(crate) unsafe fn read(user: NonNull<u8>) -> Self {
        // SAFETY: caller guarantees the header address is in bounds and aligned.
        unsafe { ptr::read_volatile(Self::locate(user)) }
    }

    /// Mark the block at `user` released.
    ///
    /// # Safety
    /// Same as [`read`](Self::read); the block must be live.
    #[inline]
    pub(crate) unsafe fn poison(user: NonNull<u8>) {
        // SAFETY: caller guarantees the header address is in bounds and aligned.
        unsafe { ptr::addr_of_mut!((*Self::locate(user)).magic).write_volatile(RELEASED) };
    }

    #[inline]
    fn locate(user: NonNull<u8>) -> *mut Self {
        user.as_ptr().wrapping_sub(HEADER_SIZE).cast::<Self>()
    }
}

/// A heap block owned by the caller.
///
/// Not `Clone`: exactly one owner exists until the block is handed back to
/// the heap it came from. Dropping the handle leaks the block.
#[must_use = "dropping an Allocation leaks the block; release it instead"]
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    user: NonNull<u8>,
}

// SAFETY: an Allocation is a uniquely owned block of plain bytes.
unsafe impl Send for Allocation {}

impl Allocation {
    /// Stamp a live header onto a fresh arena block.
    ///
    /// # Safety
    /// `base` must point to at least `HEADER_SIZE + size` writable bytes,
    /// aligned to `BLOCK_ALIGN`, that nobody else references.
    pub(crate) unsafe fn stamp(base: NonNull<u8>, size: usize) -> Self {
        let header = base.as_ptr().cast::<BlockHeader>();
        // SAFETY: caller guarantees `base` is valid and aligned.
        unsafe { header.write_volatile(BlockHeader { magic: LIVE, size }) };
        // SAFETY: the block is at least HEADER_SIZE bytes long.
        let user = unsafe { NonNull::new_unchecked(base.as_ptr().add(HEADER_SIZE)) };
        Self { user }
    }

    /// Re-adopt a pointer previously returned by [`into_raw`](Self::into_raw).
    ///
    /// # Safety
    /// `ptr` must have come from `into_raw` on a block of the same heap and
    /// must not have been adopted since. Releasing a block is checked, but
    /// reading its contents through a stale handle is not.
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<u8>) -> Self {
        Self { user: ptr }
    }

    /// Give up ownership and return the pointer to the user data.
    #[inline]
    pub fn into_raw(self) -> NonNull<u8> {
        self.user
    }

    /// Borrowed view of the user pointer.
    #[inline]
    pub(crate) fn raw(&self) -> NonNull<u8> {
        self.user
    }

    /// Pointer to the first user byte.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.user.as_ptr()
    }

    /// Size the block was allocated with.
    #[inline]
    pub fn len(&self) -> usize {
        // SAFETY: a live Allocation always sits right behind its header.
        unsafe { BlockHeader::read(self.user) }.size()
    }

    /// Whether the block holds zero bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The user bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the block owns `len()` initialised-or-caller-written bytes.
        unsafe { core::slice::from_raw_parts(self.user.as_ptr(), self.len()) }
    }

    /// The user bytes, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        // SAFETY: the block is exclusively owned through `&mut self`.
        unsafe { core::slice::from_raw_parts_mut(self.user.as_ptr(), len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(16))]
    struct Scratch([u8; 64]);

    #[test]
    fn test_stamp_records_size() {
        let mut scratch = Scratch([0xAA; 64]);
        let base = NonNull::new(scratch.0.as_mut_ptr()).unwrap();
        let block = unsafe { Allocation::stamp(base, 24) };

        assert_eq!(block.as_ptr() as usize, base.as_ptr() as usize + HEADER_SIZE);
        assert_eq!(block.len(), 24);
        assert!(unsafe { BlockHeader::read(block.user) }.is_live());
    }

    #[test]
    fn test_poison_kills_header() {
        let mut scratch = Scratch([0; 64]);
        let base = NonNull::new(scratch.0.as_mut_ptr()).unwrap();
        let block = unsafe { Allocation::stamp(base, 8) };
        let raw = block.into_raw();

        unsafe { BlockHeader::poison(raw) };
        let header = unsafe { BlockHeader::read(raw) };
        assert!(!header.is_live());
        assert_eq!(header.size(), 8);
    }
}
