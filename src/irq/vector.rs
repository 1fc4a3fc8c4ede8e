//! Interrupt Vector Table
//!
//! A fixed array of [`VECTOR_COUNT`] slots, each optionally holding a
//! [`Handler`].
//!
//! # Lifecycle
//! - Driver setup code fills a [`VectorTableBuilder`]
//! - `build()` consumes the builder and yields an immutable [`VectorTable`]
//! - The table is installed before interrupts are enabled and never changes
//!   again, so the dispatcher can read it without locking

use core::fmt;

use log::debug;

use super::line::{InterruptIndex, PendingMask};
use crate::config::VECTOR_COUNT;

/// An interrupt service routine.
///
/// Runs on the interrupt context: it must not block and should finish
/// quickly, handing longer work to a task.
pub trait Handler: Sync {
    /// Service the interrupt.
    fn invoke(&self);
}

impl Handler for fn() {
    #[inline]
    fn invoke(&self) {
        self()
    }
}

/// Contents of a populated slot.
#[derive(Clone, Copy)]
enum Vector {
    Function(fn()),
    Object(&'static dyn Handler),
}

impl Handler for Vector {
    #[inline]
    fn invoke(&self) {
        match self {
            Self::Function(f) => f(),
            Self::Object(handler) => handler.invoke(),
        }
    }
}

/// Error type for vector registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorError {
    /// The index has no vector slot.
    IndexOutOfRange {
        /// Index that was passed in.
        index: u8,
    },
}

impl fmt::Display for VectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange { index } => {
                write!(f, "interrupt index {} out of range 0..{}", index, VECTOR_COUNT)
            }
        }
    }
}

/// Mutable table used while drivers register their handlers.
pub struct VectorTableBuilder {
    slots: [Option<Vector>; VECTOR_COUNT],
}

impl VectorTableBuilder {
    /// Create a builder with every slot empty.
    pub const fn new() -> Self {
        Self {
            slots: [None; VECTOR_COUNT],
        }
    }

    /// Store `handler` at `index`. The last registration for an index wins.
    pub fn register(&mut self, index: u8, handler: &'static dyn Handler) -> Result<(), VectorError> {
        self.insert(index, Vector::Object(handler))
    }

    /// Store a plain function at `index`. The last registration for an
    /// index wins.
    pub fn attach(&mut self, index: u8, handler: fn()) -> Result<(), VectorError> {
        self.insert(index, Vector::Function(handler))
    }

    fn insert(&mut self, index: u8, vector: Vector) -> Result<(), VectorError> {
        let line = InterruptIndex::new(index).ok_or(VectorError::IndexOutOfRange { index })?;
        if self.slots[line.slot()].replace(vector).is_some() {
            debug!("[IRQ] vector {} replaced", index);
        } else {
            debug!("[IRQ] vector {} registered", index);
        }
        Ok(())
    }

    /// Freeze the table.
    pub const fn build(self) -> VectorTable {
        VectorTable { slots: self.slots }
    }
}

impl Default for VectorTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable table read by the dispatcher.
pub struct VectorTable {
    slots: [Option<Vector>; VECTOR_COUNT],
}

impl VectorTable {
    /// A table with no handlers.
    pub const fn empty() -> Self {
        VectorTableBuilder::new().build()
    }

    /// Handler registered at `index`, if any.
    #[inline]
    pub fn lookup(&self, index: InterruptIndex) -> Option<&dyn Handler> {
        self.slots[index.slot()].as_ref().map(|vector| vector as &dyn Handler)
    }

    /// Lines that have a handler and may therefore be unmasked.
    pub fn populated(&self) -> PendingMask {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .fold(PendingMask::empty(), |mask, (i, _)| {
                mask | PendingMask::from_bits_retain(1 << i)
            })
    }
}

impl fmt::Debug for VectorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorTable")
            .field("populated", &self.populated())
            .finish()
    }
}
