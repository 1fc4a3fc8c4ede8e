//! Interrupt Dispatcher
//!
//! Services exactly one pending line per call:
//!
//! 1. Watchdog if pending, else GPIO if pending, else the lowest pending bit
//! 2. A bit without a vector slot is a fault, never skipped
//! 3. The line is acknowledged at the controller *before* its handler runs,
//!    so a re-assertion during the handler shows up as a fresh pending bit
//! 4. A line without a handler is a fault, never called through
//!
//! The dispatcher keeps no state between calls.

use log::trace;

use super::line::{InterruptIndex, PendingMask};
use super::vector::VectorTable;
use crate::fault::Fault;

/// Interrupt controller of the platform.
pub trait InterruptController {
    /// Clear the pending flag of `lines`.
    fn acknowledge(&self, lines: PendingMask);

    /// Allow `lines` to raise interrupts.
    fn unmask(&self, lines: PendingMask);

    /// Stop `lines` from raising interrupts.
    fn mask(&self, lines: PendingMask);
}

/// Pick the line to service next.
///
/// Returns `Ok(None)` for an empty mask.
pub fn decode(mask: PendingMask) -> Result<Option<InterruptIndex>, Fault> {
    if mask.has(InterruptIndex::WATCHDOG) {
        return Ok(Some(InterruptIndex::WATCHDOG));
    }
    if mask.has(InterruptIndex::GPIO) {
        return Ok(Some(InterruptIndex::GPIO));
    }

    let Some(bit) = mask.lowest_bit() else {
        return Ok(None);
    };
    // `bit` is below 32, so the narrowing only drops bits that are
    // rejected anyway.
    match InterruptIndex::new(bit as u8) {
        Some(index) => Ok(Some(index)),
        None => Err(Fault::UnknownSource { bit }),
    }
}

/// Decodes, acknowledges and invokes one interrupt per call.
pub struct Dispatcher<'a, I: InterruptController> {
    table: &'a VectorTable,
    controller: &'a I,
}

impl<'a, I: InterruptController> Dispatcher<'a, I> {
    /// Create a dispatcher over an installed table.
    pub const fn new(table: &'a VectorTable, controller: &'a I) -> Self {
        Self { table, controller }
    }

    /// The table this dispatcher reads.
    pub fn table(&self) -> &'a VectorTable {
        self.table
    }

    /// Service one line of `mask`.
    ///
    /// Returns `mask` with the serviced bit cleared. An empty mask is
    /// returned unchanged without touching the controller.
    pub fn dispatch(&self, mask: PendingMask) -> Result<PendingMask, Fault> {
        let Some(index) = decode(mask)? else {
            return Ok(mask);
        };
        let line = PendingMask::line(index);

        self.controller.acknowledge(line);

        let handler = self
            .table
            .lookup(index)
            .ok_or(Fault::UnregisteredHandler { index: index.get() })?;
        trace!("[IRQ] dispatch {}", index.get());
        handler.invoke();

        Ok(mask - line)
    }
}
