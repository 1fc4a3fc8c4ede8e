//! Trap Entry
//!
//! The platform's interrupt vector calls [`TrapEntry::service`] with the
//! pending mask read from the controller. Lines are dispatched one at a time
//! until nothing is left, with at most [`VECTOR_COUNT`] dispatches per trap,
//! so even an all-ones mask finishes in bounded time.
//!
//! # Installation
//! The vector table is published once through an [`InstalledTable`]; doing
//! so unmasks exactly the lines that have a handler, so no line without a
//! handler can become pending.

use core::sync::atomic::{AtomicBool, Ordering};

use log::info;
use spin::Once;

use super::dispatch::{Dispatcher, InterruptController};
use super::line::PendingMask;
use super::vector::VectorTable;
use crate::config::VECTOR_COUNT;
use crate::fault::{self, Fault};

/// Outcome of one trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceReport {
    /// Number of handlers invoked.
    pub serviced: usize,
    /// Lines still pending when the dispatch budget ran out.
    pub remaining: PendingMask,
}

/// Interrupt entry point for the platform trap handler.
pub struct TrapEntry<'a, I: InterruptController> {
    dispatcher: Dispatcher<'a, I>,
    active: AtomicBool,
}

impl<'a, I: InterruptController> TrapEntry<'a, I> {
    /// Create an entry point over an installed table.
    pub const fn new(table: &'a VectorTable, controller: &'a I) -> Self {
        Self {
            dispatcher: Dispatcher::new(table, controller),
            active: AtomicBool::new(false),
        }
    }

    /// Whether execution is currently inside [`service`](Self::service).
    ///
    /// Code shared between tasks and handlers uses this to avoid blocking
    /// calls on the interrupt context.
    #[inline]
    pub fn in_isr(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Dispatch every line of `mask`.
    ///
    /// Stops at the first fault; the caller decides the system response.
    pub fn service(&self, mut mask: PendingMask) -> Result<ServiceReport, Fault> {
        let _context = IsrContext::enter(&self.active);
        let mut serviced = 0;

        while !mask.is_empty() && serviced < VECTOR_COUNT {
            mask = self.dispatcher.dispatch(mask)?;
            serviced += 1;
        }

        Ok(ServiceReport {
            serviced,
            remaining: mask,
        })
    }

    /// Dispatch a raw pending word and return what is left.
    ///
    /// Faults are fatal.
    pub fn service_or_halt(&self, pending: u32) -> u32 {
        match self.service(PendingMask::from_bits_retain(pending)) {
            Ok(report) => report.remaining.bits(),
            Err(fault) => fault::fatal(fault),
        }
    }
}

/// Marks the interrupt context for the lifetime of the guard.
struct IsrContext<'f> {
    flag: &'f AtomicBool,
    previous: bool,
}

impl<'f> IsrContext<'f> {
    fn enter(flag: &'f AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::SeqCst);
        Self { flag, previous }
    }
}

impl Drop for IsrContext<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}

/// Write-once home of the vector table.
pub struct InstalledTable {
    table: Once<VectorTable>,
}

impl InstalledTable {
    /// An empty home.
    pub const fn new() -> Self {
        Self { table: Once::new() }
    }

    /// Publish `table` and unmask its populated lines.
    ///
    /// Call before enabling interrupts.
    ///
    /// # Panics
    /// Fatal if a table was already installed.
    pub fn install<I: InterruptController>(&self, table: VectorTable, controller: &I) -> &VectorTable {
        let mut fresh = false;
        let installed = self.table.call_once(|| {
            fresh = true;
            table
        });
        if !fresh {
            fault::fatal(Fault::TableReinstalled);
        }

        let lines = installed.populated();
        controller.unmask(lines);
        info!("[IRQ] vector table installed, lines {:#06x}", lines.bits());
        installed
    }

    /// The installed table, if any.
    pub fn get(&self) -> Option<&VectorTable> {
        self.table.get()
    }
}

impl Default for InstalledTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide vector table.
pub static VECTORS: InstalledTable = InstalledTable::new();
