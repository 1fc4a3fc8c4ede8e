//! rtglue - Platform Runtime Glue for Single-Core RTOS Ports
//!
//! Supplies the two pieces of a preemptive embedded scheduler that have to
//! be correct under interrupts:
//!
//! - An interrupt-safe heap front-end shared by tasks, drivers and
//!   interrupt handlers ([`mm`])
//! - The interrupt vector table and the dispatcher that turns a pending
//!   mask into handler calls ([`irq`])
//!
//! # Failure Model
//! - Heap exhaustion is an ordinary `None` result
//! - Contract violations (double release, foreign pointers, re-entrant heap
//!   use) and unknown hardware events are fatal, see [`fault`]
//!
//! # Boot Order
//! 1. [`console::init`] (optional)
//! 2. [`mm::init_heap`] or [`mm::init_default_heap`]
//! 3. Drivers register handlers on an [`irq::VectorTableBuilder`]
//! 4. [`start`] installs the table and unmasks the populated lines
//! 5. The platform enables interrupts and routes its trap vector to
//!    [`irq::TrapEntry::service_or_halt`]

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod console;
pub mod critical;
pub mod fault;
pub mod irq;
pub mod mm;

use log::info;

use irq::{InterruptController, VectorTable, VectorTableBuilder, VECTORS};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Freeze the registered handlers and publish them as the process-wide
/// vector table.
///
/// Call after the heap is up and before interrupts are enabled.
pub fn start<I: InterruptController>(
    handlers: VectorTableBuilder,
    controller: &I,
) -> &'static VectorTable {
    let table = VECTORS.install(handlers.build(), controller);
    info!(
        "[BOOT] rtglue v{}: heap {} KiB, {} interrupt lines",
        VERSION,
        mm::heap_size() / 1024,
        table.populated().bits().count_ones()
    );
    table
}
