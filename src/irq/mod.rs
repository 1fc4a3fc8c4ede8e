//! Interrupt Handling
//!
//! Maps hardware interrupt lines to handlers and services them one at a
//! time.
//!
//! # Flow
//! ```text
//! peripheral asserts line ─▶ CPU traps ─▶ TrapEntry::service(mask)
//!                                            │
//!                          ┌─────────────────┘
//!                          ▼
//!        Dispatcher::dispatch: decode ─▶ acknowledge ─▶ handler.invoke()
//!                          │
//!                          └─▶ mask with serviced bit cleared, loop
//! ```
//!
//! # Priority
//! Watchdog first, GPIO second, then ascending line number. No aging.

pub mod dispatch;
pub mod line;
pub mod trap;
pub mod vector;

pub use dispatch::{decode, Dispatcher, InterruptController};
pub use line::{InterruptIndex, PendingMask};
pub use trap::{InstalledTable, ServiceReport, TrapEntry, VECTORS};
pub use vector::{Handler, VectorError, VectorTable, VectorTableBuilder};
