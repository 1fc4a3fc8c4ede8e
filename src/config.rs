//! Platform configuration
//!
//! Compile-time constants shared by the heap front-end and the interrupt
//! dispatcher. Boards that differ from the defaults override them here.

use log::LevelFilter;

/// Number of interrupt vector slots (and valid interrupt indices).
pub const VECTOR_COUNT: usize = 16;

/// Interrupt index of the hardware watchdog. Always serviced first.
pub const WATCHDOG_LINE: u8 = 8;

/// Interrupt index of the GPIO block. Serviced right after the watchdog.
pub const GPIO_LINE: u8 = 4;

/// Alignment guaranteed for every block handed out by the heap front-end.
///
/// Matches C `max_align_t`: 8 bytes on 32-bit targets, 16 on 64-bit ones.
pub const BLOCK_ALIGN: usize = 2 * core::mem::size_of::<usize>();

/// Default size of the heap arena for boards that use a static region.
pub const DEFAULT_HEAP_SIZE: usize = 64 * 1024;

/// Log level used when the console logger is installed without an override.
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;
