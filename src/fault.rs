//! Fatal faults
//!
//! Contract violations and unknown hardware events. None of these are
//! recoverable at the point of detection: the dispatcher hands them back to
//! the trap entry, and everything else goes straight to [`fatal`].

use core::fmt;

/// A condition that must stop the current execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A block was released whose header is no longer live.
    DoubleRelease {
        /// Address handed to `release`.
        addr: usize,
    },
    /// A pointer outside the heap arena was handed to `release`.
    ForeignRelease {
        /// Address handed to `release`.
        addr: usize,
    },
    /// The arena guard was requested while already held.
    ReentrantArena,
    /// The arena was given a second memory region.
    ArenaReinitialised,
    /// The arena region cannot hold a single block.
    ArenaTooSmall {
        /// Length of the region handed to `init`.
        len: usize,
    },
    /// The pending mask carried a bit with no vector slot.
    UnknownSource {
        /// Zero-based bit position.
        bit: u32,
    },
    /// A pending line has no registered handler.
    UnregisteredHandler {
        /// Interrupt index of the line.
        index: u8,
    },
    /// A second vector table was installed.
    TableReinstalled,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleRelease { addr } => write!(f, "double release of block {:#x}", addr),
            Self::ForeignRelease { addr } => {
                write!(f, "release of foreign pointer {:#x}", addr)
            }
            Self::ReentrantArena => write!(f, "re-entrant heap arena access"),
            Self::ArenaReinitialised => write!(f, "heap arena initialised twice"),
            Self::ArenaTooSmall { len } => write!(f, "heap region of {} bytes too small", len),
            Self::UnknownSource { bit } => write!(f, "unknown interrupt source bit {}", bit),
            Self::UnregisteredHandler { index } => {
                write!(f, "no handler registered for interrupt {}", index)
            }
            Self::TableReinstalled => write!(f, "vector table installed twice"),
        }
    }
}

/// Fail fast on a fault.
///
/// Logs the fault and panics; the firmware's panic handler decides between
/// halt, reset and diagnostic dump.
#[cold]
#[track_caller]
pub fn fatal(fault: Fault) -> ! {
    log::error!("[FAULT] {}", fault);
    panic!("fatal fault: {}", fault);
}
