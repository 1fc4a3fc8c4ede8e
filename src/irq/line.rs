//! Interrupt Lines
//!
//! [`InterruptIndex`] names one of the vector slots; [`PendingMask`] is the
//! raw word the interrupt controller reports, one bit per line.

use bitflags::bitflags;

use crate::config::{GPIO_LINE, VECTOR_COUNT, WATCHDOG_LINE};

/// Index of an interrupt vector slot.
///
/// Always below [`VECTOR_COUNT`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(transparent)]
pub struct InterruptIndex(u8);

impl InterruptIndex {
    /// SPI controller.
    pub const SPI: Self = Self(2);
    /// GPIO block. Serviced before every line but the watchdog.
    pub const GPIO: Self = Self(GPIO_LINE);
    /// UART.
    pub const UART: Self = Self(5);
    /// Wi-Fi MAC.
    pub const MAC: Self = Self(6);
    /// Software interrupt used for context switches.
    pub const SOFT: Self = Self(7);
    /// Hardware watchdog. Always serviced first.
    pub const WATCHDOG: Self = Self(WATCHDOG_LINE);
    /// Free-running timer 1.
    pub const TIMER1: Self = Self(9);

    /// Create an index.
    ///
    /// Returns None if `index` has no vector slot.
    #[inline]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < VECTOR_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// The index value.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// The index as a slot position.
    #[inline]
    pub const fn slot(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Pending (asserted and enabled) interrupt lines.
    ///
    /// Bits at or above [`VECTOR_COUNT`] never correspond to a vector slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PendingMask: u32 {
        const SPI = 1 << 2;
        const GPIO = 1 << GPIO_LINE;
        const UART = 1 << 5;
        const MAC = 1 << 6;
        const SOFT = 1 << 7;
        const WATCHDOG = 1 << WATCHDOG_LINE;
        const TIMER1 = 1 << 9;

        // Hardware may report any bit.
        const _ = !0;
    }
}

impl PendingMask {
    /// The mask with only `index` set.
    #[inline]
    pub const fn line(index: InterruptIndex) -> Self {
        Self::from_bits_retain(1 << index.get())
    }

    /// Whether `index` is pending.
    #[inline]
    pub const fn has(self, index: InterruptIndex) -> bool {
        self.bits() & (1 << index.get()) != 0
    }

    /// Zero-based position of the lowest pending bit (find-first-set - 1).
    #[inline]
    pub const fn lowest_bit(self) -> Option<u32> {
        if self.bits() == 0 {
            None
        } else {
            Some(self.bits().trailing_zeros())
        }
    }
}
