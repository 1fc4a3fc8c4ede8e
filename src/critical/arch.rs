//! Platform interrupt masking back-ends.

use core::sync::atomic::{AtomicBool, Ordering};

use super::InterruptControl;

/// AArch64 IRQ masking through `DAIF`.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct Daif;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
impl InterruptControl for Daif {
    type State = u64;

    #[inline]
    fn disable(&self) -> u64 {
        let daif: u64;
        // SAFETY: reading DAIF and setting the I bit is valid at EL1 and has
        // no effect beyond masking IRQs.
        unsafe {
            core::arch::asm!(
                "mrs {d}, daif",
                "msr daifset, #2",
                d = out(reg) daif,
                options(nostack, preserves_flags)
            );
        }
        daif
    }

    #[inline]
    unsafe fn restore(&self, state: u64) {
        // SAFETY: caller hands back a value read from DAIF by `disable`.
        unsafe {
            core::arch::asm!(
                "msr daif, {d}",
                d = in(reg) state,
                options(nostack, preserves_flags)
            );
        }
    }
}

/// Cortex-M interrupt masking through `PRIMASK`.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct Primask;

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl InterruptControl for Primask {
    /// Whether interrupts were enabled before masking.
    type State = bool;

    #[inline]
    fn disable(&self) -> bool {
        let primask: u32;
        // SAFETY: PRIMASK reads and `cpsid i` are valid in privileged mode.
        unsafe {
            core::arch::asm!(
                "mrs {p}, PRIMASK",
                "cpsid i",
                p = out(reg) primask,
                options(nostack, preserves_flags)
            );
        }
        primask & 1 == 0
    }

    #[inline]
    unsafe fn restore(&self, was_enabled: bool) {
        if was_enabled {
            // SAFETY: only re-enables what the matching `disable` masked.
            unsafe { core::arch::asm!("cpsie i", options(nostack, preserves_flags)) };
        }
    }
}

/// Interrupt flag for hosted builds and tests.
///
/// There is no real interrupt source; the flag only records whether code
/// believes it is running with interrupts masked.
#[derive(Debug)]
pub struct SimulatedInterrupts {
    enabled: AtomicBool,
}

impl SimulatedInterrupts {
    /// Start with interrupts enabled.
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    /// Whether interrupts are currently unmasked.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedInterrupts {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptControl for SimulatedInterrupts {
    type State = bool;

    fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::SeqCst)
    }

    unsafe fn restore(&self, state: bool) {
        self.enabled.store(state, Ordering::SeqCst);
    }
}

/// Interrupt control of the build target.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub type Platform = Daif;

/// Interrupt control of the build target.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub type Platform = Primask;

/// Interrupt control of the build target.
///
/// Hosted targets have no interrupts to mask.
#[cfg(not(target_os = "none"))]
pub type Platform = SimulatedInterrupts;

#[cfg(all(
    target_os = "none",
    not(any(target_arch = "aarch64", target_arch = "arm"))
))]
compile_error!("no interrupt masking back-end for this bare-metal architecture");

/// Construct the platform's interrupt control.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub const fn platform() -> Platform {
    Daif
}

/// Construct the platform's interrupt control.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub const fn platform() -> Platform {
    Primask
}

/// Construct the platform's interrupt control.
#[cfg(not(target_os = "none"))]
pub const fn platform() -> Platform {
    SimulatedInterrupts::new()
}
