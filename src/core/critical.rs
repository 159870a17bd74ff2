//! Critical section handling.
//!
//! Every mutation of shared kernel state happens inside a critical section:
//! interrupts are masked on entry and the previous mask state is restored on
//! exit. The guard value doubles as the type-level "lock held" capability:
//! inner kernel functions with an `_i`/`_s` suffix take `&CriticalSection`
//! instead of acquiring the lock themselves.
//!
//! Locking is non-reentrant by construction. With the `checks` feature a
//! lock depth counter halts the system if the outer [`CriticalSection::enter`]
//! is invoked while the lock is already held.

use core::sync::atomic::{AtomicU8, Ordering};

/// Current lock depth; 0 when the kernel is unlocked.
static LOCK_DEPTH: AtomicU8 = AtomicU8::new(0);

/// RAII guard for critical sections.
///
/// Interrupts are disabled while a guard exists; dropping the guard restores
/// the interrupt state captured at entry.
pub struct CriticalSection {
    restore: bool,
}

impl CriticalSection {
    /// Enters a critical section from thread context.
    ///
    /// Halts if the kernel is already locked (`checks`): code paths that run
    /// with the lock held must use the `_s`/`_i` inner entry points instead.
    #[inline(always)]
    pub fn enter() -> Self {
        let restore = Self::mask_interrupts();

        // Meaningful only where interrupts are actually masked; host test
        // threads each take the lock without excluding one another.
        #[cfg(all(feature = "checks", target_arch = "arm"))]
        if LOCK_DEPTH.fetch_add(1, Ordering::Relaxed) != 0 {
            crate::debug::sys_halt("nested kernel lock");
        }
        #[cfg(not(all(feature = "checks", target_arch = "arm")))]
        LOCK_DEPTH.fetch_add(1, Ordering::Relaxed);

        CriticalSection { restore }
    }

    /// Enters a critical section from an interrupt handler.
    ///
    /// Same effect as [`CriticalSection::enter`]; kept distinct so the
    /// calling-context contract stays visible at the call site, pairing with
    /// the handler's own prologue/epilogue.
    #[inline(always)]
    pub fn enter_from_isr() -> Self {
        Self::enter()
    }

    /// Whether the kernel lock is currently held.
    #[inline(always)]
    pub fn is_active() -> bool {
        LOCK_DEPTH.load(Ordering::Relaxed) != 0
    }

    #[inline(always)]
    fn mask_interrupts() -> bool {
        #[cfg(target_arch = "arm")]
        {
            let was_active = cortex_m::register::primask::read().is_active();
            cortex_m::interrupt::disable();
            was_active
        }

        #[cfg(not(target_arch = "arm"))]
        {
            true
        }
    }

    #[inline(always)]
    fn unmask_interrupts(restore: bool) {
        #[cfg(target_arch = "arm")]
        if restore {
            unsafe { cortex_m::interrupt::enable() };
        }

        #[cfg(not(target_arch = "arm"))]
        {
            let _ = restore;
        }
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        LOCK_DEPTH.fetch_sub(1, Ordering::Relaxed);
        Self::unmask_interrupts(self.restore);
    }
}

/// Executes a closure inside a critical section.
///
/// The closure receives a reference to the guard, which is the capability
/// required by [`CsCell`](crate::core::cs_cell::CsCell) and by the `_i`/`_s`
/// kernel entry points.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Whether the caller is executing in an interrupt handler.
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}
