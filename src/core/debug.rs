//! Fail-fast checks for programming errors.
//!
//! Usage violations (invalid priority, nested locking, joining self) leave
//! the kernel in an undefined state, so they are never reported as
//! recoverable errors: the system halts deterministically with a diagnostic
//! message. All checks compile away when the `checks` feature is disabled.

/// Halts the system with a diagnostic message.
///
/// This is the terminal path for every detected usage violation. It never
/// returns; on target the panic is routed to the configured panic handler.
pub fn sys_halt(reason: &'static str) -> ! {
    crate::error!("kernel halt: {}", reason);
    panic!("kernel halt: {}", reason);
}

/// Checks an API precondition, halting on violation.
///
/// Mirrors the convention that parameter checks are on the public entry
/// points while `dbg_assert!` guards internal state invariants.
#[cfg(feature = "checks")]
#[macro_export]
macro_rules! dbg_check {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            $crate::debug::sys_halt($msg);
        }
    };
}

/// Asserts an internal invariant, halting on violation.
#[cfg(feature = "checks")]
#[macro_export]
macro_rules! dbg_assert {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            $crate::debug::sys_halt($msg);
        }
    };
}

#[cfg(not(feature = "checks"))]
#[macro_export]
macro_rules! dbg_check {
    ($cond:expr, $msg:expr) => {
        let _ = &$cond;
    };
}

#[cfg(not(feature = "checks"))]
#[macro_export]
macro_rules! dbg_assert {
    ($cond:expr, $msg:expr) => {
        let _ = &$cond;
    };
}
