//! Time representation and the system tick entry point.
//!
//! The time base is a monotonic tick counter that wraps at the width of
//! [`Tick`]. All comparisons are wraparound tolerant: intervals are computed
//! in modular arithmetic and window membership uses the half-open circular
//! interval test.

use crate::critical::CriticalSection;
use crate::kernel;
use crate::types::{Interval, Tick};

/// Returns the current monotonic tick value.
#[inline]
pub fn now() -> Tick {
    kernel::KERNEL.tick_get()
}

/// Adds an interval to a time value, wrapping.
#[inline]
pub const fn time_add(time: Tick, interval: Interval) -> Tick {
    time.wrapping_add(interval)
}

/// Number of ticks from `start` to `end`, wrapping.
#[inline]
pub const fn time_diff(start: Tick, end: Tick) -> Interval {
    end.wrapping_sub(start)
}

/// Whether `value` lies in the half-open circular interval `[start, end)`.
///
/// `start == end` denotes the empty interval and yields false for every
/// `value`, including `value == start`.
#[inline]
pub const fn is_in_range(value: Tick, start: Tick, end: Tick) -> bool {
    value.wrapping_sub(start) < end.wrapping_sub(start)
}

/// Kernel tick handler.
///
/// Invoked once per hardware tick interrupt: advances the tick counter,
/// drives the virtual timer queue and performs round-robin quantum
/// accounting. Preemption, if required, is requested by the interrupt
/// epilogue in [`kernel::os_int_exit`].
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    kernel::os_int_enter();

    kernel::KERNEL.tick_increment();

    {
        let cs = CriticalSection::enter_from_isr();
        crate::vtimer::tick_i(&cs);
        #[cfg(feature = "round-robin")]
        crate::sched::quantum_tick_i(&cs);
    }

    kernel::os_int_exit();
}

/// SysTick interrupt handler.
#[cfg(target_arch = "arm")]
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_handler();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_interval_is_always_false() {
        assert!(!is_in_range(0, 5, 5));
        assert!(!is_in_range(5, 5, 5));
        assert!(!is_in_range(u32::MAX, 5, 5));
    }

    #[test]
    fn start_is_inside_nonempty_interval() {
        assert!(is_in_range(5, 5, 6));
        assert!(is_in_range(5, 5, 1000));
        assert!(is_in_range(u32::MAX, u32::MAX, 3));
    }

    #[test]
    fn end_is_outside() {
        assert!(!is_in_range(10, 5, 10));
        assert!(!is_in_range(4, 5, 10));
    }

    #[test]
    fn wraparound_window() {
        // Window stretching across the wrap point.
        let start = u32::MAX - 10;
        let end = 10u32;
        assert!(is_in_range(u32::MAX, start, end));
        assert!(is_in_range(0, start, end));
        assert!(is_in_range(9, start, end));
        assert!(!is_in_range(10, start, end));
        assert!(!is_in_range(start.wrapping_sub(1), start, end));
    }

    #[test]
    fn diff_and_add_are_inverse() {
        let t = u32::MAX - 3;
        let later = time_add(t, 10);
        assert_eq!(later, 6);
        assert_eq!(time_diff(t, later), 10);
    }
}
