//! Compile-time configuration.
//!
//! These constants control the behavior and resource limits of the kernel.

use crate::types::{Interval, Prio, StkElement};

/// Number of priority levels. Valid priorities are `0..CFG_PRIO_MAX`,
/// higher value meaning more urgent.
pub const CFG_PRIO_MAX: usize = 64;

/// Priority reserved for the idle thread. Application threads must use
/// priorities strictly above this.
pub const CFG_PRIO_IDLE: Prio = 0;

/// Lowest priority usable by application threads.
pub const CFG_PRIO_LOW: Prio = 1;

/// Highest priority usable by application threads.
pub const CFG_PRIO_HIGH: Prio = (CFG_PRIO_MAX - 1) as Prio;

/// CPU core clock in Hz, used to derive the SysTick reload value.
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// System tick rate in Hz.
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Time quantum, in ticks, granted to a thread before it is rotated behind
/// its equal-priority peers. Only used with the `round-robin` feature.
pub const CFG_TIME_QUANTUM: Interval = 10;

/// Minimum thread stack size in words.
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Idle thread stack size in words.
pub const CFG_IDLE_STK_SIZE: usize = 128;

/// Pattern painted over a thread stack at creation, verified at switch
/// points when the `checks` feature is enabled.
pub const CFG_STACK_FILL: StkElement = 0x5555_5555;

/// Number of painted words inspected by the stack overflow check.
pub const CFG_STACK_GUARD_WORDS: usize = 8;
