//! Preemptive real-time kernel for ARM Cortex-M
//!
//! A compact RTOS kernel providing:
//! - Priority-based preemptive scheduling with optional round-robin
//! - Virtual timers on an ordered delta list
//! - Thread lifecycle with join and suspend/resume references
//! - Synchronization primitives (semaphores, mutexes, condition
//!   variables, messages)
//! - Context switching for ARM Cortex-M via PendSV

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
extern crate std;

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use core::config;
pub use core::config::*;
pub use core::critical;
pub use core::debug;
pub use core::error;
pub use core::error::{OsError, OsResult};
pub use core::kernel;
pub use core::kernel::{os_init, os_int_enter, os_int_exit, os_start};
pub use core::registry;
pub use core::registry::{os_registry_count, os_registry_visit};
pub use core::sched;
pub use core::thread;
pub use core::thread::{
    os_thread_create, os_thread_exit, os_thread_join, os_thread_resume,
    os_thread_resume_i, os_thread_sleep, os_thread_sleep_until,
    os_thread_sleep_until_windowed, os_thread_suspend, os_thread_yield,
    Tcb, ThreadRef,
};
pub use core::time;
pub use core::types;
pub use core::types::*;
pub use core::vtimer;
pub use core::vtimer::VirtualTimer;

#[cfg(feature = "sem")]
pub use sync::sem;
#[cfg(feature = "sem")]
pub use sync::sem::Semaphore;

#[cfg(feature = "mutex")]
pub use sync::mutex;
#[cfg(feature = "mutex")]
pub use sync::mutex::Mutex;

#[cfg(feature = "condvar")]
pub use sync::condvar;
#[cfg(feature = "condvar")]
pub use sync::condvar::Condvar;

#[cfg(feature = "msg")]
pub use sync::msg;
#[cfg(feature = "msg")]
pub use sync::msg::{os_msg_release, os_msg_send, os_msg_wait};

#[cfg(feature = "hal")]
pub use stm32f4xx_hal as hal;
