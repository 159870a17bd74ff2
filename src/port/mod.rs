//! Port layer - CPU-specific implementations
//!
//! This module provides the hardware abstraction layer for context
//! switching and other CPU-specific operations.

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::*;

// Stub implementations for non-ARM targets (for testing)
#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use crate::types::{StkElement, ThreadFn};

    pub unsafe fn os_start_first_thread() {
        panic!("os_start_first_thread not available on this platform");
    }

    /// Commit the pending switch so host tests observe coherent state.
    pub fn os_ctx_sw() {
        unsafe {
            let cpu = core::ptr::addr_of_mut!(crate::kernel::CPU_STATE);
            (*cpu).tcb_cur = (*cpu).tcb_high_rdy;
        }
    }

    pub fn os_int_ctx_sw() {
        os_ctx_sw();
    }

    pub unsafe fn os_thread_stk_init(
        _thread_fn: ThreadFn,
        _arg: *mut (),
        stk_base: *mut StkElement,
        stk_size: usize,
    ) -> *mut StkElement {
        // Return top of stack for testing
        unsafe { stk_base.add(stk_size - 1) }
    }

    pub fn os_cpu_systick_init(_cnts: u32) {
        // No-op for testing
    }
}

#[cfg(not(target_arch = "arm"))]
pub use stub::*;
