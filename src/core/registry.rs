//! Thread registry
//!
//! Every live thread, the idle thread included, is linked into a registry
//! list from creation until its exit code is collected. The registry is
//! purely observational: debuggers and monitor threads walk it to take a
//! census of the system.

use core::ptr::NonNull;

use crate::critical::{critical_section, CriticalSection};
use crate::kernel;
use crate::thread::Tcb;

/// Link a thread into the registry. Lock already held.
pub(crate) fn insert_i(cs: &CriticalSection, mut tcb: NonNull<Tcb>) {
    let state = kernel::state(cs);
    let tcb_ref = unsafe { tcb.as_mut() };

    tcb_ref.reg_prev = None;
    tcb_ref.reg_next = state.reg_head;

    if let Some(mut head) = state.reg_head {
        unsafe { head.as_mut().reg_prev = Some(tcb) };
    }
    state.reg_head = Some(tcb);
}

/// Unlink a thread from the registry. Lock already held.
pub(crate) fn remove_i(cs: &CriticalSection, mut tcb: NonNull<Tcb>) {
    let state = kernel::state(cs);
    let tcb_ref = unsafe { tcb.as_mut() };

    match tcb_ref.reg_prev {
        Some(mut prev) => unsafe { prev.as_mut().reg_next = tcb_ref.reg_next },
        None => state.reg_head = tcb_ref.reg_next,
    }
    if let Some(mut next) = tcb_ref.reg_next {
        unsafe { next.as_mut().reg_prev = tcb_ref.reg_prev };
    }

    tcb_ref.reg_next = None;
    tcb_ref.reg_prev = None;
}

/// Visit every registered thread under the kernel lock.
///
/// The closure must not block or create/terminate threads.
pub fn os_registry_visit<F>(mut f: F)
where
    F: FnMut(&Tcb),
{
    critical_section(|cs| {
        let mut point = kernel::state(cs).reg_head;
        while let Some(p) = point {
            let tcb_ref = unsafe { p.as_ref() };
            f(tcb_ref);
            point = tcb_ref.reg_next;
        }
    });
}

/// Number of registered threads.
pub fn os_registry_count() -> usize {
    let mut n = 0;
    os_registry_visit(|_| n += 1);
    n
}
