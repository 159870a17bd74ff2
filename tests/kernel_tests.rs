//! Unit tests for core kernel modules
//!
//! These tests run on the host (not the embedded target) to verify the
//! core scheduling and queueing algorithms.

use core::ptr::NonNull;

use parvos::sched::{ReadyQueue, WaitQueue};
use parvos::thread::Tcb;

fn make_tcb(prio: u8) -> NonNull<Tcb> {
    let tcb = Box::leak(Box::new(Tcb::new()));
    tcb.prio = prio;
    tcb.base_prio = prio;
    NonNull::from(tcb)
}

#[cfg(test)]
mod rdy_queue_tests {
    use super::*;

    #[test]
    fn test_empty_queue() {
        let mut q = ReadyQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.first_prio(), None);
        assert!(q.pop_highest().is_none());
    }

    #[test]
    fn test_highest_priority_wins() {
        let mut q = ReadyQueue::new();
        let low = make_tcb(3);
        let mid = make_tcb(17);
        let high = make_tcb(42);

        unsafe {
            q.insert_behind(mid);
            q.insert_behind(high);
            q.insert_behind(low);
        }

        assert_eq!(q.first_prio(), Some(42));
        assert_eq!(q.pop_highest(), Some(high));
        assert_eq!(q.pop_highest(), Some(mid));
        assert_eq!(q.pop_highest(), Some(low));
        assert!(q.is_empty());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut q = ReadyQueue::new();
        let a = make_tcb(10);
        let b = make_tcb(10);
        let c = make_tcb(10);

        unsafe {
            q.insert_behind(a);
            q.insert_behind(b);
            q.insert_behind(c);
        }

        assert_eq!(q.pop_highest(), Some(a));
        assert_eq!(q.pop_highest(), Some(b));
        assert_eq!(q.pop_highest(), Some(c));
    }

    #[test]
    fn test_insert_ahead_preempts_fifo() {
        let mut q = ReadyQueue::new();
        let a = make_tcb(10);
        let b = make_tcb(10);
        let preempted = make_tcb(10);

        unsafe {
            q.insert_behind(a);
            q.insert_behind(b);
            q.insert_ahead(preempted);
        }

        assert_eq!(q.pop_highest(), Some(preempted));
        assert_eq!(q.pop_highest(), Some(a));
        assert_eq!(q.pop_highest(), Some(b));
    }

    #[test]
    fn test_remove_clears_level() {
        let mut q = ReadyQueue::new();
        let a = make_tcb(20);
        let b = make_tcb(5);

        unsafe {
            q.insert_behind(a);
            q.insert_behind(b);
            q.remove(a);
        }

        assert_eq!(q.first_prio(), Some(5));
        assert_eq!(q.pop_highest(), Some(b));
        assert!(q.is_empty());
    }

    #[test]
    fn test_change_prio_requeues() {
        let mut q = ReadyQueue::new();
        let owner = make_tcb(5);
        let other = make_tcb(10);

        unsafe {
            q.insert_behind(owner);
            q.insert_behind(other);

            // Boosted above the competitor.
            q.change_prio(owner, 30);
        }

        assert_eq!(unsafe { owner.as_ref() }.prio, 30);
        assert_eq!(q.first_prio(), Some(30));
        assert_eq!(q.pop_highest(), Some(owner));
        assert_eq!(q.pop_highest(), Some(other));
    }
}

#[cfg(test)]
mod wait_queue_tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = WaitQueue::new();
        let a = make_tcb(30);
        let b = make_tcb(10);
        let c = make_tcb(20);

        q.insert(a);
        q.insert(b);
        q.insert(c);

        // FIFO ignores priority.
        assert_eq!(q.pop_front(), Some(a));
        assert_eq!(q.pop_front(), Some(b));
        assert_eq!(q.pop_front(), Some(c));
        assert_eq!(q.pop_front(), None);
    }

    #[test]
    fn test_priority_order() {
        let mut q = WaitQueue::new();
        let low = make_tcb(4);
        let high = make_tcb(40);
        let mid_first = make_tcb(20);
        let mid_second = make_tcb(20);

        q.insert_by_prio(mid_first);
        q.insert_by_prio(low);
        q.insert_by_prio(high);
        q.insert_by_prio(mid_second);

        assert_eq!(q.pop_front(), Some(high));
        // FIFO among equals.
        assert_eq!(q.pop_front(), Some(mid_first));
        assert_eq!(q.pop_front(), Some(mid_second));
        assert_eq!(q.pop_front(), Some(low));
    }

    #[test]
    fn test_back_pointer_tracks_membership() {
        let mut q = WaitQueue::new();
        let a = make_tcb(7);

        q.insert(a);
        assert_eq!(
            unsafe { a.as_ref() }.wait_obj,
            &mut q as *mut WaitQueue
        );

        q.remove(a);
        assert!(unsafe { a.as_ref() }.wait_obj.is_null());
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_from_middle() {
        let mut q = WaitQueue::new();
        let a = make_tcb(1);
        let b = make_tcb(2);
        let c = make_tcb(3);

        q.insert(a);
        q.insert(b);
        q.insert(c);

        q.remove(b);

        assert_eq!(q.pop_front(), Some(a));
        assert_eq!(q.pop_front(), Some(c));
        assert_eq!(q.pop_front(), None);
    }
}

// Keep this the only module touching global kernel state; the harness runs
// tests in parallel and the other modules work on local instances.
//
// On the host there is no real context switch: a switch just repoints the
// current-thread pointer and execution continues on the caller's stack.
// Scenarios exploit this to drive block/wake sequences from a single test
// thread, repointing the current thread between steps.
#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use parvos::registry;
    use parvos::types::{Msg, StkElement, ThreadState, TIME_IMMEDIATE, TIME_INFINITE};
    use parvos::{os_init, os_thread_create, Condvar, Mutex, Semaphore};

    fn worker_entry(_: *mut ()) {}

    fn set_current(tcb: NonNull<Tcb>) {
        unsafe {
            (*core::ptr::addr_of_mut!(parvos::kernel::CPU_STATE)).tcb_cur = tcb.as_ptr();
        }
    }

    fn current() -> *mut Tcb {
        unsafe { (*core::ptr::addr_of!(parvos::kernel::CPU_STATE)).tcb_cur }
    }

    #[test]
    fn test_kernel_scenarios() {
        init_and_registry();
        sem_hand_off();
        mutex_unlock_picks_most_urgent();
        condvar_wait_and_signal();
    }

    fn init_and_registry() {
        assert!(os_init().is_ok());

        // Only the idle thread exists after init.
        assert_eq!(registry::os_registry_count(), 1);

        let worker_tcb = Box::leak(Box::new(Tcb::new()));
        let worker_stk = Box::leak(Box::new([0 as StkElement; 128]));
        let handle = os_thread_create(
            worker_tcb,
            worker_stk,
            "worker",
            worker_entry,
            core::ptr::null_mut(),
            12,
        );

        assert_eq!(registry::os_registry_count(), 2);
        assert_eq!(unsafe { handle.as_ref() }.state, ThreadState::Ready);
        assert_eq!(unsafe { handle.as_ref() }.prio, 12);

        let mut names = Vec::new();
        registry::os_registry_visit(|t| names.push(t.name));
        assert!(names.contains(&"idle"));
        assert!(names.contains(&"worker"));
    }

    fn sem_hand_off() {
        assert!(os_init().is_ok());

        let sem = Semaphore::new(0);

        // The waiter blocks on the empty semaphore; the switch hands the
        // processor to the idle thread.
        let waiter = make_tcb(20);
        unsafe { (*waiter.as_ptr()).state = ThreadState::Current };
        set_current(waiter);
        let _ = sem.wait(5);
        assert_eq!(unsafe { waiter.as_ref() }.state, ThreadState::WtSem);
        assert_ne!(current(), waiter.as_ptr());

        // A signal from the less urgent idle thread hands the unit over and
        // switches to the waiter at once.
        unsafe { (*waiter.as_ptr()).rdy_msg = Msg::Reset };
        sem.signal();
        assert_eq!(current(), waiter.as_ptr());
        assert_eq!(unsafe { waiter.as_ref() }.state, ThreadState::Current);
        assert_eq!(unsafe { waiter.as_ref() }.rdy_msg, Msg::Ok);
        assert_eq!(sem.count(), 0);
    }

    // A released mutex waiter must compete with the rest of the ready
    // queue: with a more urgent third thread ready, unlock switches to
    // that thread, not to the waiter.
    fn mutex_unlock_picks_most_urgent() {
        assert!(os_init().is_ok());

        let m = Mutex::new();

        let low = make_tcb(10);
        unsafe { (*low.as_ptr()).state = ThreadState::Current };
        set_current(low);
        assert_eq!(m.lock(TIME_IMMEDIATE), Msg::Ok);

        // A prio-15 thread blocks on the mutex, boosting the owner.
        let high = make_tcb(15);
        unsafe { (*high.as_ptr()).state = ThreadState::Current };
        set_current(high);
        let _ = m.lock(50);
        assert_eq!(unsafe { high.as_ref() }.state, ThreadState::WtMutex);
        assert_eq!(unsafe { low.as_ref() }.prio, 15);

        // A prio-30 thread enters the ready queue.
        let mid_tcb = Box::leak(Box::new(Tcb::new()));
        let mid_stk = Box::leak(Box::new([0 as StkElement; 128]));
        let mid = os_thread_create(
            mid_tcb,
            mid_stk,
            "mid",
            worker_entry,
            core::ptr::null_mut(),
            30,
        );

        // The owner releases: the boost drops, the waiter is readied with
        // ownership, and the reschedule picks the prio-30 thread.
        set_current(low);
        m.unlock();
        assert_eq!(current(), mid.as_ptr());
        assert_eq!(unsafe { high.as_ref() }.state, ThreadState::Ready);
        assert_eq!(unsafe { high.as_ref() }.rdy_msg, Msg::Ok);
        assert_eq!(unsafe { low.as_ref() }.prio, 10);
        assert_eq!(m.owner_prio(), Some(15));
    }

    fn condvar_wait_and_signal() {
        assert!(os_init().is_ok());

        let m = Mutex::new();
        let cv = Condvar::new();

        let waiter = make_tcb(20);
        unsafe { (*waiter.as_ptr()).state = ThreadState::Current };
        set_current(waiter);
        assert_eq!(m.lock(TIME_IMMEDIATE), Msg::Ok);

        // Pre-store the verdict the wait collects after the switch; the
        // timeout path must leave the mutex unlocked.
        unsafe { (*waiter.as_ptr()).rdy_msg = Msg::Timeout };
        assert_eq!(cv.wait(&m, TIME_INFINITE), Msg::Timeout);
        assert_eq!(unsafe { waiter.as_ref() }.state, ThreadState::WtCond);
        assert!(!m.is_owned());
        assert!(cv.has_waiters());

        // A signal from the idle thread wakes the more urgent waiter and
        // switches to it.
        cv.signal();
        assert_eq!(current(), waiter.as_ptr());
        assert_eq!(unsafe { waiter.as_ref() }.state, ThreadState::Current);
        assert_eq!(unsafe { waiter.as_ref() }.rdy_msg, Msg::Ok);
        assert!(!cv.has_waiters());
    }
}

#[cfg(test)]
mod time_tests {
    use parvos::time;

    #[test]
    fn test_wrapping_arithmetic() {
        let near_wrap = u32::MAX - 2;
        let later = time::time_add(near_wrap, 10);
        assert_eq!(later, 7);
        assert_eq!(time::time_diff(near_wrap, later), 10);
    }

    #[test]
    fn test_window_membership() {
        assert!(time::is_in_range(100, 100, 200));
        assert!(time::is_in_range(199, 100, 200));
        assert!(!time::is_in_range(200, 100, 200));
        assert!(!time::is_in_range(99, 100, 200));

        // Window across the wrap point.
        let start = u32::MAX - 5;
        assert!(time::is_in_range(2, start, 5));
        assert!(!time::is_in_range(5, start, 5));

        // Empty window contains nothing, not even its start.
        assert!(!time::is_in_range(100, 100, 100));
    }
}

#[cfg(test)]
mod types_tests {
    use parvos::types::*;

    #[test]
    fn test_msg_predicates() {
        assert!(Msg::Ok.is_ok());
        assert!(!Msg::Ok.is_timeout());
        assert!(Msg::Timeout.is_timeout());
        assert!(!Msg::Reset.is_ok());
        assert_eq!(Msg::Data(7), Msg::Data(7));
        assert_ne!(Msg::Data(7), Msg::Data(8));
    }

    #[test]
    fn test_thread_state_enum() {
        assert_eq!(ThreadState::Ready, ThreadState::Ready);
        assert_ne!(ThreadState::Ready, ThreadState::Current);
        assert_ne!(ThreadState::WtSem, ThreadState::WtMutex);
    }

    #[test]
    fn test_reserved_intervals() {
        assert_ne!(TIME_INFINITE, TIME_IMMEDIATE);
        assert_eq!(TIME_IMMEDIATE, 0);
        assert_eq!(TIME_INFINITE, u32::MAX);
    }
}

#[cfg(test)]
mod config_tests {
    use parvos::config::*;

    #[test]
    fn test_config_values() {
        assert!(CFG_PRIO_MAX >= 8, "Need at least 8 priority levels");
        assert!(CFG_PRIO_MAX <= 256, "Too many priority levels");

        assert!(CFG_STK_SIZE_MIN >= 32, "Stack too small");

        assert!(CFG_TICK_RATE_HZ >= 10, "Tick rate too slow");
        assert!(CFG_TICK_RATE_HZ <= 10000, "Tick rate too fast");

        // Idle priority is the least urgent level.
        assert_eq!(CFG_PRIO_IDLE, 0);
        assert!(CFG_PRIO_LOW > CFG_PRIO_IDLE);
        assert!((CFG_PRIO_HIGH as usize) < CFG_PRIO_MAX);

        #[cfg(feature = "round-robin")]
        assert!(CFG_TIME_QUANTUM > 0);
    }
}
