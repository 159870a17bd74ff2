//! Thread Control Block (TCB) definition
//!
//! The TCB contains all the information needed to manage a thread.

use core::ptr::NonNull;

use crate::sched::WaitQueue;
use crate::thread::ThreadRef;
use crate::types::{Msg, Prio, StkElement, ThreadState};
use crate::vtimer::VirtualTimer;

#[cfg(feature = "round-robin")]
use crate::types::Interval;

/// Thread Control Block
///
/// The `next`/`prev` links serve both the ready lists and the wait queues:
/// a thread is never in both at once. The embedded timer implements every
/// per-thread timeout (sleeps, timed waits, timed suspends).
#[repr(C)]
pub struct Tcb {
    // ============ Stack pointer ============
    /// Current stack pointer. Must stay the first field: the context switch
    /// code accesses it at offset 0.
    pub stk_ptr: *mut StkElement,

    // ============ Stack information ============
    /// Base of stack
    pub stk_base: *mut StkElement,
    /// Stack size in words
    pub stk_size: usize,

    // ============ Thread identification ============
    /// Thread name
    pub name: &'static str,

    // ============ Queue links ============
    /// Next TCB in ready list or wait queue
    pub next: Option<NonNull<Tcb>>,
    /// Previous TCB in ready list or wait queue
    pub prev: Option<NonNull<Tcb>>,
    /// Wait queue this thread is blocked on, null when not blocked
    pub wait_obj: *mut WaitQueue,
    /// Reference slot this thread is suspended on, null otherwise
    pub wt_ref: *mut ThreadRef,

    // ============ Timeout bookkeeping ============
    /// Per-thread timeout timer
    pub timer: VirtualTimer,

    // ============ Priority ============
    /// Current (possibly inherited) priority
    pub prio: Prio,
    /// Base priority assigned at creation
    pub base_prio: Prio,

    // ============ State ============
    /// Current thread state
    pub state: ThreadState,
    /// Message delivered by the operation that made this thread ready
    pub rdy_msg: Msg,

    // ============ Termination ============
    /// Exit code, valid once the thread reaches `Final`
    pub exit_code: Msg,
    /// Thread blocked in a join on this thread
    pub joiner: Option<NonNull<Tcb>>,
    /// Whether the exit code has been collected
    pub joined: bool,

    // ============ Registry links ============
    /// Next TCB in the thread registry
    pub reg_next: Option<NonNull<Tcb>>,
    /// Previous TCB in the thread registry
    pub reg_prev: Option<NonNull<Tcb>>,

    // ============ Owned mutexes ============
    /// Head of the list of mutexes this thread currently owns, threaded
    /// through each mutex's `next_owned` link. Source of truth for the
    /// priority recomputation at unlock.
    #[cfg(feature = "mutex")]
    pub mtx_list: *mut crate::sync::mutex::Mutex,

    // ============ Time slicing ============
    /// Remaining quantum ticks
    #[cfg(feature = "round-robin")]
    pub quantum: Interval,

    // ============ Synchronous messages ============
    /// Threads that sent this thread a message and await the reply
    #[cfg(feature = "msg")]
    pub msg_queue: WaitQueue,
    /// Payload carried while this thread sits in another's message queue
    #[cfg(feature = "msg")]
    pub sent_msg: Msg,
}

impl Tcb {
    /// Create a new, uninitialized TCB
    pub const fn new() -> Self {
        Tcb {
            stk_ptr: core::ptr::null_mut(),
            stk_base: core::ptr::null_mut(),
            stk_size: 0,

            name: "",

            next: None,
            prev: None,
            wait_obj: core::ptr::null_mut(),
            wt_ref: core::ptr::null_mut(),

            timer: VirtualTimer::new(),

            prio: 0,
            base_prio: 0,

            state: ThreadState::Ready,
            rdy_msg: Msg::Ok,

            exit_code: Msg::Ok,
            joiner: None,
            joined: false,

            reg_next: None,
            reg_prev: None,

            #[cfg(feature = "mutex")]
            mtx_list: core::ptr::null_mut(),

            #[cfg(feature = "round-robin")]
            quantum: 0,

            #[cfg(feature = "msg")]
            msg_queue: WaitQueue::new(),
            #[cfg(feature = "msg")]
            sent_msg: Msg::Ok,
        }
    }

    /// Initialize TCB to default values
    pub fn init(&mut self) {
        *self = Self::new();
    }

    /// Check if thread is in the ready queue
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == ThreadState::Ready
    }

    /// Check if thread is the one currently executing
    #[inline]
    pub fn is_current(&self) -> bool {
        self.state == ThreadState::Current
    }

    /// Check if thread is blocked on a wait queue
    #[inline]
    pub fn is_queued(&self) -> bool {
        matches!(
            self.state,
            ThreadState::WtSem | ThreadState::WtMutex |
            ThreadState::WtMsg | ThreadState::SndMsg |
            ThreadState::WtCond
        )
    }

    /// Check if thread has terminated
    #[inline]
    pub fn is_final(&self) -> bool {
        self.state == ThreadState::Final
    }
}

impl Default for Tcb {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}
