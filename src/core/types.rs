//! Core type definitions for the kernel.
//!
//! These types provide strong typing for scheduler and timer primitives.

/// Thread priority. Higher value means more urgent; priority 0 is reserved
/// for the idle thread.
pub type Prio = u8;

/// Monotonic tick counter type, wraps at the representation width.
pub type Tick = u32;

/// A time interval expressed in ticks.
pub type Interval = u32;

/// Stack element type.
pub type StkElement = u32;

/// Reserved interval meaning "never": a timer armed with this value is not
/// linked into the timer queue and a wait blocks without a timeout.
pub const TIME_INFINITE: Interval = Interval::MAX;

/// Reserved interval meaning "poll": a wait returns immediately instead of
/// blocking.
pub const TIME_IMMEDIATE: Interval = 0;

/// Thread entry point function type.
///
/// Returning from the entry function terminates the thread with `Msg::Ok`,
/// as if `os_thread_exit` had been called.
pub type ThreadFn = fn(*mut ());

/// Thread state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ThreadState {
    /// In the ready queue, eligible to run.
    Ready = 0,
    /// Currently executing. Not in the ready queue.
    Current = 1,
    /// In a timed sleep, woken only by its own timer.
    Sleeping = 2,
    /// Blocked on a thread reference slot, with or without timeout.
    Suspended = 3,
    /// Blocked on a semaphore wait queue.
    WtSem = 4,
    /// Blocked on a mutex wait queue.
    WtMutex = 5,
    /// Waiting for a synchronous message to arrive.
    WtMsg = 6,
    /// Sent a synchronous message, waiting for the reply.
    SndMsg = 7,
    /// Blocked on a condition variable.
    WtCond = 8,
    /// Blocked in a join waiting for the target to terminate.
    WtExit = 9,
    /// Terminated. Exit code available to the joiner.
    Final = 10,
}

/// Wakeup/status message passed to a thread when it is made ready again.
///
/// Every blocking operation resolves to one of these; callers branch on the
/// value instead of unwinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Msg {
    /// The wait was satisfied normally.
    Ok,
    /// The timeout elapsed before the wait was satisfied.
    Timeout,
    /// The wait was aborted by a reset of the kernel object.
    Reset,
    /// A caller-supplied payload (resume message, message reply, exit code).
    Data(usize),
}

impl Msg {
    /// True when the wait completed normally.
    #[inline]
    pub fn is_ok(self) -> bool {
        self == Msg::Ok
    }

    /// True when the wait was cut short by its timeout.
    #[inline]
    pub fn is_timeout(self) -> bool {
        self == Msg::Timeout
    }
}
