//! Synchronous message passing
//!
//! Rendezvous-style messages between threads: the sender blocks until the
//! receiver has picked up the message and answered it. No buffering is
//! involved, the payload travels through the sender's TCB.
//!
//! Protocol: the sender calls [`os_msg_send`] and blocks; the receiver
//! calls [`os_msg_wait`], processes the payload, and unblocks the sender
//! with [`os_msg_release`], passing the reply.

use core::ptr::NonNull;

use crate::critical::{is_isr_context, critical_section, CriticalSection};
use crate::dbg_assert;
use crate::dbg_check;
use crate::debug;
use crate::kernel;
use crate::sched;
use crate::thread::Tcb;
use crate::types::{Msg, ThreadState};

/// Send a message to a thread and wait for the reply.
///
/// Senders queue on the receiver in FIFO order. Blocks without a timeout;
/// the rendezvous always completes once the receiver picks the message up.
pub fn os_msg_send(to: NonNull<Tcb>, msg: Msg) -> Msg {
    dbg_check!(!is_isr_context(), "message send in ISR");

    let cs = CriticalSection::enter();

    let cur = kernel::current_tcb(&cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));
    dbg_check!(to != cur, "sending message to self");

    unsafe { (*cur.as_ptr()).sent_msg = msg };

    let to_ref = unsafe { &mut *to.as_ptr() };
    to_ref.msg_queue.insert(cur);

    if to_ref.state == ThreadState::WtMsg {
        sched::wakeup_i(&cs, to, Msg::Ok);
    }

    sched::sleep_s(cs, ThreadState::SndMsg)
}

/// Wait for a message to arrive.
///
/// Returns the sender's handle and the payload; the sender stays blocked
/// until [`os_msg_release`] is called with its handle.
pub fn os_msg_wait() -> (NonNull<Tcb>, Msg) {
    dbg_check!(!is_isr_context(), "message wait in ISR");

    let cs = CriticalSection::enter();

    let cur = kernel::current_tcb(&cs)
        .unwrap_or_else(|| debug::sys_halt("no current thread"));

    if unsafe { cur.as_ref() }.msg_queue.is_empty() {
        let _ = sched::sleep_s(cs, ThreadState::WtMsg);
    } else {
        drop(cs);
    }

    critical_section(|_cs| {
        let cur_ref = unsafe { &mut *cur.as_ptr() };
        let sender = cur_ref
            .msg_queue
            .pop_front()
            .unwrap_or_else(|| debug::sys_halt("message wakeup without sender"));
        let payload = unsafe { sender.as_ref() }.sent_msg;
        (sender, payload)
    })
}

/// Answer a message, unblocking its sender with `reply`.
pub fn os_msg_release(sender: NonNull<Tcb>, reply: Msg) {
    critical_section(|cs| {
        dbg_assert!(
            unsafe { sender.as_ref() }.state == ThreadState::SndMsg,
            "releasing a thread not sending"
        );
        sched::wakeup_s(cs, sender, reply);
    });
}
