//! Global kernel state and initialization
//!
//! This module manages the global OS state including initialization,
//! starting the scheduler, interrupt prologue/epilogue bookkeeping and the
//! accessors other modules use to reach the shared scheduler structures.

use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::config::{
    CFG_CPU_CLOCK_HZ, CFG_IDLE_STK_SIZE, CFG_PRIO_IDLE, CFG_TICK_RATE_HZ,
};
use crate::critical::{critical_section, CriticalSection};
use crate::core::cs_cell::CsCell;
use crate::error::{OsError, OsResult};
use crate::sched::{self, ReadyQueue};
use crate::thread::Tcb;
use crate::types::{StkElement, ThreadState, Tick};
use crate::vtimer::TimerQueue;

// ============ Kernel State Structures ============

/// Atomic kernel flags
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    int_nesting: AtomicU8,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            int_nesting: AtomicU8::new(0),
            tick_counter: AtomicU32::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.int_nesting.store(0, Ordering::SeqCst);
        self.tick_counter.store(0, Ordering::SeqCst);
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> Tick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    /// Get interrupt nesting level
    #[inline(always)]
    pub fn int_nesting(&self) -> u8 {
        self.int_nesting.load(Ordering::Relaxed)
    }

    /// Increment and return tick count
    #[inline(always)]
    pub(crate) fn tick_increment(&self) -> Tick {
        self.tick_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }

    /// Enter ISR bookkeeping
    #[inline(always)]
    pub(crate) fn int_enter(&self) {
        if self.is_running() {
            let nesting = self.int_nesting.fetch_add(1, Ordering::Relaxed);
            if nesting == u8::MAX - 1 {
                self.int_nesting.store(u8::MAX - 1, Ordering::Relaxed);
            }
        }
    }

    /// Decrement int nesting, saturating at zero
    #[inline(always)]
    pub(crate) fn int_nesting_dec(&self) -> u8 {
        let nesting = self.int_nesting.load(Ordering::Relaxed);
        if nesting > 0 {
            self.int_nesting.store(nesting - 1, Ordering::Relaxed);
        }
        nesting.saturating_sub(1)
    }
}

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Shared scheduler state, accessed only with the kernel locked.
pub struct KernelState {
    pub(crate) rdy: ReadyQueue,
    pub(crate) timers: TimerQueue,
    pub(crate) reg_head: Option<NonNull<Tcb>>,
}

impl KernelState {
    const fn new() -> Self {
        Self {
            rdy: ReadyQueue::new(),
            timers: TimerQueue::new(),
            reg_head: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.rdy.reset();
        self.timers = TimerQueue::new();
        self.reg_head = None;
    }
}

/// Global scheduler state instance
pub(crate) static STATE: CsCell<KernelState> = CsCell::new(KernelState::new());

/// Idle thread TCB
static mut IDLE_TCB: Tcb = Tcb::new();

/// Idle thread stack
static mut IDLE_STK: [StkElement; CFG_IDLE_STK_SIZE] = [0; CFG_IDLE_STK_SIZE];

// ============ CPU/Context Switch State ============

/// CPU context switch state
#[repr(C)]
pub struct CpuState {
    /// Current running thread's TCB pointer
    pub tcb_cur: *mut Tcb,
    /// TCB to switch to when the pended context switch is taken
    pub tcb_high_rdy: *mut Tcb,
}

impl CpuState {
    pub const fn new() -> Self {
        Self {
            tcb_cur: core::ptr::null_mut(),
            tcb_high_rdy: core::ptr::null_mut(),
        }
    }
}

/// Global CPU state instance
#[no_mangle]
#[used]
pub static mut CPU_STATE: CpuState = CpuState::new();

// ============ Internal accessors for other modules ============

/// Get the shared kernel state. Lock held via the token.
#[inline(always)]
pub(crate) fn state<'a>(_cs: &'a CriticalSection) -> &'a mut KernelState {
    unsafe { STATE.get_unchecked() }
}

/// Get the ready queue
#[inline(always)]
pub(crate) fn ready_queue<'a>(cs: &'a CriticalSection) -> &'a mut ReadyQueue {
    &mut state(cs).rdy
}

/// Get the virtual timer queue
#[inline(always)]
pub(crate) fn timer_queue<'a>(cs: &'a CriticalSection) -> &'a mut TimerQueue {
    &mut state(cs).timers
}

/// Get the current thread's TCB pointer
#[inline]
pub(crate) fn current_tcb(_cs: &CriticalSection) -> Option<NonNull<Tcb>> {
    unsafe { NonNull::new((*core::ptr::addr_of!(CPU_STATE)).tcb_cur) }
}

/// Record the thread the next context switch hands the processor to
#[inline]
pub(crate) fn set_next_tcb(_cs: &CriticalSection, tcb: NonNull<Tcb>) {
    unsafe { (*core::ptr::addr_of_mut!(CPU_STATE)).tcb_high_rdy = tcb.as_ptr() };
}

// ============ Initialization ============

/// Internal idle thread function
fn os_idle_thread(_: *mut ()) {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();

        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

/// Reset global kernel state
unsafe fn os_reset_globals() {
    KERNEL.reset();

    unsafe {
        let cpu = core::ptr::addr_of_mut!(CPU_STATE);
        (*cpu).tcb_cur = core::ptr::null_mut();
        (*cpu).tcb_high_rdy = core::ptr::null_mut();

        STATE.get_unchecked().reset();
    }
}

// ============ Public API ============

/// Initialize the kernel
///
/// This must be called before any other OS function. It resets the
/// scheduler structures and creates the idle thread.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::AlreadyRunning)` - OS is already running
pub fn os_init() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::AlreadyRunning);
    }

    unsafe { os_reset_globals() };

    critical_section(|cs| {
        unsafe {
            crate::thread::os_thread_create_internal(
                cs,
                core::ptr::addr_of_mut!(IDLE_TCB),
                "idle",
                os_idle_thread,
                CFG_PRIO_IDLE,
                core::ptr::addr_of_mut!(IDLE_STK) as *mut StkElement,
                CFG_IDLE_STK_SIZE,
            );
        }

        KERNEL.set_initialized(true);
    });

    Ok(())
}

/// Start multitasking
///
/// Hands the processor to the most urgent ready thread; never returns
/// under normal operation. At least one application thread must have been
/// created.
///
/// # Returns
/// * `Err(OsError::NotInit)` - OS not initialized
/// * `Err(OsError::AlreadyRunning)` - OS is already running
/// * `Err(OsError::NoAppThread)` - only the idle thread exists
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }

    if KERNEL.is_running() {
        return Err(OsError::AlreadyRunning);
    }

    critical_section(|cs| {
        let rq = ready_queue(cs);

        match rq.first_prio() {
            Some(p) if p > CFG_PRIO_IDLE => {}
            _ => return Err(OsError::NoAppThread),
        }

        let first = rq
            .pop_highest()
            .ok_or(OsError::NoAppThread)?;

        unsafe {
            (*first.as_ptr()).state = ThreadState::Current;
            let cpu = core::ptr::addr_of_mut!(CPU_STATE);
            (*cpu).tcb_cur = core::ptr::null_mut();
            (*cpu).tcb_high_rdy = first.as_ptr();
        }

        KERNEL.set_running(true);
        Ok(())
    })?;

    crate::port::os_cpu_systick_init(CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ);

    unsafe { crate::port::os_start_first_thread() };

    Ok(())
}

// ============ Interrupt prologue/epilogue ============

/// Notify the kernel that an interrupt handler was entered.
pub fn os_int_enter() {
    KERNEL.int_enter();
}

/// Notify the kernel that an interrupt handler is about to return.
///
/// When the outermost handler exits, the scheduler decides whether the
/// interrupted thread must be preempted and pends the switch.
pub fn os_int_exit() {
    if !KERNEL.is_running() {
        return;
    }

    let cs = CriticalSection::enter_from_isr();

    if KERNEL.int_nesting() == 0 {
        return;
    }

    let new_nesting = KERNEL.int_nesting_dec();

    if new_nesting == 0 && sched::preemption_required(&cs) {
        sched::do_preemption(&cs);
    }
}
