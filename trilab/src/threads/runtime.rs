//! Global scheduler state and the two real-time signals that drive it.
//!
//! Lock-based synchronization cannot be used here: the preemption and
//! sleep-wakeup signals can fire at arbitrary points on the single thread
//! this runtime occupies, including inside the manager loop itself. The
//! only synchronization primitive available is masking those two signals
//! around every queue mutation, exactly as a signal-handler-safe C runtime
//! would.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::mem::MaybeUninit;

use super::context::{self, Context};
use super::error::{ThreadError, ThreadResult};
use super::tcb::{pack_name, SuspendReason, Tcb, ThreadHandle, THREAD_STACK_SIZE};

const PREEMPT_PERIOD_NS: i64 = 10_000_000; // 10ms, per the public contract

pub(super) struct Runtime {
    manager_ctx: Context,
    current: Option<Box<Tcb>>,
    ready: VecDeque<Box<Tcb>>,
    waiting: VecDeque<Box<Tcb>>,
    finished: Vec<Box<Tcb>>,
    preempt_timer: libc::timer_t,
    rt_mask: libc::sigset_t,
}

struct RuntimeCell(UnsafeCell<Option<Runtime>>);
unsafe impl Sync for RuntimeCell {}

static RUNTIME: RuntimeCell = RuntimeCell(UnsafeCell::new(None));

fn preempt_signal() -> i32 {
    unsafe { libc::SIGRTMIN() }
}

fn sleep_signal() -> i32 {
    unsafe { libc::SIGRTMIN() + 1 }
}

/// # Safety
/// Must only be called while this thread is the sole accessor, i.e. with
/// the runtime's signals masked (or from within their handlers, which are
/// themselves only ever delivered while unmasked at well-defined points).
unsafe fn rt() -> &'static mut Runtime {
    (*RUNTIME.0.get()).as_mut().expect("threads::init was not called")
}

fn block_rt_signals(mask: &libc::sigset_t) {
    unsafe {
        libc::sigprocmask(libc::SIG_BLOCK, mask, std::ptr::null_mut());
    }
}

fn unblock_rt_signals(mask: &libc::sigset_t) {
    unsafe {
        libc::sigprocmask(libc::SIG_UNBLOCK, mask, std::ptr::null_mut());
    }
}

fn rt_signal_mask() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = MaybeUninit::zeroed().assume_init();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, preempt_signal());
        libc::sigaddset(&mut set, sleep_signal());
        set
    }
}

fn sleep_signal_mask() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = MaybeUninit::zeroed().assume_init();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, sleep_signal());
        set
    }
}

extern "C" fn preempt_handler(_signo: libc::c_int) {
    // Runs on the interrupted user thread's own stack; this *is* that
    // thread calling yield, just triggered asynchronously.
    super::yield_now();
}

extern "C" fn wakeup_handler(
    _signo: libc::c_int,
    info: *mut libc::siginfo_t,
    _ucontext: *mut libc::c_void,
) {
    let target = unsafe { (*info).si_value().sival_ptr } as *const Tcb;
    unsafe {
        let rt = rt();
        if let Some(pos) = rt.waiting.iter().position(|t| t.handle().0 == target) {
            let tcb = rt.waiting.remove(pos).unwrap();
            rt.ready.push_back(tcb);
        }
    }
}

fn install_preempt_timer() -> ThreadResult<libc::timer_t> {
    unsafe {
        let mut action: libc::sigaction = MaybeUninit::zeroed().assume_init();
        action.sa_sigaction = preempt_handler as usize;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(preempt_signal(), &action, std::ptr::null_mut()) != 0 {
            return Err(ThreadError::SignalFailed("sigaction(preempt)"));
        }

        let mut sev: libc::sigevent = MaybeUninit::zeroed().assume_init();
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = preempt_signal();

        let mut timer: libc::timer_t = std::ptr::null_mut();
        if libc::timer_create(libc::CLOCK_PROCESS_CPUTIME_ID, &mut sev, &mut timer) != 0 {
            return Err(ThreadError::TimerFailed("timer_create(preempt)"));
        }

        let spec = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: PREEMPT_PERIOD_NS },
            it_value: libc::timespec { tv_sec: 0, tv_nsec: PREEMPT_PERIOD_NS },
        };
        if libc::timer_settime(timer, 0, &spec, std::ptr::null_mut()) != 0 {
            return Err(ThreadError::TimerFailed("timer_settime(preempt)"));
        }

        let mut wake_action: libc::sigaction = MaybeUninit::zeroed().assume_init();
        wake_action.sa_sigaction = wakeup_handler as usize;
        wake_action.sa_flags = libc::SA_SIGINFO;
        libc::sigemptyset(&mut wake_action.sa_mask);
        if libc::sigaction(sleep_signal(), &wake_action, std::ptr::null_mut()) != 0 {
            return Err(ThreadError::SignalFailed("sigaction(sleep)"));
        }

        Ok(timer)
    }
}

fn new_tcb(name: &str, entry: extern "C" fn(u64), arg: u64) -> ThreadResult<Box<Tcb>> {
    let (packed, len) = pack_name(name)?;
    let stack = vec![0u8; THREAD_STACK_SIZE].into_boxed_slice();
    let stack_top = unsafe { stack.as_ptr().add(stack.len()) } as u64;
    let context = Context::new(stack_top, entry as u64, arg);
    Ok(Box::new(Tcb {
        name: packed,
        name_len: len,
        context,
        stack,
        waiting_for: None,
        has_waited: false,
    }))
}

fn present_in(handle: ThreadHandle, queue: &VecDeque<Box<Tcb>>) -> bool {
    queue.iter().any(|t| t.handle() == handle)
}

pub(super) fn init(entry: extern "C" fn(u64), arg: u64) -> ThreadResult<()> {
    unsafe {
        if (*RUNTIME.0.get()).is_some() {
            return Err(ThreadError::AlreadyInitialized);
        }
    }

    let preempt_timer = install_preempt_timer()?;
    let rt_mask = rt_signal_mask();

    let main_tcb = new_tcb("main", entry, arg)?;

    let runtime = Runtime {
        manager_ctx: Context::empty(),
        current: None,
        ready: VecDeque::from([main_tcb]),
        waiting: VecDeque::new(),
        finished: Vec::new(),
        preempt_timer,
        rt_mask,
    };
    unsafe {
        *RUNTIME.0.get() = Some(runtime);
    }

    block_rt_signals(&rt_mask);

    loop {
        let (ready_empty, waiting_empty) = unsafe {
            let rt = rt();
            (rt.ready.is_empty(), rt.waiting.is_empty())
        };
        if ready_empty && waiting_empty {
            break;
        }

        let sleep_mask = sleep_signal_mask();
        unblock_rt_signals(&sleep_mask);
        block_rt_signals(&sleep_mask);

        let mut tcb = unsafe { rt().ready.pop_front().expect("ready non-empty, checked above") };

        if let Some(target) = tcb.waiting_for {
            let still_pending = unsafe {
                let rt = rt();
                present_in(target, &rt.ready) || present_in(target, &rt.waiting)
            };
            if still_pending {
                unsafe { rt().ready.push_back(tcb) };
                continue;
            }
            tcb.waiting_for = None;
        }

        let new_ctx: *const Context = &tcb.context;
        unsafe {
            let rt = rt();
            rt.current = Some(tcb);
            log::trace!("switching into {}", rt.current.as_ref().unwrap().name_str());
            context::switch_context(&mut rt.manager_ctx as *mut Context, new_ctx);
        }
        // Control returns here once the thread yields, waits, sleeps, or is
        // preempted; `current` was already moved into the right queue by
        // whichever of those paths ran.
    }

    unsafe {
        let rt = rt();
        libc::timer_delete(rt.preempt_timer);
        unblock_rt_signals(&rt.rt_mask);
        *RUNTIME.0.get() = None;
    }

    std::process::exit(0);
}

pub(super) fn create(name: &str, entry: extern "C" fn(u64), arg: u64) -> ThreadResult<ThreadHandle> {
    unsafe {
        if (*RUNTIME.0.get()).is_none() {
            return Err(ThreadError::NotInitialized);
        }
    }
    let mask = rt_signal_mask();
    block_rt_signals(&mask);
    let tcb = new_tcb(name, entry, arg);
    let handle = tcb.as_ref().map(|t| t.handle());
    if let Ok(tcb) = tcb {
        unsafe { rt().ready.push_back(tcb) };
    }
    unblock_rt_signals(&mask);
    handle
}

fn suspend_current(reason: SuspendReason) {
    let mask = rt_signal_mask();
    block_rt_signals(&mask);

    let mut tcb = unsafe { rt().current.take().expect("called from outside a user thread") };
    let ctx_ptr: *mut Context = &mut tcb.context;

    match reason {
        SuspendReason::Yield => unsafe { rt().ready.push_back(tcb) },
        SuspendReason::WaitOn(target) => {
            tcb.waiting_for = Some(target);
            unsafe { rt().ready.push_back(tcb) };
        }
        SuspendReason::SleepUntil => unsafe { rt().waiting.push_back(tcb) },
        SuspendReason::Finish => unreachable!("Finish goes through exit_current, not suspend_current"),
    }

    unsafe {
        let rt = rt();
        context::switch_context(ctx_ptr, &rt.manager_ctx as *const Context);
    }

    unblock_rt_signals(&mask);
}

pub(super) fn yield_now() {
    suspend_current(SuspendReason::Yield);
}

/// Unblocks the runtime's two RT signals. Called once, from the entry
/// trampoline, as the first action a newly created thread takes — its
/// `Context` starts out with no signal mask of its own,
/// and `init` blocks both signals before the manager ever switches into
/// anything, so without this a thread that never yields/waits/sleeps
/// before entry would simply never be preempted.
pub(super) fn unblock_new_thread_signals() {
    let mask = rt_signal_mask();
    unblock_rt_signals(&mask);
}

pub(super) fn exit_current() -> ! {
    let mask = rt_signal_mask();
    block_rt_signals(&mask);

    let tcb = unsafe { rt().current.take().expect("called from outside a user thread") };
    unsafe {
        let rt = rt();
        rt.finished.push(tcb);
        context::restore_context(&rt.manager_ctx as *const Context)
    }
}

pub(super) fn wait(target: Option<ThreadHandle>) {
    let Some(target) = target else { return };
    let mask = rt_signal_mask();
    block_rt_signals(&mask);
    unsafe {
        (*(target.0 as *mut Tcb)).has_waited = true;
    }
    unblock_rt_signals(&mask);
    suspend_current(SuspendReason::WaitOn(target));
}

pub(super) fn sleep(duration: std::time::Duration) -> ThreadResult<()> {
    let mask = rt_signal_mask();
    block_rt_signals(&mask);

    let current_ptr = unsafe { rt().current.as_deref().expect("called from outside a user thread") as *const Tcb };

    let timer = unsafe {
        let mut sev: libc::sigevent = MaybeUninit::zeroed().assume_init();
        sev.sigev_notify = libc::SIGEV_SIGNAL;
        sev.sigev_signo = sleep_signal();
        sev.sigev_value.sival_ptr = current_ptr as *mut libc::c_void;

        let mut timer: libc::timer_t = std::ptr::null_mut();
        if libc::timer_create(libc::CLOCK_REALTIME, &mut sev, &mut timer) != 0 {
            unblock_rt_signals(&mask);
            return Err(ThreadError::TimerFailed("timer_create(sleep)"));
        }

        let spec = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            it_value: libc::timespec {
                tv_sec: duration.as_secs() as i64,
                tv_nsec: duration.subsec_nanos() as i64,
            },
        };
        if libc::timer_settime(timer, 0, &spec, std::ptr::null_mut()) != 0 {
            libc::timer_delete(timer);
            unblock_rt_signals(&mask);
            return Err(ThreadError::TimerFailed("timer_settime(sleep)"));
        }
        timer
    };

    unblock_rt_signals(&mask);
    suspend_current(SuspendReason::SleepUntil);
    unsafe {
        libc::timer_delete(timer);
    }
    Ok(())
}

pub(super) fn current_handle() -> ThreadHandle {
    unsafe { rt().current.as_deref().expect("called from outside a user thread").handle() }
}

pub(super) fn name_of(handle: ThreadHandle) -> String {
    unsafe { (*handle.0).name_str().to_owned() }
}

pub(super) fn waiting_count() -> usize {
    unsafe { rt().waiting.len() }
}

pub(super) fn exited_without_wait_count() -> usize {
    unsafe { rt().finished.iter().filter(|t| !t.has_waited).count() }
}
