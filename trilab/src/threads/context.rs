//! Register-context save/restore for cooperative thread switching.
//!
//! Same callee-saved-register discipline as a kernel task switch, minus the
//! address-space reload: there is exactly one address space here.

use core::arch::naked_asm;

use super::runtime;

/// Callee-saved x86_64 System V registers plus the resume address.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub rsp: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
}

impl Context {
    pub fn empty() -> Self {
        Context { rsp: 0, rbp: 0, rbx: 0, r12: 0, r13: 0, r14: 0, r15: 0, rip: 0 }
    }

    /// Build a context that, on first switch-in, lands in `thread_trampoline`
    /// with `entry_fn` and `entry_arg` recovered from `r12`/`r13`.
    pub fn new(stack_top: u64, entry_fn: u64, entry_arg: u64) -> Self {
        let aligned_sp = (stack_top - 8) & !0xF;
        Context {
            rsp: aligned_sp,
            rbp: 0,
            rbx: 0,
            r12: entry_fn,
            r13: entry_arg,
            r14: 0,
            r15: 0,
            rip: thread_trampoline as u64,
        }
    }
}

/// Entered with `r12` = `extern "C" fn(u64)` entry pointer, `r13` = its
/// argument, per [`Context::new`]'s setup. Calling convention is enforced
/// entirely by the hand-placed registers, not by the Rust type system, so
/// it takes no parameters of its own; it hands off to [`thread_entry_shim`]
/// with those same two values moved into the System V integer argument
/// registers.
#[unsafe(naked)]
unsafe extern "C" fn thread_trampoline() -> ! {
    naked_asm!(
        "mov rdi, r13",
        "mov rsi, r12",
        "jmp {shim}",
        shim = sym thread_entry_shim,
    );
}

/// A freshly built [`Context`] carries no signal-mask state of its own —
/// unlike `ucontext_t`, whose `uc_sigmask` a real `swapcontext` restores on
/// every switch — so the first thing a new thread must do is unblock the
/// runtime's signals itself before anything can preempt it.
extern "C" fn thread_entry_shim(arg: u64, entry: extern "C" fn(u64)) -> ! {
    runtime::unblock_new_thread_signals();
    entry(arg);
    unreachable!("thread entry functions must call threads::exit()")
}

/// Save callee-saved registers into `old`, restore from `new`, and jump.
/// Returns (to the caller of the *original* `switch_context` call into
/// `old`) once something switches back into `old`.
///
/// # Safety
/// Both pointers must reference live `Context`s with valid stack pointers.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(old: *mut Context, new: *const Context) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x38], rax",

        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",

        "jmp [rsi + 0x38]",

        "2:",
        "ret",
    );
}

/// Like [`switch_context`] but never saves the caller's registers — used
/// when the caller (a finished thread) will never be switched back into.
///
/// # Safety
/// `new` must reference a live `Context`.
#[unsafe(naked)]
pub unsafe extern "C" fn restore_context(new: *const Context) -> ! {
    naked_asm!(
        "mov rsp, [rdi + 0x00]",
        "mov rbp, [rdi + 0x08]",
        "mov rbx, [rdi + 0x10]",
        "mov r12, [rdi + 0x18]",
        "mov r13, [rdi + 0x20]",
        "mov r14, [rdi + 0x28]",
        "mov r15, [rdi + 0x30]",
        "jmp [rdi + 0x38]",
    );
}
