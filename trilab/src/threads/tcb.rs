//! Thread control block and the opaque handle threads are known by.

use super::context::Context;

pub const MAX_NAME_SIZE: usize = 64;
pub const THREAD_STACK_SIZE: usize = 256 * 1024;

/// Opaque, non-owning reference to a thread. Identity is the TCB's address;
/// callers never dereference it, they only pass it back into the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub(super) *const Tcb);

/// Reason the thread most recently returned control to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    Yield,
    Finish,
    WaitOn(ThreadHandle),
    SleepUntil,
}

pub struct Tcb {
    pub name: [u8; MAX_NAME_SIZE],
    pub name_len: usize,
    pub context: Context,
    /// Owned stack; must outlive every switch into this thread's context.
    pub stack: Box<[u8]>,
    pub waiting_for: Option<ThreadHandle>,
    pub has_waited: bool,
}

impl Tcb {
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("<invalid>")
    }

    pub fn handle(&self) -> ThreadHandle {
        ThreadHandle(self as *const Tcb)
    }
}

/// Copies `name` into a fixed-size buffer. Caller error (per the public
/// contract) if `name` exceeds [`MAX_NAME_SIZE`].
pub fn pack_name(name: &str) -> Result<([u8; MAX_NAME_SIZE], usize), super::error::ThreadError> {
    let bytes = name.as_bytes();
    if bytes.len() >= MAX_NAME_SIZE {
        return Err(super::error::ThreadError::NameTooLong);
    }
    let mut buf = [0u8; MAX_NAME_SIZE];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok((buf, bytes.len()))
}
