use thiserror::Error;

#[derive(Debug, Error)]
pub enum PagerError {
    #[error("syslog range is not fully allocated to the requesting process")]
    InvalidRange,
    #[error("pid {0} has no registered page table")]
    UnknownPid(super::mmu::Pid),
}

pub type PagerResult<T> = Result<T, PagerError>;
