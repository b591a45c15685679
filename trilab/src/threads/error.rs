use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread name exceeds the maximum bounded length")]
    NameTooLong,
    #[error("the runtime has not been initialized with threads::init")]
    NotInitialized,
    #[error("the runtime is already initialized")]
    AlreadyInitialized,
    #[error("a POSIX timer primitive failed: {0}")]
    TimerFailed(&'static str),
    #[error("a signal primitive failed: {0}")]
    SignalFailed(&'static str),
}

pub type ThreadResult<T> = Result<T, ThreadError>;
