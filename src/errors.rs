use std::result;

use thiserror::Error;

/// Errors reported by the tracing engine.
///
/// None of these are ever allowed to escape into instrumented application
/// code paths: operations on the hot path (`create_*_span`, `stop_span`)
/// recover internally and report through the `log` crate instead.
/// The variants below are returned only from operations whose misuse the
/// caller must be able to observe, such as a double async finish.
#[derive(Debug, Error)]
pub enum Error {
    /// The span was already finished and cannot be finished again.
    #[error("span {0} was already finished")]
    AlreadyFinished(u32),

    /// `prepare_for_async` was called twice on the same span.
    #[error("span {0} is already prepared for async completion")]
    AlreadyPending(u32),

    /// `continued` was called on a context that already has a segment.
    #[error("execution context already has an active segment")]
    ContextAlreadyActive,

    /// The operation requires an active span but the stack is empty.
    #[error("no active span in this execution context")]
    NoActiveSpan,
}

pub type Result<T> = result::Result<T, Error>;
