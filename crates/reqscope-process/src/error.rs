//! Process tracking errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessError {
    /// The tracker is at its configured capacity.
    #[error("too many tracked processes (max {max})")]
    TooManyProcesses { max: usize },

    /// Tracker implementations outside this crate report their own failures here.
    #[error("process tracker unavailable: {0}")]
    Unavailable(String),
}
