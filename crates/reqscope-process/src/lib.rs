//! Process tracking for reqscope.
//!
//! A *process* is one tracked unit of work: an incoming request, a system
//! task, or anything else worth listing while it runs. The
//! [`ProcessTracker`] trait is what request-context construction depends
//! on; [`ProcessManager`] is the in-memory implementation.

pub mod error;
pub mod manager;
pub mod tracker;
pub mod types;

pub use error::ProcessError;
pub use manager::{ManagerConfig, ProcessManager};
pub use tracker::{FinishFn, PID_KEY, ProcessTracker, TrackedContext, process_id_from};
pub use types::{Process, ProcessId, ProcessType};
