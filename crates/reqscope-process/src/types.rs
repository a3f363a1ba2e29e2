//! Process descriptors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of work a process represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    /// A single incoming request.
    Request,
    /// Long-running work owned by the system itself.
    System,
    #[default]
    Normal,
}

impl ProcessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::System => "system",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a tracked process: `<unix-seconds>-<counter>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn new(start: DateTime<Utc>, counter: u64) -> Self {
        Self(format!("{}-{}", start.timestamp(), counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Snapshot of a tracked process, as listed in a process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub pid: ProcessId,
    /// Set when the process was started from inside another tracked process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_pid: Option<ProcessId>,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ProcessType,
    pub start: DateTime<Utc>,
    pub cancellable: bool,
}
