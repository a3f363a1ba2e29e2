//! ProcessManager: in-memory process table.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use reqscope_context::{CancelHandle, ContextRef, with_cancel, with_value};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::tracker::{PID_KEY, ProcessTracker, TrackedContext, process_id_from};
use crate::types::{Process, ProcessId, ProcessType};

/// Process manager configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    /// Upper bound on concurrently tracked processes (`None` = unbounded).
    pub max_processes: Option<usize>,
}

/// Internal entry in the table.
struct ProcessEntry {
    process: Process,
    /// Insertion order, for stable listings.
    seq: u64,
    cancel: CancelHandle,
}

struct Registry {
    config: ManagerConfig,
    processes: DashMap<ProcessId, ProcessEntry>,
    counter: AtomicU64,
    active: AtomicUsize,
}

impl Registry {
    fn reserve_slot(&self) -> Result<(), ProcessError> {
        let Some(max) = self.config.max_processes else {
            self.active.fetch_add(1, Ordering::AcqRel);
            return Ok(());
        };
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| ProcessError::TooManyProcesses { max })
    }

    fn remove(&self, pid: &ProcessId) {
        match self.processes.remove(pid) {
            Some((_, entry)) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                // Releases the context's resources and wakes anything waiting on it.
                entry.cancel.cancel();
                debug!("Process finished: {} ({})", pid, entry.process.description);
            }
            None => debug!("Process already finished: {}", pid),
        }
    }
}

/// Tracks live processes and hands out contexts bound to them.
///
/// Cloning is cheap; clones share the same table. Finish closures keep the
/// table alive until they run.
#[derive(Clone)]
pub struct ProcessManager {
    inner: Arc<Registry>,
}

impl ProcessManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(Registry {
                config,
                processes: DashMap::new(),
                counter: AtomicU64::new(0),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Cancel a tracked process. Returns false when the pid is unknown or the
    /// process was registered as not cancellable.
    pub fn cancel(&self, pid: &ProcessId) -> bool {
        let Some(entry) = self.inner.processes.get(pid) else {
            return false;
        };
        if !entry.process.cancellable {
            warn!("Refusing to cancel non-cancellable process: {}", pid);
            return false;
        }
        info!("Cancelling process: {} ({})", pid, entry.process.description);
        entry.cancel.cancel();
        true
    }

    pub fn get(&self, pid: &ProcessId) -> Option<Process> {
        self.inner.processes.get(pid).map(|e| e.process.clone())
    }

    /// All live processes, oldest first.
    pub fn processes(&self) -> Vec<Process> {
        let mut entries: Vec<(u64, Process)> = self
            .inner
            .processes
            .iter()
            .map(|e| (e.seq, e.process.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, p)| p).collect()
    }

    /// Live processes whose parent is `pid`.
    pub fn children(&self, pid: &ProcessId) -> Vec<Process> {
        self.processes()
            .into_iter()
            .filter(|p| p.parent_pid.as_ref() == Some(pid))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.processes.is_empty()
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl ProcessTracker for ProcessManager {
    fn add_typed_context(
        &self,
        parent: ContextRef,
        description: &str,
        kind: ProcessType,
        cancellable: bool,
    ) -> Result<TrackedContext, ProcessError> {
        self.inner.reserve_slot()?;

        let start = Utc::now();
        let seq = self.inner.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let pid = ProcessId::new(start, seq);
        let parent_pid = process_id_from(&parent);

        let (cancel_ctx, cancel) = with_cancel(parent);
        let context = with_value(cancel_ctx, &PID_KEY, pid.clone());

        let process = Process {
            pid: pid.clone(),
            parent_pid,
            description: description.to_string(),
            kind,
            start,
            cancellable,
        };
        self.inner.processes.insert(
            pid.clone(),
            ProcessEntry {
                process,
                seq,
                cancel,
            },
        );
        debug!("Process added: {} [{}] {}", pid, kind, description);

        let registry = self.inner.clone();
        let finished_pid = pid.clone();
        Ok(TrackedContext {
            context,
            pid,
            finish: Box::new(move || registry.remove(&finished_pid)),
        })
    }
}
