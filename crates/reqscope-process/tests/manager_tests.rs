//! Process manager tests: registration, listing, cancellation, limits.

use reqscope_context::{Context, ContextError, ContextExt, background, with_cancel};
use reqscope_process::*;

fn manager() -> ProcessManager {
    ProcessManager::new(ManagerConfig::default())
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

mod registration {
    use super::*;

    #[test]
    fn add_and_finish() {
        let pm = manager();
        let tracked = pm
            .add_typed_context(background(), "GET /", ProcessType::Request, true)
            .unwrap();

        assert_eq!(pm.len(), 1);
        let process = pm.get(&tracked.pid).unwrap();
        assert_eq!(process.description, "GET /");
        assert_eq!(process.kind, ProcessType::Request);
        assert!(process.cancellable);
        assert!(process.parent_pid.is_none());

        (tracked.finish)();
        assert!(pm.is_empty());
        assert!(pm.get(&tracked.pid).is_none());
    }

    #[test]
    fn tracked_context_carries_pid() {
        let pm = manager();
        let tracked = pm
            .add_typed_context(background(), "job", ProcessType::Normal, true)
            .unwrap();
        assert_eq!(process_id_from(&tracked.context), Some(tracked.pid.clone()));
        assert!(process_id_from(&background()).is_none());
    }

    #[test]
    fn pids_are_unique() {
        let pm = manager();
        let a = pm.add_typed_context(background(), "a", ProcessType::Normal, true).unwrap();
        let b = pm.add_typed_context(background(), "b", ProcessType::Normal, true).unwrap();
        assert_ne!(a.pid, b.pid);
    }

    #[test]
    fn nested_process_records_parent() {
        let pm = manager();
        let outer = pm
            .add_typed_context(background(), "outer", ProcessType::Request, true)
            .unwrap();
        let inner = pm
            .add_typed_context(outer.context.clone(), "inner", ProcessType::Normal, true)
            .unwrap();

        let process = pm.get(&inner.pid).unwrap();
        assert_eq!(process.parent_pid, Some(outer.pid.clone()));
        assert_eq!(process_id_from(&inner.context), Some(inner.pid.clone()));

        let children = pm.children(&outer.pid);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].pid, inner.pid);
    }

    #[test]
    fn listing_is_oldest_first() {
        let pm = manager();
        let names = ["first", "second", "third"];
        let _tracked: Vec<_> = names
            .iter()
            .map(|n| pm.add_typed_context(background(), n, ProcessType::Normal, true).unwrap())
            .collect();

        let listed: Vec<String> = pm.processes().into_iter().map(|p| p.description).collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn finish_cancels_the_tracked_context() {
        let pm = manager();
        let tracked = pm
            .add_typed_context(background(), "req", ProcessType::Request, true)
            .unwrap();
        let ctx = tracked.context.clone();
        assert!(ctx.err().is_none());
        (tracked.finish)();
        assert_eq!(ctx.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn parent_cancel_reaches_tracked_context() {
        let pm = manager();
        let (parent, cancel) = with_cancel(background());
        let tracked = pm
            .add_typed_context(parent, "req", ProcessType::Request, true)
            .unwrap();
        cancel.cancel();
        assert!(tracked.context.is_done());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

mod cancellation {
    use super::*;

    #[test]
    fn cancel_by_pid() {
        let pm = manager();
        let tracked = pm
            .add_typed_context(background(), "slow", ProcessType::Request, true)
            .unwrap();
        assert!(pm.cancel(&tracked.pid));
        assert_eq!(tracked.context.err(), Some(ContextError::Cancelled));
        // Cancelling does not finish; the process stays listed until its owner finishes it.
        assert_eq!(pm.len(), 1);
    }

    #[test]
    fn non_cancellable_process_is_refused() {
        let pm = manager();
        let tracked = pm
            .add_typed_context(background(), "indexer", ProcessType::System, false)
            .unwrap();
        assert!(!pm.cancel(&tracked.pid));
        assert!(tracked.context.err().is_none());
    }

    #[test]
    fn unknown_pid_is_refused() {
        let pm = manager();
        assert!(!pm.cancel(&ProcessId::from("0-0")));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Limits and serialization
// ─────────────────────────────────────────────────────────────────────────────

mod limits {
    use super::*;

    #[test]
    fn max_processes_enforced() {
        let pm = ProcessManager::new(ManagerConfig { max_processes: Some(1) });
        let first = pm
            .add_typed_context(background(), "one", ProcessType::Request, true)
            .unwrap();

        let err = pm
            .add_typed_context(background(), "two", ProcessType::Request, true)
            .unwrap_err();
        assert_eq!(err, ProcessError::TooManyProcesses { max: 1 });

        (first.finish)();
        assert!(pm.add_typed_context(background(), "three", ProcessType::Request, true).is_ok());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ManagerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ManagerConfig::default());

        let config: ManagerConfig = serde_json::from_str(r#"{"maxProcesses": 8}"#).unwrap();
        assert_eq!(config.max_processes, Some(8));
    }

    #[test]
    fn process_serializes_for_tables() {
        let pm = manager();
        let tracked = pm
            .add_typed_context(background(), "GET /api", ProcessType::Request, true)
            .unwrap();
        let json = serde_json::to_value(pm.get(&tracked.pid).unwrap()).unwrap();
        assert_eq!(json["pid"], tracked.pid.as_str());
        assert_eq!(json["type"], "request");
        assert_eq!(json["description"], "GET /api");
        assert!(json.get("parentPid").is_none());
    }
}
