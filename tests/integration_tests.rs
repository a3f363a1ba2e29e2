//! End-to-end tests: a request created through the process manager, worked
//! on by several independent parts, finished, and torn down.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqscope_context::{Context, ContextError, ContextExt, ContextKey, background, with_timeout};
use reqscope_process::{ManagerConfig, ProcessManager, ProcessType, process_id_from};
use reqscope_request::{RequestFactory, RequestStore, new_request_context};
use tempfile::NamedTempFile;

const USER: ContextKey<String> = ContextKey::new("user");

fn setup() -> (ProcessManager, RequestFactory) {
    let pm = ProcessManager::new(ManagerConfig::default());
    let factory = RequestFactory::new(Arc::new(pm.clone()));
    (pm, factory)
}

// ─────────────────────────────────────────────────────────────────────────────
// Request lifecycle
// ─────────────────────────────────────────────────────────────────────────────

mod lifecycle {
    use super::*;

    #[test]
    fn job_runs_cleanup_once_and_stays_readable() {
        let pm = ProcessManager::new(ManagerConfig::default());
        let (ctx, finisher) = new_request_context(&pm, background(), "job-1").unwrap();
        assert_eq!(pm.processes()[0].description, "job-1");

        let log = Arc::new(Mutex::new(Vec::new()));
        ctx.store().set_value(&USER, "alice".to_string());
        {
            let log = log.clone();
            ctx.store().add_cleanup(move || log.lock().push("done"));
        }

        finisher.finish();
        finisher.finish();
        drop(finisher);

        assert_eq!(*log.lock(), vec!["done"]);
        assert!(pm.is_empty());

        // The finished store still answers reads.
        assert_eq!(ctx.get(&USER).unwrap().as_str(), "alice");
        assert_eq!(ctx.store().get_value(&USER).unwrap().as_str(), "alice");
        assert!(ctx.store().data().is_empty());
    }

    #[test]
    fn temp_file_is_removed_on_finish() {
        let (_pm, factory) = setup();
        let (ctx, finisher) = factory.create(background(), "upload").unwrap();

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "partial upload").unwrap();
        let path = file.path().to_path_buf();
        ctx.store().add_closer(file);
        assert!(path.exists());

        finisher.finish();
        assert!(!path.exists());
    }

    #[test]
    fn temp_dir_is_removed_on_finish() {
        let (_pm, factory) = setup();
        let (ctx, finisher) = factory.create(background(), "unpack").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manifest.json"), "{}").unwrap();
        let path = dir.path().to_path_buf();
        ctx.store().add_closer(dir);

        drop(finisher);
        assert!(!path.exists());
    }

    #[test]
    fn nested_requests_are_tracked_as_children() {
        let (pm, factory) = setup();
        let (outer, outer_finisher) = factory.create(background(), "outer").unwrap();
        let (inner, inner_finisher) = factory.create(outer.clone(), "inner").unwrap();

        let inner_process = pm.get(inner_finisher.pid()).unwrap();
        assert_eq!(inner_process.kind, ProcessType::Request);
        assert_eq!(inner_process.parent_pid.as_ref(), Some(outer_finisher.pid()));
        assert_eq!(process_id_from(&inner), Some(inner_finisher.pid().clone()));

        // Each level resolves its own store.
        let inner_store = RequestStore::from_context(&inner).unwrap();
        assert!(Arc::ptr_eq(&inner_store, inner.store()));
        assert!(!Arc::ptr_eq(&inner_store, outer.store()));

        // Finishing the outer request cancels the inner one, but the inner
        // request still owns its own teardown.
        outer_finisher.finish();
        assert!(inner.is_done());
        assert_eq!(pm.len(), 1);
        inner_finisher.finish();
        assert!(pm.is_empty());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

mod dispatcher {
    use super::*;

    #[tokio::test]
    async fn pipeline_parts_share_one_request() {
        let (pm, factory) = setup();
        let log = Arc::new(Mutex::new(Vec::new()));

        let handler_log = log.clone();
        factory
            .run(background(), "GET /packages", |ctx| async move {
                // Authentication.
                ctx.store().set_value(&USER, "alice".to_string());
                // Logger, found through the context alone.
                let store = RequestStore::from_context(&ctx).unwrap();
                let log = handler_log.clone();
                store.add_cleanup(move || log.lock().push("flush logs"));
                // Session.
                let log = handler_log.clone();
                ctx.store().add_cleanup(move || log.lock().push("close session"));

                ctx.store().data().insert("title", "Packages");
                assert_eq!(ctx.get(&USER).unwrap().as_str(), "alice");
            })
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["flush logs", "close session"]);
        assert!(pm.is_empty());
    }

    #[tokio::test]
    async fn deadline_ends_handler_and_still_cleans_up() {
        let (pm, factory) = setup();
        let cleaned = Arc::new(Mutex::new(false));

        let (parent, _cancel) = with_timeout(background(), Duration::from_millis(20));
        let cleaned_flag = cleaned.clone();
        let err = factory
            .run(parent, "slow", |ctx| async move {
                ctx.store().add_cleanup(move || *cleaned_flag.lock() = true);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(5)) => None,
                    _ = ctx.done() => ctx.err(),
                }
            })
            .await
            .unwrap();

        assert_eq!(err, Some(ContextError::DeadlineExceeded));
        assert!(*cleaned.lock());
        assert!(pm.is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_are_isolated() {
        let (pm, factory) = setup();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let factory = factory.clone();
                tokio::spawn(async move {
                    factory
                        .run(background(), &format!("req-{i}"), |ctx| async move {
                            ctx.store().set_value(&USER, format!("user-{i}"));
                            tokio::task::yield_now().await;
                            ctx.get(&USER).map(|u| u.as_str().to_string())
                        })
                        .await
                })
            })
            .collect();

        for (i, task) in tasks.into_iter().enumerate() {
            let user = task.await.unwrap().unwrap();
            assert_eq!(user, Some(format!("user-{i}")));
        }
        assert!(pm.is_empty());
    }
}
