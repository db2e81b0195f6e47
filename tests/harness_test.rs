//! Integration tests for the test lifecycle harness.

use futures_util::FutureExt;
use pgscratch::error::{ScratchError, ScratchResult};
use pgscratch::harness::TestScope;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn explode() -> ScratchResult<()> {
    panic!("teardown exploded")
}

#[tokio::test]
async fn test_teardowns_run_last_registered_first() {
    let scope = TestScope::new("lifo");
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..3 {
        let order = order.clone();
        scope.cleanup(move |_| async move {
            order.lock().unwrap().push(i);
            Ok(())
        });
    }

    scope.run_cleanups().await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
}

#[tokio::test]
async fn test_teardowns_run_exactly_once() {
    let scope = TestScope::new("once");
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    scope.cleanup(move |_| async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    scope.run_cleanups().await.unwrap();
    scope.run_cleanups().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(scope.pending_teardowns(), 0);
}

#[tokio::test]
async fn test_failed_state_is_read_at_teardown_time() {
    let scope = TestScope::new("late_failure");
    let observed = Arc::new(Mutex::new(None));

    let slot = observed.clone();
    scope.cleanup(move |scope| async move {
        *slot.lock().unwrap() = Some(scope.failed());
        Ok(())
    });

    // Fails only after the teardown was registered.
    scope.fail();
    scope.run_cleanups().await.unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_teardown_registered_by_teardown_still_runs() {
    let scope = TestScope::new("nested");
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    scope.cleanup(move |scope| async move {
        let inner = counter.clone();
        scope.cleanup(move |_| async move {
            inner.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    scope.run_cleanups().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_panicking_teardown_does_not_stop_others() {
    let scope = TestScope::new("teardown_panic");
    let ran = Arc::new(AtomicUsize::new(0));

    let counter = ran.clone();
    scope.cleanup(move |_| async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    scope.cleanup(|_| async { explode() });

    let err = scope.run_cleanups().await.unwrap_err();
    assert!(matches!(err, ScratchError::Teardown { .. }));
    assert!(err.to_string().contains("teardown exploded"));
    assert!(scope.failed());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_passing_body_keeps_scope_passing() {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();

    let value = TestScope::run("passing", |scope| async move {
        scope.cleanup(move |scope| async move {
            *slot.lock().unwrap() = Some(scope.failed());
            Ok(())
        });
        Ok::<_, ScratchError>(42)
    })
    .await
    .unwrap();

    assert_eq!(value, 42);
    assert_eq!(*seen.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn test_run_error_outcome_marks_failed_before_teardown() {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();

    let result = TestScope::run("returns_error", |scope| async move {
        scope.cleanup(move |scope| async move {
            *slot.lock().unwrap() = Some((scope.failed(), scope.logs()));
            Ok(())
        });
        Err::<(), _>(ScratchError::invalid_name("x", "bad"))
    })
    .await;

    assert!(result.is_err());
    let (failed, logs) = seen.lock().unwrap().clone().unwrap();
    assert!(failed);
    assert!(logs.iter().any(|l| l.contains("test returned an error")));
}

#[tokio::test]
async fn test_run_error_breadcrumb_omits_remediation() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let slot = seen.clone();

    let result = TestScope::run("admin_refused", |scope| async move {
        scope.cleanup(move |scope| async move {
            *slot.lock().unwrap() = scope.logs();
            Ok(())
        });
        Err::<(), _>(ScratchError::admin_connection(
            "postgres://ci@localhost:5432/postgres",
            sqlx::Error::PoolClosed,
            "ALTER USER ci WITH PASSWORD 'hunter2' CREATEDB;",
        ))
    })
    .await;

    assert!(result.unwrap_err().to_string().contains("hunter2"));
    let logs = seen.lock().unwrap().clone();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("Connection to Postgres failed"));
    assert!(!logs[0].contains("hunter2"));
}

#[tokio::test]
async fn test_run_panicking_body_runs_teardown_then_repanics() {
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();

    let outcome = AssertUnwindSafe(TestScope::run("panics", |scope| async move {
        scope.cleanup(move |scope| async move {
            *slot.lock().unwrap() = Some(scope.failed());
            Ok(())
        });
        assert_eq!(1 + 1, 3, "assertion failed in body");
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert_eq!(*seen.lock().unwrap(), Some(true));
}

#[tokio::test]
async fn test_run_panics_when_teardown_fails_after_passing_body() {
    let outcome = AssertUnwindSafe(TestScope::run("teardown_fails", |scope| async move {
        scope.cleanup(|_| async {
            Err::<(), _>(ScratchError::invalid_name("test_x", "could not drop"))
        });
    }))
    .catch_unwind()
    .await;

    let panic = outcome.unwrap_err();
    let message = panic
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_default();
    assert!(message.contains("teardown_fails"));
    assert!(message.contains("could not drop"));
}
