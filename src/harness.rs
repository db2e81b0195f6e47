//! Test lifecycle harness.
//!
//! [`TestScope`] is the hook a scratch database binds its teardown to. It
//! tracks whether the owning test has failed, collects teardown closures, and
//! keeps a breadcrumb log that survives the test body.
//!
//! ```ignore
//! TestScope::run("creates_users", |scope| async move {
//!     let db = provisioner.provision(&scope).await?;
//!     users_table().apply(db.pool()).await?;
//!     Ok::<_, ScratchError>(())
//! })
//! .await
//! .unwrap();
//! ```

use crate::error::{ScratchError, ScratchResult};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

type Teardown = Box<dyn FnOnce(TestScope) -> BoxFuture<'static, ScratchResult<()>> + Send>;

/// Result of a test body, as far as the harness is concerned.
pub trait Outcome {
    /// Failure description, or `None` if the body passed.
    fn failure(&self) -> Option<String>;
}

impl Outcome for () {
    fn failure(&self) -> Option<String> {
        None
    }
}

impl<T, E: fmt::Display> Outcome for Result<T, E> {
    fn failure(&self) -> Option<String> {
        self.as_ref().err().map(ToString::to_string)
    }
}

struct ScopeInner {
    name: String,
    failed: AtomicBool,
    teardowns: Mutex<Vec<Teardown>>,
    logs: Mutex<Vec<String>>,
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let pending = self
            .teardowns
            .get_mut()
            .map(|teardowns| teardowns.len())
            .unwrap_or_default();
        if pending > 0 {
            warn!(
                test = %self.name,
                pending,
                "Test scope dropped with teardowns that never ran"
            );
        }
    }
}

/// Lifecycle of one test: failed flag, teardown registry, breadcrumb log.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TestScope {
    inner: Arc<ScopeInner>,
}

impl TestScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                failed: AtomicBool::new(false),
                teardowns: Mutex::new(Vec::new()),
                logs: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Mark the test as failed. Teardowns that run afterwards observe it.
    pub fn fail(&self) {
        self.inner.failed.store(true, Ordering::SeqCst);
    }

    /// Whether the test has been marked failed, as of now.
    pub fn failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    /// Leave a breadcrumb for whoever investigates this test.
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(test = %self.name(), "{}", message);
        self.push_log(message);
    }

    /// Report a problem that must not change the test's outcome.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(test = %self.name(), "{}", message);
        self.push_log(message);
    }

    fn push_log(&self, message: String) {
        self.inner
            .logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// Breadcrumbs recorded so far, oldest first.
    pub fn logs(&self) -> Vec<String> {
        self.inner
            .logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Register a teardown to run after the test body, last registered first.
    pub fn cleanup<F, Fut>(&self, teardown: F)
    where
        F: FnOnce(TestScope) -> Fut + Send + 'static,
        Fut: Future<Output = ScratchResult<()>> + Send + 'static,
    {
        let boxed: Teardown = Box::new(move |scope| teardown(scope).boxed());
        self.inner
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(boxed);
    }

    /// Number of teardowns registered and not yet run.
    pub fn pending_teardowns(&self) -> usize {
        self.inner
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run every registered teardown once, last registered first.
    ///
    /// A teardown that errors or panics marks the scope failed; the remaining
    /// teardowns still run and see the failure.
    pub async fn run_cleanups(&self) -> ScratchResult<()> {
        let mut failures = Vec::new();

        loop {
            // Popping one at a time picks up teardowns registered by teardowns.
            let next = self
                .inner
                .teardowns
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop();
            let Some(teardown) = next else {
                break;
            };

            match AssertUnwindSafe(teardown(self.clone())).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.fail();
                    error!(test = %self.name(), error = %err.summary(), "Teardown failed");
                    failures.push(err.to_string());
                }
                Err(panic) => {
                    self.fail();
                    let message = panic_message(panic.as_ref());
                    error!(test = %self.name(), panic = %message, "Teardown panicked");
                    failures.push(format!("teardown panicked: {message}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ScratchError::Teardown { failures })
        }
    }

    /// Run `body` as a test named `name`, then its teardowns.
    ///
    /// The scope is marked failed if the body panics or returns a failing
    /// [`Outcome`], before any teardown runs.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from the body after teardown. Panics with the
    /// teardown errors if the body passed but a teardown failed.
    pub async fn run<F, Fut>(name: impl Into<String>, body: F) -> Fut::Output
    where
        F: FnOnce(TestScope) -> Fut,
        Fut: Future,
        Fut::Output: Outcome,
    {
        let scope = TestScope::new(name);
        let result = AssertUnwindSafe(body(scope.clone())).catch_unwind().await;

        match &result {
            Ok(output) => {
                if let Some(failure) = output.failure() {
                    scope.fail();
                    // Only the headline: remediation text follows on later lines.
                    let headline = failure.lines().next().unwrap_or_default();
                    scope.log(format!("test returned an error: {headline}"));
                }
            }
            Err(_) => scope.fail(),
        }

        let teardown = scope.run_cleanups().await;

        match result {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(output) => {
                if let Err(err) = teardown {
                    panic!("{}: {}", scope.name(), err);
                }
                output
            }
        }
    }
}

impl fmt::Debug for TestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestScope")
            .field("name", &self.name())
            .field("failed", &self.failed())
            .field("pending_teardowns", &self.pending_teardowns())
            .finish()
    }
}

impl fmt::Display for TestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scope_is_passing() {
        let scope = TestScope::new("fresh");
        assert_eq!(scope.name(), "fresh");
        assert!(!scope.failed());
        assert_eq!(scope.pending_teardowns(), 0);
    }

    #[test]
    fn test_fail_is_shared_between_clones() {
        let scope = TestScope::new("shared");
        let clone = scope.clone();
        clone.fail();
        assert!(scope.failed());
    }

    #[test]
    fn test_warn_does_not_fail_scope() {
        let scope = TestScope::new("warned");
        scope.warn("could not close connection");
        assert!(!scope.failed());
        assert_eq!(scope.logs(), vec!["could not close connection"]);
    }

    #[test]
    fn test_outcome_for_result() {
        let ok: Result<(), String> = Ok(());
        let err: Result<(), String> = Err("boom".to_string());
        assert_eq!(ok.failure(), None);
        assert_eq!(err.failure(), Some("boom".to_string()));
        assert_eq!(().failure(), None);
    }

    #[test]
    fn test_panic_message_payloads() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_teardown_error_marks_failed() {
        let scope = TestScope::new("teardown_error");
        scope.cleanup(|_| async {
            Err::<(), _>(ScratchError::invalid_name("x", "broken on purpose"))
        });
        let err = scope.run_cleanups().await.unwrap_err();
        assert!(scope.failed());
        assert!(err.to_string().contains("broken on purpose"));
    }
}
