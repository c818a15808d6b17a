//! Trainable model backends
//!
//! The grid search drives any [`ModelBackend`]: something that can be fitted
//! on a feature matrix and target under one [`Configuration`], producing a
//! [`Predictor`]. Backends own their compute resources explicitly; callers
//! acquire them through a [`BackendSession`] before searching and the session
//! releases them when dropped.

use crate::error::{Result, TunerError};
use crate::optimizer::Configuration;
use ndarray::{Array1, Array2};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A fitted model; opaque beyond prediction
pub trait Predictor: Send + Sync {
    /// Predict one value per row of `x`
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// A trainable model implementation
pub trait ModelBackend: Send + Sync {
    /// Model produced by [`ModelBackend::fit`]
    type Model: Predictor;

    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// Reject configurations this backend cannot train, before any training starts
    fn validate(&self, _config: &Configuration) -> Result<()> {
        Ok(())
    }

    /// Acquire compute resources. Called once before a search.
    fn acquire(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release resources taken by [`ModelBackend::acquire`]
    fn release(&mut self) {}

    /// Run `op` on the backend's compute resources
    fn install<R, OP>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        op()
    }

    /// Fit a model; implementations poll `cancel` and stop early when it fires
    fn fit(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        config: &Configuration,
        cancel: &CancellationToken,
    ) -> Result<Self::Model>;
}

/// Scoped acquisition of a backend's resources
pub struct BackendSession<'a, B: ModelBackend> {
    backend: &'a mut B,
}

impl<'a, B: ModelBackend> BackendSession<'a, B> {
    /// Acquire `backend`; resources are released when the session drops
    pub fn acquire(backend: &'a mut B) -> Result<Self> {
        backend.acquire()?;
        tracing::debug!(backend = backend.name(), "Backend acquired");
        Ok(Self { backend })
    }
}

impl<B: ModelBackend> Deref for BackendSession<'_, B> {
    type Target = B;

    fn deref(&self) -> &B {
        self.backend
    }
}

impl<B: ModelBackend> Drop for BackendSession<'_, B> {
    fn drop(&mut self) {
        self.backend.release();
        tracing::debug!(backend = self.backend.name(), "Backend released");
    }
}

/// Cooperative cancellation with an optional deadline.
///
/// Clones share the cancel flag. [`CancellationToken::child_with_timeout`]
/// derives a token that also expires on its own deadline.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    started: Instant,
    deadline: Option<Instant>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline: None,
        }
    }

    /// Token sharing this one's flag that additionally expires after `timeout`
    pub fn child_with_timeout(&self, timeout: Option<Duration>) -> Self {
        let started = Instant::now();
        // A deadline past what `Instant` can hold never fires
        let own = timeout.and_then(|t| started.checked_add(t));
        let deadline = match (self.deadline, own) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            flag: Arc::clone(&self.flag),
            started,
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` or `Err(TimedOut)` once the token has fired
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(TunerError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(TunerError::TimedOut {
                    elapsed_ms: self.started.elapsed().as_millis(),
                });
            }
        }
        Ok(())
    }
}
