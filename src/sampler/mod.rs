//! Foreground sampler: periodic foreground-identity queries.
//!
//! [`ForegroundSampler::observe`] spawns a fresh sampling task and
//! returns a [`ForegroundStream`]. Each call starts from "now" with
//! fresh filter state; dropping the stream (or cancelling the parent
//! token) stops the task.
//!
//! Query failures, timeouts, and missing usage access all resolve to
//! an empty tick. The stream never ends because of a failed query.

pub mod filter;
pub mod x11;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::LockConfig;
use crate::lock::PermissionOracle;
use crate::model::{AppId, ForegroundEvent};

use filter::{Debouncer, ForegroundFilter};

/// Events buffered between the sampling task and the lock loop.
const STREAM_CAPACITY: usize = 16;

/// Errors from a foreground-identity query.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("display: {0}")]
    Display(String),
    #[error("process lookup: {0}")]
    Process(#[from] std::io::Error),
}

/// OS foreground-identity source.
///
/// Called from the blocking pool, so implementations may block.
pub trait ForegroundSource: Send + Sync {
    /// Identifier of the current foreground application, or `None` if
    /// it cannot be resolved right now.
    fn current(&self) -> Result<Option<String>, SourceError>;
}

/// Source used when no display is reachable. Every tick is empty.
pub struct NullSource;

impl ForegroundSource for NullSource {
    fn current(&self) -> Result<Option<String>, SourceError> {
        Ok(None)
    }
}

/// Sampler configuration shared by every spawned task.
#[derive(Clone)]
pub struct ForegroundSampler {
    source: Arc<dyn ForegroundSource>,
    permissions: Arc<dyn PermissionOracle>,
    filter: Arc<ForegroundFilter>,
    period: Duration,
    query_timeout: Duration,
    debounce: Duration,
    spacing: Duration,
}

impl ForegroundSampler {
    pub fn new(
        config: &LockConfig,
        source: Arc<dyn ForegroundSource>,
        permissions: Arc<dyn PermissionOracle>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            source,
            permissions,
            filter: Arc::new(ForegroundFilter::new(config)?),
            period: config.sample_period,
            query_timeout: config.query_timeout.min(config.sample_period),
            debounce: config.debounce,
            spacing: config.min_emit_spacing,
        })
    }

    /// Start sampling from now.
    ///
    /// The task stops when `parent` is cancelled or the returned stream
    /// is dropped.
    pub fn observe(&self, parent: &CancellationToken) -> ForegroundStream {
        let token = parent.child_token();
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        let sampler = self.clone();
        let task_token = token.clone();
        tokio::spawn(async move {
            sampler.run(tx, task_token).await;
            tracing::debug!("foreground sampling stopped");
        });
        tracing::debug!(period_ms = self.period.as_millis() as u64, "foreground sampling started");
        ForegroundStream {
            rx,
            _guard: token.drop_guard(),
        }
    }

    async fn run(self, tx: mpsc::Sender<ForegroundEvent>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut debouncer = Debouncer::new(self.debounce, self.spacing);

        loop {
            let deadline = debouncer.deadline();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(app) = self.sample_once().await {
                        debouncer.offer(app, Instant::now());
                    }
                }
                _ = sleep_until_opt(deadline) => {}
            }

            if let Some(event) = debouncer.poll(Instant::now()) {
                tracing::debug!(app = %event.app, "foreground changed");
                tokio::select! {
                    _ = token.cancelled() => break,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One query, bounded by the query timeout. Any failure is an
    /// empty tick.
    async fn sample_once(&self) -> Option<AppId> {
        if !self.permissions.has_usage_access() {
            tracing::trace!("usage access missing, tick skipped");
            return None;
        }

        let source = Arc::clone(&self.source);
        let query = tokio::task::spawn_blocking(move || source.current());
        let raw = match tokio::time::timeout(self.query_timeout, query).await {
            Ok(Ok(Ok(Some(raw)))) => raw,
            Ok(Ok(Ok(None))) => return None,
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "foreground query failed");
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "foreground query task failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "foreground query timed out"
                );
                return None;
            }
        };
        self.filter.admit(&raw)
    }
}

/// Handle to a running sampling task.
pub struct ForegroundStream {
    rx: mpsc::Receiver<ForegroundEvent>,
    _guard: DropGuard,
}

impl ForegroundStream {
    /// Next foreground change. Returns `None` only once the task stopped.
    pub async fn next(&mut self) -> Option<ForegroundEvent> {
        self.rx.recv().await
    }
}

/// Sleep until `deadline`, or forever if there is none.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
