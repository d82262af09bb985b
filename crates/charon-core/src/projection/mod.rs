//! Configuration Projection Engine.
//!
//! Translates the persisted model into the data plane's JSON configuration
//! document and applies it atomically, recovering from transient data-plane
//! unavailability. Grounded on the reference crate's
//! `state::AppState::hot_reload_proxy_config` (snapshot-and-swap) and its
//! health monitor's `tokio::sync::watch` shutdown pattern, generalized from
//! a boolean flag to a coalescing apply request.

pub mod build;
mod rulesets;

use crate::notify::NotifyHandle;
use crate::store::Store;
use charon_admin_client::{ClientError, DataPlaneClient};
use charon_types::NotificationEvent;
use charon_types::NotificationKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("data plane unreachable: {0}")]
    DataPlaneUnreachable(String),

    #[error("data plane rejected config: {0}")]
    ApplyRejected(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("ruleset staging failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("apply timed out after {0:?}")]
    Timeout(Duration),

    /// Surfaced to a caller that coalesced onto another in-flight apply;
    /// carries that apply's error message rather than the original typed
    /// error, which the in-flight caller already logged.
    #[error("{0}")]
    ApplyFailed(String),
}

impl From<ClientError> for ProjectionError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Connection(msg) | ClientError::InvalidResponse(msg) => {
                Self::DataPlaneUnreachable(msg)
            },
            ClientError::Request(err) => Self::DataPlaneUnreachable(err.to_string()),
            ClientError::RetriesExhausted(attempts) => {
                Self::DataPlaneUnreachable(format!("gave up after {attempts} attempts"))
            },
            ClientError::ConfigRejected { status, message } => {
                Self::ApplyRejected(format!("{status}: {message}"))
            },
        }
    }
}

const APPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Ties the store, the data-plane client, and the on-disk rulesets
/// directory together into the five-step projection algorithm.
pub struct ProjectionEngine {
    store: Store,
    client: DataPlaneClient,
    rulesets_dir: PathBuf,
    acme_staging: bool,
    notify: NotifyHandle,
}

impl ProjectionEngine {
    pub fn new(
        store: Store,
        client: DataPlaneClient,
        rulesets_dir: PathBuf,
        acme_staging: bool,
        notify: NotifyHandle,
    ) -> Self {
        Self { store, client, rulesets_dir, acme_staging, notify }
    }

    pub async fn ping(&self) -> bool {
        self.client.ping().await.is_ok()
    }

    /// `ApplyConfig`: not retried here — user-initiated callers see the
    /// error directly (spec.md §4.1 failure semantics). Bounded to a total
    /// of 10s (spec.md §5); `DataPlaneClient::patch_config` has its own
    /// per-request timeout and retries, so this guards against their sum
    /// running long on a persistently slow data plane.
    pub async fn apply_config(&self) -> Result<(), ProjectionError> {
        match tokio::time::timeout(APPLY_TIMEOUT, self.apply_config_inner()).await {
            Ok(result) => result,
            Err(_) => Err(ProjectionError::Timeout(APPLY_TIMEOUT)),
        }
    }

    async fn apply_config_inner(&self) -> Result<(), ProjectionError> {
        let hosts = self.store.proxy_hosts().list().await?;
        let certs = self.store.certificates().list().await?;
        let security = self.store.security().get_config().await?;
        let all_rulesets = self.store.security().list_rulesets().await?;

        // Only the ruleset currently referenced by `waf_rules_source` is
        // staged; `rulesets::stage` prunes the files of any that drop out
        // of this slice, including a previous source left behind after a
        // switch (spec.md §4.1 step 4).
        let active_rulesets: Vec<_> = all_rulesets
            .into_iter()
            .filter(|r| security.waf_rules_source.as_deref() == Some(r.name.as_str()))
            .collect();

        let staged = rulesets::stage(&self.rulesets_dir, &active_rulesets).await?;
        let document = build::build_document(&hosts, &certs, &security, &staged, self.acme_staging);

        self.client.patch_config(&document).await?;
        Ok(())
    }

    /// `Reconcile`: best-effort wrapper for background contexts (boot,
    /// scheduler-triggered), retrying `ApplyConfig` with exponential
    /// backoff for a bounded wait before giving up. On give-up, emits a
    /// `NotificationEvent{kind: Applyfailed}` (spec.md §4.1 step 6) so
    /// subscribed providers learn about it without tailing logs.
    pub async fn reconcile(&self, reason: &str) -> Result<(), ProjectionError> {
        let deadline = Instant::now() + Duration::from_secs(30);
        let mut delay = Duration::from_millis(200);

        loop {
            match self.apply_config().await {
                Ok(()) => return Ok(()),
                Err(err) if Instant::now() < deadline => {
                    tracing::warn!(%err, reason, "reconcile attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                },
                Err(err) => {
                    tracing::error!(%err, reason, "reconcile gave up");
                    self.notify.send(NotificationEvent {
                        kind: NotificationKind::Applyfailed,
                        monitor_uuid: None,
                        old_state: None,
                        new_state: None,
                        at: chrono::Utc::now(),
                        message: format!("apply config failed ({reason}): {err}"),
                    });
                    return Err(err);
                },
            }
        }
    }

    /// Boot sequence: scrub invalid Let's-Encrypt references, wait for the
    /// data plane, then issue one `ApplyConfig` (via `reconcile`, since
    /// startup is a background context).
    pub async fn startup_reconcile(&self) -> Result<(), ProjectionError> {
        let cleared = self.store.certificates().clear_implicit_references().await?;
        if cleared > 0 {
            tracing::warn!(cleared, "cleared implicit certificate references at startup");
        }

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        while !self.ping().await {
            if Instant::now() >= deadline {
                tracing::error!("data plane unreachable at startup deadline, proceeding anyway");
                break;
            }
            ticker.tick().await;
        }

        self.reconcile("startup").await
    }
}

/// Outcome of one projection task pass, shared with every caller that
/// coalesced onto it.
type ApplyOutcome = Result<(), String>;

struct ApplyTriggerState {
    /// Bumped once per `request()` call; the background task re-runs
    /// `ApplyConfig` as long as this is ahead of `completed`, so a caller
    /// that enqueues mid-pass is guaranteed the *next* pass's result
    /// (spec.md §5), not a stale one from before it asked.
    requested: AtomicU64,
    wake: Notify,
    completed: Mutex<(u64, Option<ApplyOutcome>)>,
    completed_notify: Notify,
    /// Reason of the most recent `request()` call, logged by the
    /// background task; best-effort only, not part of the coalescing logic.
    last_reason: Mutex<String>,
}

/// Single-slot coalescing handle onto the one projection task (spec.md §5:
/// "no two applies interleave on the data plane"). Every handler-triggered
/// apply goes through `request`, which waits for that apply to land on the
/// data plane and returns its result, rather than calling
/// `ProjectionEngine::apply_config` directly.
#[derive(Clone)]
pub struct ApplyTrigger {
    state: Arc<ApplyTriggerState>,
}

impl ApplyTrigger {
    pub async fn request(&self, reason: impl Into<String>) -> Result<(), ProjectionError> {
        *self.state.last_reason.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = reason.into();
        let my_ticket = self.state.requested.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.wake.notify_one();

        loop {
            {
                let completed = self.state.completed.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                if completed.0 >= my_ticket {
                    return completed.1.clone().unwrap_or(Ok(())).map_err(ProjectionError::ApplyFailed);
                }
            }
            self.state.completed_notify.notified().await;
        }
    }
}

/// Spawns the single-slot coalescing apply task. Returns a trigger handle,
/// a shutdown switch, and the task's join handle.
pub fn spawn_apply_task(
    engine: Arc<ProjectionEngine>,
) -> (ApplyTrigger, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let state = Arc::new(ApplyTriggerState {
        requested: AtomicU64::new(0),
        wake: Notify::new(),
        completed: Mutex::new((0, None)),
        completed_notify: Notify::new(),
        last_reason: Mutex::new(String::new()),
    });
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let pending = state.requested.load(Ordering::SeqCst);
                let done = state.completed.lock().unwrap_or_else(std::sync::PoisonError::into_inner).0;

                if pending > done {
                    let reason = state.last_reason.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
                    let result = engine.apply_config().await;
                    if let Err(err) = &result {
                        tracing::error!(%err, reason, "projection apply failed");
                    }
                    let outcome: ApplyOutcome = result.map_err(|err| err.to_string());

                    let mut completed = state.completed.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    *completed = (pending, Some(outcome));
                    drop(completed);
                    state.completed_notify.notify_waiters();
                } else {
                    tokio::select! {
                        () = state.wake.notified() => {}
                        _ = shutdown_rx.changed() => {
                            tracing::info!("projection apply task shutting down");
                            break;
                        }
                    }
                }
            }
        })
    };

    (ApplyTrigger { state }, shutdown_tx, handle)
}
