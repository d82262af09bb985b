//! Uptime Monitor Scheduler (spec.md §4.3).
//!
//! A single background task ticks on a fixed cadence, syncing the monitor
//! set against current `ProxyHost`s, selecting due monitors, and running
//! checks through a bounded worker pool so one slow target cannot starve
//! others. Grounded on the reference crate's `scheduler::warmup::start`
//! tick loop and the `api::accounts::add_account_by_token` `JoinSet`
//! fan-out, generalized with a `Semaphore` permit per in-flight check, and
//! the health monitor's `tokio::sync::watch` shutdown switch.

pub mod checker;

use crate::notify::NotifyHandle;
use crate::store::Store;
use charon_types::{
    HeartbeatStatus, MonitorState, MonitorType, NotificationEvent, NotificationKind, ProxyHost,
    UptimeHeartbeat, UptimeMonitor,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

const DEFAULT_WORKER_POOL: usize = 16;
const DEFAULT_INTERVAL_SECONDS: u32 = 60;
const DEFAULT_MAX_RETRIES: u32 = 2;

const PRUNE_INTERVAL: Duration = Duration::from_secs(86400);

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub worker_pool_size: usize,
    /// How long a heartbeat survives before the daily prune task deletes
    /// it (spec.md §3 ADDED retention policy).
    pub heartbeat_retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(60),
            worker_pool_size: DEFAULT_WORKER_POOL,
            heartbeat_retention: Duration::from_secs(30 * 86400),
        }
    }
}

async fn prune_heartbeats(store: &Store, retention: Duration) {
    match store.uptime().prune_heartbeats_older_than(retention).await {
        Ok(0) => {},
        Ok(pruned) => tracing::info!(pruned, "pruned stale uptime heartbeats"),
        Err(err) => tracing::error!(%err, "heartbeat prune failed"),
    }
}

/// spec.md §4.3 step 1: one monitor per enabled `ProxyHost`, created when
/// missing, re-enabled when the host comes back, disabled (never deleted,
/// so heartbeat history survives) when its host is gone or disabled.
pub async fn sync_monitors(store: &Store) -> Result<(), sqlx::Error> {
    let hosts = store.proxy_hosts().list().await?;
    let monitors = store.uptime().list().await?;

    let mut by_host: HashMap<Uuid, UptimeMonitor> =
        monitors.into_iter().filter_map(|m| m.proxy_host_uuid.map(|h| (h, m))).collect();

    for host in hosts.iter().filter(|h| h.enabled) {
        match by_host.remove(&host.uuid) {
            None => store.uptime().upsert(&derive_monitor(host)).await?,
            Some(mut existing) if !existing.enabled => {
                existing.enabled = true;
                store.uptime().upsert(&existing).await?;
            },
            Some(_) => {},
        }
    }

    for mut orphan in by_host.into_values() {
        if orphan.enabled {
            orphan.enabled = false;
            store.uptime().upsert(&orphan).await?;
        }
    }

    Ok(())
}

fn derive_monitor(host: &ProxyHost) -> UptimeMonitor {
    let scheme = if host.ssl_forced { "https" } else { "http" };
    let target = host.primary_domain().map_or_else(
        || host.forward_target_url(),
        |domain| format!("{scheme}://{domain}"),
    );

    UptimeMonitor {
        uuid: Uuid::new_v4(),
        name: host.primary_domain().unwrap_or(&host.name).to_string(),
        kind: if host.ssl_forced { MonitorType::Https } else { MonitorType::Http },
        url: target,
        interval_seconds: DEFAULT_INTERVAL_SECONDS,
        max_retries: DEFAULT_MAX_RETRIES,
        enabled: true,
        last_state: MonitorState::Unknown,
        last_latency_ms: None,
        last_checked_at: None,
        proxy_host_uuid: Some(host.uuid),
        consecutive_failures: 0,
    }
}

/// Result of folding a check outcome into a monitor's retry window
/// (spec.md §4.3 "Retry & state transitions"): `Down` is only entered
/// after `max_retries + 1` consecutive failures, `Up` after one success.
struct FoldedResult {
    new_state: MonitorState,
    consecutive_failures: u32,
    transitioned: bool,
}

fn fold_outcome(monitor: &UptimeMonitor, status: HeartbeatStatus) -> FoldedResult {
    match status {
        HeartbeatStatus::Up => FoldedResult {
            new_state: MonitorState::Up,
            consecutive_failures: 0,
            transitioned: monitor.last_state != MonitorState::Up,
        },
        HeartbeatStatus::Down => {
            let failures = monitor.consecutive_failures + 1;
            let threshold = monitor.max_retries + 1;
            if failures >= threshold {
                FoldedResult {
                    new_state: MonitorState::Down,
                    consecutive_failures: failures,
                    transitioned: monitor.last_state != MonitorState::Down,
                }
            } else {
                FoldedResult {
                    new_state: monitor.last_state,
                    consecutive_failures: failures,
                    transitioned: false,
                }
            }
        },
    }
}

/// Runs one monitor's check, persists the result, and returns a
/// notification event iff this check crossed a state-transition edge.
async fn run_and_record(store: &Store, monitor: UptimeMonitor) -> Option<NotificationEvent> {
    let outcome = checker::run_check(&monitor).await;
    let now = chrono::Utc::now();

    let heartbeat = UptimeHeartbeat {
        monitor_uuid: monitor.uuid,
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        message: outcome.message.clone(),
        created_at: now,
    };

    let folded = fold_outcome(&monitor, outcome.status);

    if let Err(err) = store
        .uptime()
        .record_result(monitor.uuid, &heartbeat, folded.new_state, folded.consecutive_failures)
        .await
    {
        tracing::error!(%err, monitor = %monitor.name, "failed to persist uptime check result");
        return None;
    }

    if !folded.transitioned {
        return None;
    }

    tracing::info!(
        monitor = %monitor.name,
        from = ?monitor.last_state,
        to = ?folded.new_state,
        "uptime monitor state transition"
    );

    Some(NotificationEvent {
        kind: NotificationKind::Uptime,
        monitor_uuid: Some(monitor.uuid),
        old_state: Some(format!("{:?}", monitor.last_state).to_lowercase()),
        new_state: Some(format!("{:?}", folded.new_state).to_lowercase()),
        at: now,
        message: outcome.message.unwrap_or_else(|| format!("{} is now {:?}", monitor.name, folded.new_state)),
    })
}

/// One scheduler tick: sync, select due monitors, run them bounded by a
/// semaphore so at most `worker_pool_size` checks are in flight at once.
async fn run_tick(store: &Store, notify: &NotifyHandle, worker_pool_size: usize) {
    if let Err(err) = sync_monitors(store).await {
        tracing::error!(%err, "uptime monitor sync failed");
    }

    let due = match store.uptime().list_due(chrono::Utc::now()).await {
        Ok(monitors) => monitors,
        Err(err) => {
            tracing::error!(%err, "failed to list due uptime monitors");
            return;
        },
    };

    if due.is_empty() {
        return;
    }

    let semaphore = Arc::new(Semaphore::new(worker_pool_size));
    let mut tasks: JoinSet<Option<NotificationEvent>> = JoinSet::new();

    for monitor in due {
        let store = store.clone();
        let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore never closed");
        tasks.spawn(async move {
            let _permit = permit;
            run_and_record(&store, monitor).await
        });
    }

    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Some(event)) => notify.send(event),
            Ok(None) => {},
            Err(err) => tracing::error!(%err, "uptime check task panicked"),
        }
    }
}

/// Spawns the scheduler's tick loop. Returns a shutdown switch and the
/// task's join handle.
pub fn spawn_scheduler(
    store: Store,
    notify: NotifyHandle,
    config: SchedulerConfig,
) -> (tokio::sync::watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.tick_interval);
        let mut prune_ticker = tokio::time::interval(PRUNE_INTERVAL);
        prune_ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_tick(&store, &notify, config.worker_pool_size).await;
                }
                _ = prune_ticker.tick() => {
                    prune_heartbeats(&store, config.heartbeat_retention).await;
                }
                _ = shutdown_rx.changed() => {
                    tracing::info!("uptime scheduler shutting down");
                    break;
                }
            }
        }
    });

    (shutdown_tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(last_state: MonitorState, consecutive_failures: u32, max_retries: u32) -> UptimeMonitor {
        UptimeMonitor {
            uuid: Uuid::new_v4(),
            name: "m".into(),
            kind: MonitorType::Http,
            url: "http://example.com".into(),
            interval_seconds: 60,
            max_retries,
            enabled: true,
            last_state,
            last_latency_ms: None,
            last_checked_at: None,
            proxy_host_uuid: None,
            consecutive_failures,
        }
    }

    #[test]
    fn single_failure_does_not_flip_state_when_retries_remain() {
        let m = monitor(MonitorState::Up, 0, 2);
        let folded = fold_outcome(&m, HeartbeatStatus::Down);
        assert_eq!(folded.new_state, MonitorState::Up);
        assert!(!folded.transitioned);
        assert_eq!(folded.consecutive_failures, 1);
    }

    #[test]
    fn state_flips_down_after_max_retries_plus_one_failures() {
        let m = monitor(MonitorState::Up, 2, 2);
        let folded = fold_outcome(&m, HeartbeatStatus::Down);
        assert_eq!(folded.new_state, MonitorState::Down);
        assert!(folded.transitioned);
        assert_eq!(folded.consecutive_failures, 3);
    }

    #[test]
    fn single_success_recovers_from_down() {
        let m = monitor(MonitorState::Down, 5, 2);
        let folded = fold_outcome(&m, HeartbeatStatus::Up);
        assert_eq!(folded.new_state, MonitorState::Up);
        assert!(folded.transitioned);
        assert_eq!(folded.consecutive_failures, 0);
    }

    #[test]
    fn repeated_success_is_not_a_transition() {
        let m = monitor(MonitorState::Up, 0, 2);
        let folded = fold_outcome(&m, HeartbeatStatus::Up);
        assert!(!folded.transitioned);
    }
}
