//! Notification fan-out (spec.md §4.3 "Notifications", §5 dispatcher task).
//!
//! On an uptime state transition, or a give-up during projection, the caller
//! hands a `NotificationEvent` to this module's ingest mailbox. A background
//! task drains it, loads the currently enabled, subscribed providers, and
//! fans the event out to each provider's own bounded mailbox — so one slow
//! provider's dispatch latency cannot back up delivery to the others
//! (spec.md §5: "each provider has its own mailbox with a bounded capacity
//! and a drop-oldest policy on overflow"). A dedicated worker task drains
//! each provider's mailbox concurrently with the rest.
//!
//! The mailboxes are small ring buffers guarded by a mutex, generalized from
//! the reference crate's `oauth_states` bounded-`DashMap`-with-explicit-prune
//! idiom: instead of clearing everything once a capacity ceiling is hit,
//! the oldest undelivered event is dropped to make room for the newest.

use async_trait::async_trait;
use charon_types::{NotificationEvent, NotificationKind, NotificationProvider};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::store::Store;

const MAILBOX_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch failed: {0}")]
    Failed(String),
}

/// A transport for notification events. Implementations are injected;
/// this crate ships only `LoggingDispatcher`, which records the event
/// instead of delivering it anywhere (spec.md §1 non-goal: outbound
/// transports are external).
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(
        &self,
        provider: &NotificationProvider,
        event: &NotificationEvent,
    ) -> Result<(), DispatchError>;
}

pub struct LoggingDispatcher;

#[async_trait]
impl Dispatch for LoggingDispatcher {
    async fn dispatch(
        &self,
        provider: &NotificationProvider,
        event: &NotificationEvent,
    ) -> Result<(), DispatchError> {
        tracing::info!(
            provider = %provider.name,
            transport = %provider.transport,
            kind = ?event.kind,
            monitor_uuid = ?event.monitor_uuid,
            message = %event.message,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Inbound queue fed by `NotifyHandle::send`; the dispatch task drains this
/// and fans each event out to the per-provider mailboxes below.
struct IngestMailbox {
    queue: Mutex<VecDeque<NotificationEvent>>,
    notify: Notify,
}

/// One bounded, drop-oldest mailbox per `NotificationProvider`. Events carry
/// the provider snapshot taken at fan-out time so the worker never needs to
/// re-query the store.
struct ProviderMailbox {
    queue: Mutex<VecDeque<(NotificationProvider, NotificationEvent)>>,
    notify: Notify,
}

fn push_bounded<T>(queue: &Mutex<VecDeque<T>>, notify: &Notify, item: T, on_drop: impl FnOnce()) {
    let mut guard = queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if guard.len() >= MAILBOX_CAPACITY {
        guard.pop_front();
        on_drop();
    }
    guard.push_back(item);
    drop(guard);
    notify.notify_one();
}

/// A cheap handle for enqueuing events from any task.
#[derive(Clone)]
pub struct NotifyHandle {
    ingest: Arc<IngestMailbox>,
}

impl NotifyHandle {
    /// Best-effort enqueue: never blocks, drops the oldest queued event
    /// when the mailbox is full (spec.md §4.3 "failure to deliver does not
    /// block scheduling").
    pub fn send(&self, event: NotificationEvent) {
        push_bounded(&self.ingest.queue, &self.ingest.notify, event, || {
            tracing::warn!("notification ingest mailbox full, dropped oldest event");
        });
    }
}

fn provider_subscribed(provider: &NotificationProvider, kind: NotificationKind) -> bool {
    match kind {
        NotificationKind::Uptime => provider.notify_uptime,
        NotificationKind::Certs | NotificationKind::Applyfailed => provider.notify_certs,
    }
}

/// Drains one provider's mailbox for as long as the dispatch task runs. Runs
/// as its own task so a slow or unreachable provider only delays its own
/// queue, never the other providers'.
async fn run_provider_worker(
    mailbox: Arc<ProviderMailbox>,
    dispatcher: Arc<dyn Dispatch>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let next = mailbox.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front();
        match next {
            Some((provider, event)) => {
                if let Err(err) = dispatcher.dispatch(&provider, &event).await {
                    tracing::warn!(provider = %provider.name, %err, "notification dispatch failed");
                }
            },
            None => {
                tokio::select! {
                    () = mailbox.notify.notified() => {}
                    _ = shutdown_rx.changed() => break,
                }
            },
        }
    }
}

/// Loads the currently enabled providers and pushes `event` onto the
/// mailbox of every one subscribed to its kind, spawning that provider's
/// drain worker the first time it's seen.
async fn fan_out(
    store: &Store,
    event: NotificationEvent,
    mailboxes: &mut HashMap<Uuid, Arc<ProviderMailbox>>,
    dispatcher: &Arc<dyn Dispatch>,
    shutdown_rx: &watch::Receiver<bool>,
    workers: &mut JoinSet<()>,
) {
    let providers = match store.notifications().list_enabled().await {
        Ok(p) => p,
        Err(err) => {
            tracing::error!(%err, "failed to load notification providers");
            return;
        },
    };

    for provider in providers.into_iter().filter(|p| provider_subscribed(p, event.kind)) {
        let mailbox = Arc::clone(mailboxes.entry(provider.uuid).or_insert_with(|| {
            let mailbox = Arc::new(ProviderMailbox { queue: Mutex::new(VecDeque::new()), notify: Notify::new() });
            workers.spawn(run_provider_worker(Arc::clone(&mailbox), Arc::clone(dispatcher), shutdown_rx.clone()));
            mailbox
        }));
        let provider_name = provider.name.clone();
        push_bounded(&mailbox.queue, &mailbox.notify, (provider, event.clone()), || {
            tracing::warn!(provider = %provider_name, "provider notification mailbox full, dropped oldest event");
        });
    }
}

/// Spawns the fan-out task. Returns a handle to enqueue events, a shutdown
/// switch, and the task's join handle; the join handle resolves only after
/// every per-provider worker it spawned has also drained and exited.
pub fn spawn_dispatch_task(
    store: Store,
    dispatcher: Arc<dyn Dispatch>,
) -> (NotifyHandle, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let ingest = Arc::new(IngestMailbox { queue: Mutex::new(VecDeque::new()), notify: Notify::new() });
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let handle = {
        let ingest = Arc::clone(&ingest);
        let worker_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut mailboxes: HashMap<Uuid, Arc<ProviderMailbox>> = HashMap::new();
            let mut workers: JoinSet<()> = JoinSet::new();

            loop {
                let next = ingest.queue.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front();
                match next {
                    Some(event) => {
                        fan_out(&store, event, &mut mailboxes, &dispatcher, &worker_shutdown, &mut workers).await;
                    },
                    None => {
                        tokio::select! {
                            () = ingest.notify.notified() => {}
                            _ = shutdown_rx.changed() => {
                                tracing::info!("notification dispatch task shutting down");
                                break;
                            }
                        }
                    },
                }
            }

            while workers.join_next().await.is_some() {}
        })
    };

    (NotifyHandle { ingest }, shutdown_tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: NotificationKind) -> NotificationEvent {
        NotificationEvent {
            kind,
            monitor_uuid: None,
            old_state: None,
            new_state: None,
            at: chrono::Utc::now(),
            message: "test".into(),
        }
    }

    fn provider(notify_uptime: bool, notify_certs: bool) -> NotificationProvider {
        NotificationProvider {
            uuid: Uuid::new_v4(),
            name: "p".into(),
            transport: "webhook".into(),
            notify_uptime,
            notify_certs,
            enabled: true,
        }
    }

    #[test]
    fn uptime_events_only_reach_uptime_subscribers() {
        let uptime_sub = provider(true, false);
        let certs_sub = provider(false, true);
        assert!(provider_subscribed(&uptime_sub, NotificationKind::Uptime));
        assert!(!provider_subscribed(&certs_sub, NotificationKind::Uptime));
    }

    #[test]
    fn applyfailed_routes_through_certs_subscription() {
        let certs_sub = provider(false, true);
        assert!(provider_subscribed(&certs_sub, NotificationKind::Applyfailed));
    }

    #[test]
    fn ingest_mailbox_drops_oldest_when_full() {
        let ingest = Arc::new(IngestMailbox { queue: Mutex::new(VecDeque::new()), notify: Notify::new() });
        let handle = NotifyHandle { ingest };
        for _ in 0..(MAILBOX_CAPACITY + 5) {
            handle.send(event(NotificationKind::Uptime));
        }
        let queue = handle.ingest.queue.lock().unwrap();
        assert_eq!(queue.len(), MAILBOX_CAPACITY);
    }

    #[test]
    fn provider_mailboxes_are_independent() {
        let mailbox_a = Arc::new(ProviderMailbox { queue: Mutex::new(VecDeque::new()), notify: Notify::new() });
        let mailbox_b = Arc::new(ProviderMailbox { queue: Mutex::new(VecDeque::new()), notify: Notify::new() });

        for _ in 0..(MAILBOX_CAPACITY + 5) {
            push_bounded(&mailbox_a.queue, &mailbox_a.notify, (provider(true, false), event(NotificationKind::Uptime)), || {});
        }
        push_bounded(&mailbox_b.queue, &mailbox_b.notify, (provider(true, false), event(NotificationKind::Uptime)), || {});

        assert_eq!(mailbox_a.queue.lock().unwrap().len(), MAILBOX_CAPACITY);
        assert_eq!(mailbox_b.queue.lock().unwrap().len(), 1);
    }
}
