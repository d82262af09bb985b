//! Shared application state.
//!
//! Grounded on the reference crate's `AppState{inner: Arc<AppStateInner>}`
//! shape, generalized from AI-proxy-account state to the control-plane's
//! own collaborators: the store, the projection engine, the Cerberus
//! security state, and the notification dispatcher.

use charon_core::cerberus::CerberusState;
use charon_core::notify::NotifyHandle;
use charon_core::projection::{ApplyTrigger, ProjectionEngine};
use charon_core::{Settings, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub store: Store,
    pub projection: Arc<ProjectionEngine>,
    pub apply: ApplyTrigger,
    pub cerberus: CerberusState,
    pub notify: NotifyHandle,
    pub settings: Arc<Settings>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(
        store: Store,
        projection: Arc<ProjectionEngine>,
        apply: ApplyTrigger,
        cerberus: CerberusState,
        notify: NotifyHandle,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                projection,
                apply,
                cerberus,
                notify,
                settings,
                started_at: chrono::Utc::now(),
            }),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn projection(&self) -> &Arc<ProjectionEngine> {
        &self.inner.projection
    }

    pub fn apply(&self) -> &ApplyTrigger {
        &self.inner.apply
    }
}
