//! Charon Manager daemon entrypoint.
//!
//! Boot sequence: load settings, connect the store, run migrations, wire
//! the projection engine, Cerberus, the notification dispatcher, and the
//! uptime scheduler, then reconcile once before serving. Shutdown
//! cancels top-down per spec.md §5: stop accepting requests, cancel the
//! scheduler, await the projection task drain, close the store.

use anyhow::Context;
use charon_admin_client::{ClientConfig, DataPlaneClient};
use charon_core::cerberus::CerberusState;
use charon_core::notify::{spawn_dispatch_task, LoggingDispatcher};
use charon_core::projection::{spawn_apply_task, ProjectionEngine};
use charon_core::uptime::{spawn_scheduler, SchedulerConfig};
use charon_core::{logging, Settings, Store};
use charon_server::{router, shutdown, state::AppState};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("loading settings")?;
    logging::init_tracing(settings.log_json);

    tracing::info!(
        version = env!("GIT_VERSION"),
        commit = env!("GIT_COMMIT"),
        bind_addr = %settings.bind_addr,
        "charon-server starting"
    );

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(300))
        .connect(&settings.database_url)
        .await
        .context("connecting to database")?;
    let store = Store::new(pool);
    store.migrate().await.context("running migrations")?;

    if let Some(waf_mode) = settings.initial_waf_mode {
        let mut config = store.security().get_config().await.context("loading security config")?;
        if config.waf_mode != waf_mode {
            config.waf_mode = waf_mode;
            store.security().save_config(&config).await.context("seeding initial waf mode")?;
        }
    }

    let client = DataPlaneClient::new(ClientConfig {
        base_url: settings.data_plane_admin_url.clone(),
        ..ClientConfig::default()
    })
    .context("building data plane client")?;

    let settings = Arc::new(settings);

    let (notify, notify_shutdown, notify_task) =
        spawn_dispatch_task(store.clone(), Arc::new(LoggingDispatcher));

    let projection = Arc::new(ProjectionEngine::new(
        store.clone(),
        client,
        settings.rulesets_dir(),
        settings.acme_staging,
        notify.clone(),
    ));

    projection.startup_reconcile().await.context("startup reconcile")?;

    let (apply, apply_shutdown, apply_task) = spawn_apply_task(Arc::clone(&projection));

    let cerberus = CerberusState::load(store.clone(), settings.trusted_proxies.clone())
        .await
        .context("loading cerberus snapshot")?;
    let (cerberus_shutdown, cerberus_task) = charon_core::cerberus::spawn_refresh_task(cerberus.clone());

    let scheduler_config = SchedulerConfig {
        heartbeat_retention: settings.heartbeat_retention(),
        ..SchedulerConfig::default()
    };
    let (scheduler_shutdown, scheduler_task) =
        spawn_scheduler(store.clone(), notify.clone(), scheduler_config);

    charon_core::cerberus::metrics::install();

    let app_state = AppState::new(store.clone(), Arc::clone(&projection), apply, cerberus, notify, Arc::clone(&settings));
    let app = router::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await.context("binding listener")?;
    tracing::info!(addr = %settings.bind_addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("stopped accepting requests, cancelling background tasks");
    let _ = scheduler_shutdown.send(true);
    let _ = scheduler_task.await;

    let _ = apply_shutdown.send(true);
    let _ = apply_task.await;

    let _ = cerberus_shutdown.send(true);
    let _ = cerberus_task.await;

    let _ = notify_shutdown.send(true);
    let _ = notify_task.await;

    tracing::info!("shutdown complete");
    Ok(())
}
