//! # roomhubd: the roomhub daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Load configuration (`roomhub.toml` plus environment overrides)
//! - Initialise logging
//! - Initialise the `SQLite` connection pool and run migrations
//! - Register the device adapters and seed them with stored controllers
//! - Construct the engine (action executor, workflow executor, trigger
//!   dispatcher, dimmer scheduler) around the repository and notification bus
//! - Spawn the background loops and the HTTP server
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use roomhub_adapter_http_axum::AppState;
use roomhub_adapter_storage_sqlite_sqlx::SqliteRepository;
use roomhub_adapter_virtual::{SensorFeed, VirtualControllerAdapter};
use roomhub_app::action_executor::ActionExecutor;
use roomhub_app::dimmer_scheduler::DimmerScheduler;
use roomhub_app::execution_locks::ExecutionLocks;
use roomhub_app::notification_bus::InProcessNotificationBus;
use roomhub_app::ports::{AdapterRegistry, Notification};
use roomhub_app::sensor_cache::SensorCache;
use roomhub_app::trigger_dispatcher::TriggerDispatcher;
use roomhub_app::workflow_executor::WorkflowExecutor;

use crate::config::Config;

const NOTIFICATION_CAPACITY: usize = 256;
const READING_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.logging.filter))
        .init();

    // Database
    let db = roomhub_adapter_storage_sqlite_sqlx::Config {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let repo = Arc::new(SqliteRepository::new(db.pool().clone()));

    // Notifications
    let bus = Arc::new(InProcessNotificationBus::new(NOTIFICATION_CAPACITY));
    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(log_notifications(
        bus.subscribe(),
        shutdown.clone(),
    )));

    // Device adapters
    let controllers = repo.list_controllers().await?;
    let mut registry = AdapterRegistry::new();
    if config.integrations.virtual_enabled {
        registry.register(Arc::new(VirtualControllerAdapter::seeded(&controllers)));
    }
    info!(brands = ?registry.brands(), controllers = controllers.len(), "device adapters registered");

    // Engine
    let cache = Arc::new(SensorCache::new(config.staleness_window()?));
    let actions = Arc::new(
        ActionExecutor::new(Arc::clone(&repo), Arc::clone(&bus), registry)
            .with_policy(config.retry_policy())
            .with_command_timeout(config.command_timeout()),
    );
    let executor = Arc::new(WorkflowExecutor::new(
        Arc::clone(&repo),
        Arc::clone(&bus),
        Arc::clone(&actions),
        Arc::clone(&cache),
        Arc::new(ExecutionLocks::new()),
        shutdown.clone(),
    ));
    let dispatcher = Arc::new(TriggerDispatcher::new(
        Arc::clone(&repo),
        executor,
        Arc::clone(&cache),
        shutdown.clone(),
    ));
    let dimmer = Arc::new(DimmerScheduler::new(
        Arc::clone(&repo),
        Arc::clone(&bus),
        Arc::clone(&actions),
        config.dimmer_settings()?,
    ));

    // Background loops
    let (readings_tx, readings_rx) = mpsc::channel(READING_QUEUE_CAPACITY);
    tasks.push(tokio::spawn(
        Arc::clone(&dispatcher).run(readings_rx, config.reload_interval()),
    ));
    {
        let dimmer = Arc::clone(&dimmer);
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move { dimmer.run(shutdown).await }));
    }
    if config.integrations.virtual_enabled {
        let feed = SensorFeed::for_controllers(config.sensor_interval(), &controllers);
        tasks.push(tokio::spawn(feed.run(readings_tx.clone(), shutdown.clone())));
    }

    // HTTP
    let state = AppState::new(dispatcher, cache, readings_tx);
    let app = roomhub_adapter_http_axum::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("roomhubd listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    for task in tasks {
        if let Err(err) = task.await {
            error!(error = %err, "background task panicked");
        }
    }
    actions.disconnect_all().await;
    info!("roomhubd stopped");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM, cancelling `shutdown` so every background
/// loop winds down alongside the HTTP server.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
        () = shutdown.cancelled() => {}
    }
    info!("shutdown requested");
    shutdown.cancel();
}

async fn log_notifications(
    mut notifications: broadcast::Receiver<Notification>,
    shutdown: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            () = shutdown.cancelled() => break,
            received = notifications.recv() => match received {
                Ok(notification) => notification,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification log lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        match &notification {
            Notification::ExecutionFinished(outcome) => info!(
                workflow_id = %outcome.workflow_id,
                execution_id = %outcome.execution_id,
                trigger = %outcome.trigger_node_id,
                status = %outcome.status,
                reason = ?outcome.reason,
                actions = outcome.actions.len(),
                "execution finished"
            ),
            Notification::ActionReported(report) if !report.success => warn!(
                controller_id = ?report.controller_id,
                port = ?report.port,
                command = %report.command,
                attempts = report.attempts,
                error = ?report.error,
                "action failed"
            ),
            Notification::ActionReported(_) => {}
            Notification::DimmerFailureAlert {
                config_id,
                controller_id,
                port,
                consecutive_failures,
                last_error,
            } => error!(
                %config_id,
                %controller_id,
                port,
                consecutive_failures,
                last_error = ?last_error,
                "dimmer keeps failing"
            ),
            Notification::DimmerRecovered {
                config_id,
                controller_id,
                port,
                failed_ticks,
            } => info!(%config_id, %controller_id, port, failed_ticks, "dimmer recovered"),
        }
    }
}
