//!
//! OCPP 1.5/1.6 central system for EV charging stations.
//! Reads configuration from TOML file (~/.config/voltaris-csms/config.toml).

use std::sync::Arc;

use tracing::{error, info};

use voltaris_csms::application::services::HeartbeatMonitor;
use voltaris_csms::config::{default_config_path, AppConfig};
use voltaris_csms::infrastructure::{
    InMemoryLockService, InMemoryStorage, LoggingNotifications, NoopBilling, NoopRoaming,
    NoopSmartCharging, OpenSiteAuthorization, SimpleTariffPricing, StaticTemplateCatalog,
    ThresholdInactivityClassifier,
};
use voltaris_csms::interfaces::soap;
use voltaris_csms::interfaces::ws::{CommandSender, OcppServer, SessionRegistry};
use voltaris_csms::support::clock::SystemClock;
use voltaris_csms::support::deferred::DeferredScheduler;
use voltaris_csms::support::shutdown::ShutdownSignal;
use voltaris_csms::OcppHandler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Load configuration ─────────────────────────────────────
    let config_path = std::env::var("VOLTARIS_CONFIG")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| default_config_path());
    let config = match AppConfig::load(&config_path) {
        Ok(config) => {
            init_logging(&config.logging.level);
            info!("Configuration loaded from {}", config_path.display());
            config
        }
        Err(e) => {
            let config = AppConfig::default();
            init_logging(&config.logging.level);
            error!("Failed to load config: {}. Using defaults.", e);
            config
        }
    };

    info!("Starting Voltaris CSMS core...");

    // ── Prometheus metrics recorder ────────────────────────────
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .install()
        .expect("Failed to install Prometheus metrics recorder");
    info!("Prometheus metrics recorder installed");

    // ── Shutdown coordination ──────────────────────────────────
    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_os_signals();

    // ── Wiring: in-memory infrastructure behind the ports ──────
    let storage = Arc::new(InMemoryStorage::new());
    let scheduler = DeferredScheduler::new(config.jobs.deferred_concurrency, shutdown.clone());
    let registry = SessionRegistry::shared();
    let commands = CommandSender::shared(registry.clone());
    let clock = Arc::new(SystemClock);

    let handler = Arc::new(OcppHandler {
        storage: storage.clone(),
        locks: Arc::new(InMemoryLockService::new()),
        pricing: Arc::new(SimpleTariffPricing::new(
            "0.30".parse().expect("static decimal"),
            "EUR",
        )),
        billing: Arc::new(NoopBilling),
        roaming: Arc::new(NoopRoaming),
        site_authorization: Arc::new(OpenSiteAuthorization),
        smart_charging: Arc::new(NoopSmartCharging),
        notifications: Arc::new(LoggingNotifications),
        templates: Arc::new(StaticTemplateCatalog::new()),
        inactivity: Arc::new(ThresholdInactivityClassifier::default()),
        commands: commands.clone(),
        scheduler: scheduler.clone(),
        clock: clock.clone(),
        config: config.clone(),
    });

    // ── Heartbeat monitor ──────────────────────────────────────
    let monitor = Arc::new(HeartbeatMonitor::new(
        storage,
        Arc::new(LoggingNotifications),
        clock,
        config.ocpp.max_last_seen_interval_secs,
    ));
    monitor.start(shutdown.clone());

    // ── Ingress carriers ───────────────────────────────────────
    let ws_server = OcppServer::new(
        config.server.clone(),
        handler.clone(),
        registry,
        commands,
        shutdown.clone(),
    );
    let ws_task = tokio::spawn(async move { ws_server.run().await });

    let soap_addr = format!("{}:{}", config.server.soap_host, config.server.soap_port);
    let soap_handler = handler.clone();
    let soap_shutdown = shutdown.clone();
    let soap_task =
        tokio::spawn(async move { soap::serve(&soap_addr, soap_handler, soap_shutdown).await });

    info!("All servers started. Press Ctrl+C to shutdown gracefully.");

    tokio::select! {
        result = ws_task => {
            match result {
                Ok(Ok(())) => info!("OCPP-J server stopped"),
                Ok(Err(e)) => error!("OCPP-J server error: {}", e),
                Err(e) => error!("OCPP-J server task panicked: {}", e),
            }
        }
        result = soap_task => {
            match result {
                Ok(Ok(())) => info!("OCPP-S server stopped"),
                Ok(Err(e)) => error!("OCPP-S server error: {}", e),
                Err(e) => error!("OCPP-S server task panicked: {}", e),
            }
        }
    }

    // Drain deferred work before exiting
    shutdown.trigger();
    let drained = scheduler
        .drain(std::time::Duration::from_secs(
            config.server.shutdown_timeout_secs,
        ))
        .await;
    if !drained {
        error!("Deferred work did not drain within the shutdown timeout");
    }

    info!("Voltaris CSMS shutdown complete");
    Ok(())
}

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}
