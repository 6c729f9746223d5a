use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use record_producer::config::Config;
use record_producer::messaging::{
    BrokerSession, IntervalTicker, Publisher, RabbitMqConnector, StartupError, Timeouts, source,
};
use record_producer::metrics::{Metrics, server::start_metrics_server};

const STOP_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    setup_panic_handler();
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    setup_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        service_name = %config.service_name,
        endpoint = %config.endpoint,
        queue = %config.queue.name,
        durable = config.queue.durable,
        interval_ms = config.publish_interval.as_millis() as u64,
        "Record producer starting"
    );

    let metrics = match Metrics::new() {
        Ok(metrics) => metrics,
        Err(e) => {
            eprintln!("Failed to create metrics: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(port) = config.metrics_port {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(metrics_clone, port).await {
                error!(error = %e, "Metrics server error");
            }
        });
    }

    let connector = Arc::new(RabbitMqConnector::new(config.service_name.clone()));

    let session = match BrokerSession::establish_until(
        connector.as_ref(),
        &config.endpoint,
        &config.queue,
        config.timeouts,
        shutdown_signal(),
    )
    .await
    {
        Ok(session) => session,
        Err(StartupError::Interrupted) => {
            warn!("Shutdown signal received during startup");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Broker startup failed");
            eprintln!("Failed to start producer: {}", e);
            std::process::exit(1);
        }
    };

    let publisher = Publisher::new(
        session,
        connector,
        config.endpoint.clone(),
        source::synthetic(),
        metrics,
    )
    .with_reconnect_policy(config.reconnect.clone())
    .with_app_id(config.service_name.clone());

    let handle = publisher.start(IntervalTicker::new(config.publish_interval));

    info!("Ready to publish records");

    shutdown_signal().await;

    warn!("Shutdown signal received, cleaning up...");

    match tokio::time::timeout(stop_deadline(config.timeouts), handle.stop()).await {
        Ok(Ok(stats)) => info!(
            published = stats.published,
            failed = stats.failed,
            "Publisher stopped"
        ),
        Ok(Err(e)) => error!(error = %e, "Publisher task failed"),
        Err(e) => warn!(error = ?e, "Publisher shutdown timeout"),
    }

    info!("Record producer stopped");
}

// An in-flight publish plus closing a stale session and a fresh one.
fn stop_deadline(timeouts: Timeouts) -> Duration {
    timeouts.operation * 5 + STOP_GRACE
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn setup_logging(rust_log: &str) {
    let filter = EnvFilter::try_new(rust_log).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(panic.message = message, panic.location = %location, "Producer panicked");
        eprintln!(
            "PANIC: {} at {} (thread {:?})",
            message,
            location,
            std::thread::current().name()
        );
    }));
}
