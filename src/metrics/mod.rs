use prometheus::{Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

pub mod server;

pub struct Metrics {
    pub messages_published_total: CounterVec,
    pub publish_failures_total: CounterVec,
    pub publish_duration_seconds: HistogramVec,
    pub reconnect_attempts_total: Counter,
    pub session_ready: Gauge,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let messages_published_total = CounterVec::new(
            Opts::new(
                "producer_messages_published_total",
                "Total number of records published",
            ),
            &["queue"],
        )?;

        let publish_failures_total = CounterVec::new(
            Opts::new(
                "producer_publish_failures_total",
                "Total number of ticks that failed to publish",
            ),
            &["queue", "error_type"],
        )?;

        let publish_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "producer_publish_duration_seconds",
                "Time taken by one publish tick",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["queue", "status"],
        )?;

        let reconnect_attempts_total = Counter::new(
            "producer_reconnect_attempts_total",
            "Total number of attempts to re-establish the broker session",
        )?;

        let session_ready = Gauge::new(
            "producer_session_ready",
            "1 when the broker session is usable, 0 otherwise",
        )?;

        registry.register(Box::new(messages_published_total.clone()))?;
        registry.register(Box::new(publish_failures_total.clone()))?;
        registry.register(Box::new(publish_duration_seconds.clone()))?;
        registry.register(Box::new(reconnect_attempts_total.clone()))?;
        registry.register(Box::new(session_ready.clone()))?;

        Ok(Arc::new(Self {
            messages_published_total,
            publish_failures_total,
            publish_duration_seconds,
            reconnect_attempts_total,
            session_ready,
            registry,
        }))
    }

    pub fn is_ready(&self) -> bool {
        self.session_ready.get() >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_all_families() {
        let metrics = Metrics::new().unwrap();
        metrics
            .messages_published_total
            .with_label_values(&["testQ"])
            .inc();
        metrics
            .publish_failures_total
            .with_label_values(&["testQ", "timeout"])
            .inc();
        metrics
            .publish_duration_seconds
            .with_label_values(&["testQ", "success"])
            .observe(0.01);

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        for expected in [
            "producer_messages_published_total",
            "producer_publish_failures_total",
            "producer_publish_duration_seconds",
            "producer_reconnect_attempts_total",
            "producer_session_ready",
        ] {
            assert!(names.iter().any(|name| name == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_readiness_follows_gauge() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.is_ready());
        metrics.session_ready.set(1.0);
        assert!(metrics.is_ready());
    }
}
