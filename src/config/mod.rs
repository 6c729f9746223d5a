use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

mod endpoint;

pub use endpoint::{DEFAULT_ADDR, Endpoint};

use crate::messaging::{QueueDescriptor, ReconnectPolicy, Timeouts};

pub const DEFAULT_QUEUE_NAME: &str = "testQ";
pub const DEFAULT_SERVICE_NAME: &str = "record-producer";
const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 1000;
const DEFAULT_METRICS_PORT: u16 = 9090;

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Endpoint,
    pub queue: QueueDescriptor,
    pub publish_interval: Duration,
    pub timeouts: Timeouts,
    pub reconnect: ReconnectPolicy,
    /// `None` disables the metrics server.
    pub metrics_port: Option<u16>,
    pub service_name: String,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = Endpoint::resolve(lookup("MQADDR")).map_err(|e| {
            ConfigError::InvalidValue {
                name: "MQADDR",
                reason: e.to_string(),
            }
        })?;

        let queue_name = lookup("QUEUE_NAME")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());
        let durable = parse_bool(&lookup, "QUEUE_DURABLE")?.unwrap_or(false);

        let publish_interval = parse_millis(&lookup, "PUBLISH_INTERVAL_MS")?
            .unwrap_or(Duration::from_millis(DEFAULT_PUBLISH_INTERVAL_MS));

        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            connect: parse_millis(&lookup, "CONNECT_TIMEOUT_MS")?.unwrap_or(defaults.connect),
            operation: parse_millis(&lookup, "OPERATION_TIMEOUT_MS")?
                .unwrap_or(defaults.operation),
        };

        let mut reconnect = ReconnectPolicy::default();
        if let Some(base_delay) = parse_millis(&lookup, "RECONNECT_BASE_DELAY_MS")? {
            reconnect.base_delay = base_delay;
        }
        if let Some(max_delay) = parse_millis(&lookup, "RECONNECT_MAX_DELAY_MS")? {
            reconnect.max_delay = max_delay;
        }
        reconnect.max_attempts = parse::<u32, _>(&lookup, "RECONNECT_MAX_ATTEMPTS")?;
        if reconnect.max_delay < reconnect.base_delay {
            return Err(ConfigError::InvalidValue {
                name: "RECONNECT_MAX_DELAY_MS",
                reason: "must not be smaller than RECONNECT_BASE_DELAY_MS".to_string(),
            });
        }

        let metrics_port = match parse::<u16, _>(&lookup, "METRICS_PORT")? {
            Some(0) => None,
            Some(port) => Some(port),
            None => Some(DEFAULT_METRICS_PORT),
        };

        let service_name = lookup("SERVICE_NAME")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            endpoint,
            queue: QueueDescriptor::new(queue_name, durable),
            publish_interval,
            timeouts,
            reconnect,
            metrics_port,
            service_name,
            rust_log,
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name,
                reason: format!("'{raw}': {e}"),
            }),
    }
}

// Zero is rejected: every duration here drives a timer or a deadline.
fn parse_millis<F>(lookup: &F, name: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse::<u64, _>(lookup, name)? {
        Some(0) => Err(ConfigError::InvalidValue {
            name,
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other.map(Duration::from_millis)),
    }
}

fn parse_bool<F>(lookup: &F, name: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };

    match raw.trim().to_lowercase().as_str() {
        "" => Ok(None),
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidValue {
            name,
            reason: format!("'{raw}' is not a boolean"),
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}
