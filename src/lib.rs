//! Record producer for RabbitMQ.
//!
//! Connects to a broker, declares a queue and publishes JSON-encoded records
//! on a fixed cadence. The publish loop survives failed ticks and re-establishes
//! a broken session with exponential backoff.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use record_producer::config::Endpoint;
//! use record_producer::messaging::{
//!     source, BrokerSession, IntervalTicker, Publisher, QueueDescriptor, RabbitMqConnector,
//!     Timeouts,
//! };
//! use record_producer::metrics::Metrics;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::resolve(None)?;
//! let connector = Arc::new(RabbitMqConnector::new("docs"));
//! let queue = QueueDescriptor::new("testQ", false);
//!
//! let session =
//!     BrokerSession::establish(connector.as_ref(), &endpoint, &queue, Timeouts::default())
//!         .await?;
//! let handle = Publisher::new(session, connector, endpoint, source::synthetic(), Metrics::new()?)
//!     .start(IntervalTicker::new(Duration::from_secs(1)));
//!
//! let stats = handle.stop().await?;
//! println!("published {} records", stats.published);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod contracts;
pub mod messaging;
pub mod metrics;
pub mod testing;
