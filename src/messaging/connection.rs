use std::time::Duration;

use async_trait::async_trait;
use lapin::{Connection, ConnectionProperties};
use tracing::{error, info};

use super::broker::{BrokerConnection, Connector};
use super::channel::{ChannelError, ChannelProvider, RabbitMqChannel};
use crate::config::Endpoint;

#[derive(Debug, Clone)]
pub struct RabbitMqConnector {
    connection_name: String,
}

impl RabbitMqConnector {
    pub fn new(connection_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
        }
    }
}

#[async_trait]
impl Connector for RabbitMqConnector {
    type Connection = RabbitMqConnection;

    async fn connect(&self, endpoint: &Endpoint) -> Result<RabbitMqConnection, ConnectionError> {
        RabbitMqConnection::connect(endpoint, &self.connection_name).await
    }
}

pub struct RabbitMqConnection {
    connection: Connection,
    endpoint: Endpoint,
}

impl RabbitMqConnection {
    pub async fn connect(
        endpoint: &Endpoint,
        connection_name: &str,
    ) -> Result<Self, ConnectionError> {
        info!(endpoint = %endpoint, "Connecting to RabbitMQ");

        let properties =
            ConnectionProperties::default().with_connection_name(connection_name.into());

        let connection = Connection::connect(endpoint.as_str(), properties)
            .await
            .map_err(|e| {
                error!(error = %e, endpoint = %endpoint, "Failed to connect to RabbitMQ");
                ConnectionError::ConnectionFailed(e.to_string())
            })?;

        info!(endpoint = %endpoint, "Successfully connected to RabbitMQ");

        Ok(Self {
            connection,
            endpoint: endpoint.clone(),
        })
    }
}

#[async_trait]
impl BrokerConnection for RabbitMqConnection {
    type Channel = RabbitMqChannel;

    fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    async fn open_channel(&self) -> Result<RabbitMqChannel, ChannelError> {
        ChannelProvider::create_channel(&self.connection).await
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        info!(endpoint = %self.endpoint, "Shutting down RabbitMQ connection");

        self.connection
            .close(200, "Normal shutdown")
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to close RabbitMQ connection gracefully");
                ConnectionError::ShutdownFailed(e.to_string())
            })?;

        info!("RabbitMQ connection closed successfully");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Invalid broker endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to connect to RabbitMQ: {0}")]
    ConnectionFailed(String),

    #[error("Connecting to RabbitMQ timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Failed to shutdown connection gracefully: {0}")]
    ShutdownFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_port_fails_with_connection_error() {
        let endpoint = Endpoint::parse("127.0.0.1:1").unwrap();
        let connector = RabbitMqConnector::new("refused-test");

        let result =
            tokio::time::timeout(Duration::from_secs(5), connector.connect(&endpoint)).await;

        match result {
            Ok(Err(ConnectionError::ConnectionFailed(_))) | Err(_) => {}
            Ok(Err(other)) => panic!("unexpected error kind: {other}"),
            Ok(Ok(_)) => panic!("nothing should be listening on port 1"),
        }
    }
}
