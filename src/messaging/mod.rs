pub mod broker;
pub mod channel;
pub mod codec;
pub mod connection;
pub mod publisher;
pub mod queue;
pub mod reconnect;
pub mod scheduler;
pub mod session;
pub mod source;

pub use broker::{BrokerChannel, BrokerConnection, Connector};
pub use channel::{ChannelError, ChannelProvider, RabbitMqChannel};
pub use codec::SerializationError;
pub use connection::{ConnectionError, RabbitMqConnection, RabbitMqConnector};
pub use publisher::{PublishError, Publisher, PublisherHandle, PublisherStats};
pub use queue::{DeclareError, QueueDescriptor, QueueHandle};
pub use reconnect::{ReconnectPolicy, RecoveryState};
pub use scheduler::{IntervalTicker, Ticker};
pub use session::{BrokerSession, StartupError, Timeouts};
