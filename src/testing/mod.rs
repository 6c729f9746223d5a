//! Test doubles for the broker seam and the tick scheduler.

pub mod mocks;

pub use mocks::{
    ManualTicker, MockBroker, MockChannel, MockConnection, MockConnector, PublishedMessage,
    TickTrigger, manual_ticker,
};
