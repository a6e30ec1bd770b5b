//! Message-bus publish trait
//!
//! The daemon publishes each captured event as text to a topic named after
//! its registration identifier. Delivery guarantees beyond what the bus
//! itself provides are out of scope.

use crate::error::Result;
use async_trait::async_trait;

/// Publishes text payloads to named topics.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}
