//! Event queue consumption traits
//!
//! Each registration owns one FIFO event queue fed by its database trigger.
//! The daemon consumes binary payloads from the queue and forwards them to
//! the message bus. Queue order is strict FIFO per registration; no
//! ordering exists across registrations.

use crate::error::Result;
use crate::manager::Registration;
use async_trait::async_trait;
use bytes::Bytes;

/// A blocking consumer over one registration's event queue.
#[async_trait]
pub trait QueueConsumer: Send {
    /// Receive the next payload, waiting until one is available.
    ///
    /// Returns `Ok(None)` when the queue has been deleted or the
    /// connection closed; the route worker then unwinds.
    async fn recv(&mut self) -> Result<Option<Bytes>>;
}

/// Opens consumers for registrations' event queues.
#[async_trait]
pub trait QueueOpener: Send + Sync {
    async fn open(&self, registration: &Registration) -> Result<Box<dyn QueueConsumer>>;
}
