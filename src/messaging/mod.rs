//! Broker topology: one durable topic exchange, durable queues bound by
//! routing key, publish and consume with manual acknowledgement.
//!
//! Two implementations share the [`Broker`] trait. [`amqp::RabbitMq`] talks
//! AMQP 0-9-1 to a real broker; [`memory::InMemoryBroker`] reproduces the same
//! routing, prefetch and redelivery rules inside the process.

pub mod amqp;
pub mod memory;
pub mod topology;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::AppError;
use crate::models::message::AmqpMessage;

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub routing_key: String,
    pub body: Vec<u8>,
    /// Set once the broker has handed this message out before.
    pub redelivered: bool,
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), AppError>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes `message` on the exchange under `routing_key`. Success means
    /// the channel accepted the write, not that anyone consumed it.
    async fn publish(&self, routing_key: &str, message: &AmqpMessage) -> Result<(), AppError>;

    /// Feeds `queue` to `handler` one message at a time until `shutdown`
    /// flips to true or the channel closes. The handler's result decides the
    /// acknowledgement, see [`Acknowledgement::for_outcome`].
    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError>;

    /// Closing twice is a no-op.
    async fn close(&self) -> Result<(), AppError>;
}

pub type SharedBroker = Arc<dyn Broker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Ack,
    /// Negative acknowledgement, message goes back on the queue.
    Requeue,
    /// Negative acknowledgement, message is dropped.
    Reject,
}

impl Acknowledgement {
    pub fn for_outcome(outcome: &Result<(), AppError>) -> Self {
        match outcome {
            Ok(()) => Acknowledgement::Ack,
            Err(err) if err.is_retryable() => Acknowledgement::Requeue,
            Err(_) => Acknowledgement::Reject,
        }
    }
}

pub(crate) fn encode(message: &AmqpMessage) -> Result<Vec<u8>, AppError> {
    Ok(serde_json::to_vec(message)?)
}

/// Resolves once `shutdown` holds `true` or its sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
