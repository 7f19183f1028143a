use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::messaging::topology::Topology;
use crate::messaging::{
    encode, wait_for_shutdown, Acknowledgement, Broker, Delivery, MessageHandler,
};
use crate::models::message::AmqpMessage;

const PERSISTENT_DELIVERY_MODE: u8 = 2;
const CONSUMER_PREFETCH: u16 = 1;

/// AMQP 0-9-1 connection with a dedicated publishing channel. Every consumer
/// gets its own channel so the prefetch limit applies per consumer.
pub struct RabbitMq {
    connection: Connection,
    publisher: Channel,
    exchange: String,
    closed: AtomicBool,
}

impl RabbitMq {
    pub async fn connect(uri: &str, topology: &Topology) -> Result<Self, AppError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|err| AppError::Transport(format!("failed to dial broker: {err}")))?;
        let publisher = connection
            .create_channel()
            .await
            .map_err(|err| AppError::Transport(format!("failed to open channel: {err}")))?;

        let broker = Self {
            connection,
            publisher,
            exchange: topology.exchange.clone(),
            closed: AtomicBool::new(false),
        };

        if let Err(err) = broker.declare(topology).await {
            let _ = broker.close().await;
            return Err(err);
        }

        info!(exchange = %topology.exchange, "broker connected and topology declared");
        Ok(broker)
    }

    async fn declare(&self, topology: &Topology) -> Result<(), AppError> {
        self.publisher
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        for queue in &topology.queues {
            self.publisher
                .queue_declare(
                    &queue.name,
                    QueueDeclareOptions {
                        durable: true,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await?;

            for routing_key in &queue.routing_keys {
                self.publisher
                    .queue_bind(
                        &queue.name,
                        &topology.exchange,
                        routing_key,
                        QueueBindOptions::default(),
                        FieldTable::default(),
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Broker for RabbitMq {
    async fn publish(&self, routing_key: &str, message: &AmqpMessage) -> Result<(), AppError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Transport("channel is closed".to_string()));
        }

        let body = encode(message)?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE);

        self.publisher
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;

        debug!(
            exchange = %self.exchange,
            routing_key,
            owner_id = %message.owner_id,
            "message published"
        );
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn MessageHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError> {
        let channel = self.connection.create_channel().await?;
        channel
            .basic_qos(CONSUMER_PREFETCH, BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("{queue}-{}", Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, consumer_tag = %consumer_tag, "consumer started");

        loop {
            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(queue, "consumer stopped");
                    let _ = channel.close(200, "consumer shutdown").await;
                    return Ok(());
                }
                next = consumer.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(err)) => return Err(AppError::from(err)),
                None => return Err(AppError::Transport("consumer channel closed".to_string())),
            };

            let message = Delivery {
                routing_key: delivery.routing_key.as_str().to_string(),
                body: delivery.data.clone(),
                redelivered: delivery.redelivered,
            };

            // Handling and acknowledging are not raced against shutdown.
            let outcome = handler.handle(&message).await;
            match Acknowledgement::for_outcome(&outcome) {
                Acknowledgement::Ack => {
                    delivery.ack(BasicAckOptions::default()).await?;
                }
                Acknowledgement::Requeue => {
                    if let Err(err) = &outcome {
                        warn!(queue, error = %err, "message failed; requeueing");
                    }
                    delivery
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..BasicNackOptions::default()
                        })
                        .await?;
                }
                Acknowledgement::Reject => {
                    if let Err(err) = &outcome {
                        warn!(queue, error = %err, "message rejected");
                    }
                    delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..BasicNackOptions::default()
                        })
                        .await?;
                }
            }
        }
    }

    async fn close(&self) -> Result<(), AppError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.connection.close(200, "shutdown").await?;
        info!(exchange = %self.exchange, "broker connection closed");
        Ok(())
    }
}
