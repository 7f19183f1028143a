use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::messaging::topology::{topic_matches, QueueBinding, Topology};
use crate::messaging::{
    encode, wait_for_shutdown, Acknowledgement, Broker, Delivery, MessageHandler,
};
use crate::models::message::AmqpMessage;

struct MemoryQueue {
    binding: QueueBinding,
    ready: Mutex<VecDeque<Delivery>>,
    rejected: Mutex<Vec<Delivery>>,
    notify: Notify,
}

impl MemoryQueue {
    fn new(binding: QueueBinding) -> Self {
        Self {
            binding,
            ready: Mutex::new(VecDeque::new()),
            rejected: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    fn accepts(&self, routing_key: &str) -> bool {
        self.binding
            .routing_keys
            .iter()
            .any(|pattern| topic_matches(pattern, routing_key))
    }

    async fn push_back(&self, delivery: Delivery) {
        self.ready.lock().await.push_back(delivery);
        self.notify.notify_one();
    }

    async fn requeue(&self, mut delivery: Delivery) {
        delivery.redelivered = true;
        self.ready.lock().await.push_front(delivery);
        self.notify.notify_one();
    }

    /// Waits for the next ready message; `None` once the broker is closed.
    async fn next_ready(&self, closed: &AtomicBool) -> Option<Delivery> {
        loop {
            let notified = self.notify.notified();
            if closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(delivery) = self.ready.lock().await.pop_front() {
                return Some(delivery);
            }
            notified.await;
        }
    }
}

/// Process-local topic exchange with the same delivery rules as the AMQP
/// broker: prefetch of one per consumer, manual acknowledgement and requeue
/// to the head of the queue.
pub struct InMemoryBroker {
    exchange: String,
    queues: Vec<Arc<MemoryQueue>>,
    closed: AtomicBool,
    publish_faults: AtomicUsize,
}

impl InMemoryBroker {
    pub fn new(topology: &Topology) -> Self {
        info!(
            exchange = %topology.exchange,
            queues = topology.queues.len(),
            "in-memory broker topology declared"
        );

        Self {
            exchange: topology.exchange.clone(),
            queues: topology
                .queues
                .iter()
                .cloned()
                .map(|binding| Arc::new(MemoryQueue::new(binding)))
                .collect(),
            closed: AtomicBool::new(false),
            publish_faults: AtomicUsize::new(0),
        }
    }

    fn queue(&self, name: &str) -> Result<&Arc<MemoryQueue>, AppError> {
        self.queues
            .iter()
            .find(|queue| queue.binding.name == name)
            .ok_or_else(|| AppError::Transport(format!("queue {name} is not declared")))
    }

    /// Makes the next `count` publishes fail with a transport error.
    pub fn fail_next_publishes(&self, count: usize) {
        self.publish_faults.store(count, Ordering::SeqCst);
    }

    /// Removes and returns every message waiting in `queue`.
    pub async fn drain(&self, queue: &str) -> Result<Vec<Delivery>, AppError> {
        let queue = self.queue(queue)?;
        Ok(queue.ready.lock().await.drain(..).collect())
    }

    pub async fn depth(&self, queue: &str) -> Result<usize, AppError> {
        Ok(self.queue(queue)?.ready.lock().await.len())
    }

    /// Messages a consumer rejected without requeue.
    pub async fn rejected(&self, queue: &str) -> Result<Vec<Delivery>, AppError> {
        Ok(self.queue(queue)?.rejected.lock().await.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, routing_key: &str, message: &AmqpMessage) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(AppError::Transport("channel is closed".to_string()));
        }

        if self
            .publish_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::Transport(format!(
                "publish to {} rejected",
                self.exchange
            )));
        }

        let body = encode(message)?;
        let mut routed = 0;
        for queue in self.queues.iter().filter(|queue| queue.accepts(routing_key)) {
            queue
                .push_back(Delivery {
                    routing_key: routing_key.to_string(),
                    body: body.clone(),
                    redelivered: false,
                })
                .await;
            routed += 1;
        }

        debug!(
            exchange = %self.exchange,
            routing_key,
            owner_id = %message.owner_id,
            routed,
            "message published"
        );
        Ok(())
    }

    async fn consume(
        &self,
        queue_name: &str,
        handler: Arc<dyn MessageHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), AppError> {
        let queue = self.queue(queue_name)?.clone();
        info!(queue = queue_name, "consumer started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => {
                    info!(queue = queue_name, "consumer stopped");
                    return Ok(());
                }
                next = queue.next_ready(&self.closed) => match next {
                    Some(delivery) => delivery,
                    None => return Err(AppError::Transport("channel is closed".to_string())),
                },
            };

            // Handling and acknowledging are not raced against shutdown.
            let outcome = handler.handle(&delivery).await;
            match Acknowledgement::for_outcome(&outcome) {
                Acknowledgement::Ack => {}
                Acknowledgement::Requeue => {
                    if let Err(err) = &outcome {
                        warn!(queue = queue_name, error = %err, "message failed; requeueing");
                    }
                    queue.requeue(delivery).await;
                }
                Acknowledgement::Reject => {
                    if let Err(err) = &outcome {
                        warn!(queue = queue_name, error = %err, "message rejected");
                    }
                    queue.rejected.lock().await.push(delivery);
                }
            }
        }
    }

    async fn close(&self) -> Result<(), AppError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for queue in &self.queues {
            queue.notify.notify_waiters();
        }
        info!(exchange = %self.exchange, "in-memory broker closed");
        Ok(())
    }
}
