pub mod amqp;
pub mod consume;
pub mod memory;

pub use amqp::AmqpBus;
pub use consume::spawn_json_consumer;
pub use memory::MemoryBus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{ScanStatus, Service, Target};

/// Name of the single durable direct exchange all queues bind to.
pub const EXCHANGE_NAME: &str = "scanner.direct";

/// The seven durable queues of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    Scan,
    Cancel,
    Status,
    Findings,
    Targets,
    Relations,
    Services,
}

impl Queue {
    pub const ALL: [Queue; 7] = [
        Queue::Scan,
        Queue::Cancel,
        Queue::Status,
        Queue::Findings,
        Queue::Targets,
        Queue::Relations,
        Queue::Services,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Queue::Scan => "scan_queue",
            Queue::Cancel => "cancel_queue",
            Queue::Status => "status_queue",
            Queue::Findings => "findings_queue",
            Queue::Targets => "targets_queue",
            Queue::Relations => "relations_queue",
            Queue::Services => "services_queue",
        }
    }

    pub fn routing_key(&self) -> &'static str {
        match self {
            Queue::Scan => "scan",
            Queue::Cancel => "cancel",
            Queue::Status => "status",
            Queue::Findings => "findings",
            Queue::Targets => "targets",
            Queue::Relations => "relations",
            Queue::Services => "services",
        }
    }
}

impl std::fmt::Display for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("bus is closed")]
    Closed,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Scan job published by the orchestrator and reserved by one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub scan_id: Uuid,
    pub scanner_type: String,
    pub targets: Vec<Target>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default = "crate::models::empty_object")]
    pub parameters: Value,
}

/// Best-effort cancellation request for a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub scan_id: Uuid,
}

/// Scan status update emitted by workers and applied by the status ingester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub scan_id: Uuid,
    pub status: ScanStatus,
    #[serde(default)]
    pub message: String,
}

/// Manual acknowledgement handle carried by every delivery.
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<(), BusError>;
    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), BusError>;
}

/// One message taken off a queue, pending manual acknowledgement.
pub struct Delivery {
    pub body: Vec<u8>,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self { body, acker }
    }

    pub async fn ack(self) -> Result<(), BusError> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<(), BusError> {
        self.acker.nack(requeue).await
    }
}

/// Blocking pull of the next delivery from a subscription.
#[async_trait]
pub trait MessageStream: Send {
    /// Returns `None` when the subscription has been closed.
    async fn next(&mut self) -> Option<Delivery>;
}

/// Minimal broker contract: declare-on-connect, publish persistent JSON
/// messages, consume with manual acknowledgement.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, queue: Queue, body: &[u8]) -> Result<(), BusError>;

    /// Subscribe with channel-level prefetch. Deliveries must be acked or
    /// nacked explicitly.
    async fn subscribe(
        &self,
        queue: Queue,
        prefetch: u16,
    ) -> Result<Box<dyn MessageStream>, BusError>;
}

/// Serialize and publish a payload to a queue.
pub async fn publish_json<T: Serialize + Sync>(
    bus: &dyn MessageBus,
    queue: Queue,
    payload: &T,
) -> Result<(), BusError> {
    let body = serde_json::to_vec(payload)?;
    bus.publish(queue, &body).await
}
