use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use super::{MessageBus, Queue};
use crate::error::ApiError;

/// Spawn a long-lived consumer that parses each delivery as JSON and feeds
/// it to a handler.
///
/// Acknowledgement policy:
/// - handler succeeded: ack
/// - body failed to parse: nack without requeue (the payload will never
///   become valid)
/// - handler returned a transient error: nack with requeue
/// - handler returned any other error: ack and log loudly; redelivery
///   would fail the same way
pub fn spawn_json_consumer<T, F, Fut>(
    bus: Arc<dyn MessageBus>,
    queue: Queue,
    prefetch: u16,
    handler: F,
) -> JoinHandle<()>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ApiError>> + Send,
{
    tokio::spawn(async move {
        let mut stream = match bus.subscribe(queue, prefetch).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(queue = %queue, error = %e, "failed to subscribe");
                return;
            }
        };

        tracing::info!(queue = %queue, "consumer started");

        while let Some(delivery) = stream.next().await {
            let payload: T = match serde_json::from_slice(&delivery.body) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(
                        queue = %queue,
                        error = %e,
                        "discarding unparseable message"
                    );
                    if let Err(e) = delivery.nack(false).await {
                        tracing::warn!(queue = %queue, error = %e, "nack failed");
                    }
                    continue;
                }
            };

            match handler(payload).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack().await {
                        tracing::warn!(queue = %queue, error = %e, "ack failed");
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        queue = %queue,
                        error = %e,
                        "transient handler failure, requeueing"
                    );
                    if let Err(e) = delivery.nack(true).await {
                        tracing::warn!(queue = %queue, error = %e, "nack failed");
                    }
                }
                Err(e) => {
                    tracing::error!(
                        queue = %queue,
                        error = %e,
                        "dropping message after permanent handler failure"
                    );
                    if let Err(e) = delivery.ack().await {
                        tracing::warn!(queue = %queue, error = %e, "ack failed");
                    }
                }
            }
        }

        tracing::info!(queue = %queue, "consumer stopped");
    })
}
