// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Network publishing task
//!
//! Drains the handoff queue and POSTs each reading to the ingestion
//! endpoint. Delivery is at-most-once: a reading whose POST gets no HTTP
//! response is dropped. When the endpoint asks for it, the update
//! coordinator runs inline in this task.

use crate::config::NodeConfig;
use crate::control::TaskGate;
use crate::coordinator::{UpdateCoordinator, UpdateOutcome};
use crate::queue::ReadingConsumer;
use crate::traits::Link;
use crate::transport::HttpTransport;
use powernode_shared::UpdateDirective;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one publisher iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Link was down; reconnect requested and backoff slept
    Reconnecting,
    /// Nothing arrived within the dequeue wait
    Idle,
    Delivered { status: u16 },
    /// No HTTP response; the reading is gone
    SendFailed,
    /// Delivered, and the reply triggered an update check
    UpdateChecked(UpdateOutcome),
}

pub struct Publisher {
    link: Arc<dyn Link>,
    consumer: ReadingConsumer,
    transport: HttpTransport,
    coordinator: UpdateCoordinator,
    gate: TaskGate,
    ingest_url: String,
    dequeue_wait: Duration,
    reconnect_backoff: Duration,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("link", &self.link.name())
            .field("consumer", &self.consumer)
            .field("coordinator", &self.coordinator)
            .field("gate", &self.gate)
            .field("ingest_url", &self.ingest_url)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(
        link: Arc<dyn Link>,
        consumer: ReadingConsumer,
        transport: HttpTransport,
        coordinator: UpdateCoordinator,
        gate: TaskGate,
        config: &NodeConfig,
    ) -> Self {
        Self {
            link,
            consumer,
            transport,
            coordinator,
            gate,
            ingest_url: config.endpoints.ingest_url.clone(),
            dequeue_wait: config.pipeline.dequeue_wait(),
            reconnect_backoff: config.pipeline.reconnect_backoff(),
        }
    }

    pub fn coordinator(&self) -> &UpdateCoordinator {
        &self.coordinator
    }

    /// Readings waiting in the queue
    pub fn pending(&self) -> usize {
        self.consumer.len()
    }

    pub async fn step(&mut self) -> Step {
        self.gate.checkpoint().await;

        if !self.link.is_connected().await {
            warn!(
                link = self.link.name(),
                backoff_ms = self.reconnect_backoff.as_millis(),
                "Link down, reconnecting"
            );
            self.link.reconnect().await;
            tokio::time::sleep(self.reconnect_backoff).await;
            return Step::Reconnecting;
        }

        let Some(reading) = self.consumer.take(self.dequeue_wait).await else {
            debug!("No reading within dequeue wait");
            return Step::Idle;
        };

        let body = match reading.to_wire() {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode reading, dropped: {e}");
                return Step::SendFailed;
            }
        };

        let reply = match self.transport.post_reading(&self.ingest_url, body).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Telemetry POST failed, reading dropped: {e}");
                return Step::SendFailed;
            }
        };

        info!(
            status = reply.status,
            pending = self.consumer.len(),
            "Telemetry sent"
        );

        match reply.directive {
            UpdateDirective::None => Step::Delivered {
                status: reply.status,
            },
            UpdateDirective::CheckForUpdate => {
                info!("Ingest endpoint requested an update check");
                Step::UpdateChecked(self.coordinator.check_and_update().await)
            }
        }
    }

    pub async fn run(mut self) {
        info!(
            link = self.link.name(),
            ingest_url = %self.ingest_url,
            "Publisher started"
        );

        loop {
            self.step().await;
        }
    }
}
