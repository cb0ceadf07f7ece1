// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Bounded handoff queue between the sampler and the publisher
//!
//! One producer, one consumer. Both sides only ever wait a bounded time:
//! the producer drops the reading when no slot frees up in time, the
//! consumer reports "empty" when nothing arrives in time.

use crate::error::{NodeError, Result};
use powernode_shared::Reading;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

/// Result of offering a reading to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Queue stayed full for the whole wait
    Dropped,
    /// Consumer side is gone
    Closed,
}

/// Create the queue. A zero capacity cannot hold anything and is refused.
pub fn handoff_queue(capacity: usize) -> Result<(ReadingProducer, ReadingConsumer)> {
    if capacity == 0 {
        return Err(NodeError::QueueAllocation { capacity });
    }

    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    Ok((
        ReadingProducer {
            tx,
            dropped: dropped.clone(),
        },
        ReadingConsumer { rx, dropped },
    ))
}

#[derive(Debug)]
pub struct ReadingProducer {
    tx: mpsc::Sender<Reading>,
    dropped: Arc<AtomicU64>,
}

impl ReadingProducer {
    /// Enqueue, waiting at most `wait` for a free slot
    pub async fn offer(&self, reading: Reading, wait: Duration) -> Offer {
        match self.tx.send_timeout(reading, wait).await {
            Ok(()) => Offer::Queued,
            Err(SendTimeoutError::Timeout(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Offer::Dropped
            }
            Err(SendTimeoutError::Closed(_)) => Offer::Closed,
        }
    }

    /// Readings dropped on a full queue since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Readings currently waiting
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

#[derive(Debug)]
pub struct ReadingConsumer {
    rx: mpsc::Receiver<Reading>,
    dropped: Arc<AtomicU64>,
}

impl ReadingConsumer {
    /// Dequeue, waiting at most `wait`. `None` means nothing arrived in time.
    pub async fn take(&mut self, wait: Duration) -> Option<Reading> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(reading)) => Some(reading),
            Ok(None) => {
                // producer gone; keep the bounded-wait contract instead of spinning
                tokio::time::sleep(wait).await;
                None
            }
            Err(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
