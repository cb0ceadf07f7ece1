// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Error types for the node core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("handoff queue could not be created (capacity {capacity})")]
    QueueAllocation { capacity: usize },

    #[error("task {task} is no longer running")]
    TaskUnavailable { task: &'static str },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("version check failed with status {status}")]
    VersionCheck { status: u16 },

    #[error("version parse error: {0}")]
    VersionParse(String),

    #[error("image transfer failed: {0}")]
    Transfer(String),

    #[error("image length mismatch: expected {expected} bytes, got {actual}")]
    ImageLength { expected: u64, actual: u64 },

    #[error("image digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("image store error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("execution context error: {0}")]
    Context(String),
}

pub type Result<T> = std::result::Result<T, NodeError>;
