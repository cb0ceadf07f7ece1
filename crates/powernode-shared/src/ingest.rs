// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Interpretation of the ingestion endpoint's reply body

use serde_json::Value;

/// What the ingestion endpoint asked the node to do after a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDirective {
    /// Keep publishing
    None,
    /// Run a firmware version check now
    CheckForUpdate,
}

/// Parsed reply to a telemetry POST
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReply {
    pub status: u16,
    pub directive: UpdateDirective,
}

impl IngestReply {
    /// Build a reply from a raw status and body.
    ///
    /// The body is optional structured data. An unparseable body, a missing
    /// `ota_update` field, or a non-boolean value all mean "no directive".
    pub fn from_body(status: u16, body: &str) -> Self {
        Self {
            status,
            directive: parse_directive(body),
        }
    }
}

pub fn parse_directive(body: &str) -> UpdateDirective {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return UpdateDirective::None;
    };

    match value.get("ota_update").and_then(Value::as_bool) {
        Some(true) => UpdateDirective::CheckForUpdate,
        _ => UpdateDirective::None,
    }
}
