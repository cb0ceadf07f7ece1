// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Wire types shared between the metering node and its ingestion endpoint.

pub mod events;
pub mod ingest;
pub mod reading;

pub use events::UpdateEvent;
pub use ingest::{IngestReply, UpdateDirective};
pub use reading::Reading;
