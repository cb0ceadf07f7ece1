// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Metering node core: the sampling/publishing pipeline and the remote
//! firmware update procedure that pauses it.

pub mod config;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod image_store;
pub mod publisher;
pub mod queue;
pub mod sampler;
pub mod supervisor;
pub mod traits;
pub mod transport;
pub mod version;

#[cfg(test)]
mod test_util;

pub use config::{NodeConfig, TlsPolicy};
pub use control::{PipelineControl, TaskGate, TaskHandle, task_control};
pub use coordinator::{PhaseMonitor, UpdateCoordinator, UpdateOutcome, UpdatePhase};
pub use error::{NodeError, Result};
pub use image_store::{ImageStore, Slot, SlotImageStore};
pub use publisher::{Publisher, Step};
pub use queue::{Offer, ReadingConsumer, ReadingProducer, handoff_queue};
pub use sampler::Sampler;
pub use supervisor::{Capabilities, ExecutionContext, RunningNode, Supervisor};
pub use traits::{Link, MeteringSensor, Restart};
pub use transport::HttpTransport;
pub use version::{CURRENT_VERSION, VersionComparator};
