// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Node startup
//!
//! Brings up the link, runs the boot-time update check, creates the
//! handoff queue and starts the two pipeline tasks on their own execution
//! contexts: `sampler` for the sensor, `network` for publishing and updates.

use crate::config::NodeConfig;
use crate::control::{PipelineControl, task_control};
use crate::coordinator::{PhaseMonitor, UpdateCoordinator, UpdateOutcome};
use crate::error::{NodeError, Result};
use crate::image_store::ImageStore;
use crate::publisher::Publisher;
use crate::queue::handoff_queue;
use crate::sampler::Sampler;
use crate::traits::{Link, MeteringSensor, Restart};
use crate::transport::HttpTransport;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const SAMPLER_CONTEXT: &str = "sampler";
pub const NETWORK_CONTEXT: &str = "network";

/// Everything the node needs from the hardware around it
pub struct Capabilities<S> {
    pub sensor: S,
    pub link: Arc<dyn Link>,
    pub store: Box<dyn ImageStore>,
    pub restart: Arc<dyn Restart>,
}

impl<S: MeteringSensor> fmt::Debug for Capabilities<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("sensor", &self.sensor.name())
            .field("link", &self.link.name())
            .finish_non_exhaustive()
    }
}

/// A dedicated OS thread driving one single-threaded runtime
#[derive(Debug)]
pub struct ExecutionContext {
    name: &'static str,
    thread: JoinHandle<()>,
}

impl ExecutionContext {
    /// Start `task` on a new thread. The future is built on that thread, so
    /// it does not need to be `Send`.
    pub fn spawn<M, F>(name: &'static str, make_task: M) -> Result<Self>
    where
        M: FnOnce() -> F + Send + 'static,
        F: Future<Output = ()> + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NodeError::Context(format!("Failed to build {name} runtime: {e}")))?;

        let thread = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                debug!(context = name, "Execution context started");
                runtime.block_on(make_task());
                warn!(context = name, "Execution context finished");
            })
            .map_err(|e| NodeError::Context(format!("Failed to spawn {name} thread: {e}")))?;

        Ok(Self { name, thread })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Handles to a launched node
#[derive(Debug)]
pub struct RunningNode {
    pub boot_check: UpdateOutcome,
    pub control: PipelineControl,
    pub phase: PhaseMonitor,
    pub sampler: ExecutionContext,
    pub network: ExecutionContext,
}

#[derive(Debug)]
pub struct Supervisor {
    config: NodeConfig,
    current_version: Option<String>,
}

impl Supervisor {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            current_version: None,
        }
    }

    /// Compare updates against `version` instead of the build version
    #[must_use]
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Start the node. Only queue or execution context creation can fail;
    /// both are fatal.
    pub async fn launch<S>(self, capabilities: Capabilities<S>) -> Result<RunningNode>
    where
        S: MeteringSensor + 'static,
    {
        let Capabilities {
            sensor,
            link,
            store,
            restart,
        } = capabilities;
        let config = self.config;

        connect_link(link.as_ref(), config.pipeline.link_retry_delay()).await;

        let transport = HttpTransport::new(&config.update)?;
        let mut coordinator = UpdateCoordinator::new(transport.clone(), store, restart, &config);
        if let Some(version) = self.current_version {
            coordinator = coordinator.with_current_version(version);
        }

        info!(version = coordinator.current_version(), "Running boot update check");
        let boot_check = coordinator.check_and_update().await;
        info!(outcome = ?boot_check, "Boot update check finished");

        let (producer, consumer) = handoff_queue(config.pipeline.queue_capacity)?;

        let (sampler_handle, sampler_gate) = task_control(SAMPLER_CONTEXT);
        let (publisher_handle, publisher_gate) = task_control("publisher");
        let control = PipelineControl {
            sampler: sampler_handle,
            publisher: publisher_handle,
        };
        coordinator.attach(control.clone());
        let phase = coordinator.phase_monitor();

        let sampler = Sampler::new(sensor, producer, sampler_gate, &config.pipeline);
        let publisher = Publisher::new(
            link,
            consumer,
            transport,
            coordinator,
            publisher_gate,
            &config,
        );

        let sampler = ExecutionContext::spawn(SAMPLER_CONTEXT, move || sampler.run())?;
        let network = ExecutionContext::spawn(NETWORK_CONTEXT, move || publisher.run())?;

        info!(
            queue_capacity = config.pipeline.queue_capacity,
            "Pipeline started"
        );

        Ok(RunningNode {
            boot_check,
            control,
            phase,
            sampler,
            network,
        })
    }
}

/// Block until the link reports a connection, polling with a fixed delay
async fn connect_link(link: &dyn Link, delay: Duration) {
    info!(link = link.name(), "Connecting");
    link.begin().await;

    let mut attempts: u32 = 0;
    while !link.is_connected().await {
        attempts += 1;
        if attempts % 20 == 0 {
            debug!(link = link.name(), attempts, "Still waiting for link");
        }
        tokio::time::sleep(delay).await;
    }

    info!(link = link.name(), attempts, "Link connected");
}

/// Log a fatal launch error and halt this thread for good
pub async fn halt(e: &NodeError) {
    error!("Fatal: {e}. Node halted.");
    std::future::pending::<()>().await;
}
