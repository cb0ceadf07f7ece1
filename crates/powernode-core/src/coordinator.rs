// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Remote firmware update procedure
//!
//! Runs inside the publisher task when the ingestion endpoint asks for it,
//! and once at boot before the pipeline exists. While the new image is
//! transferred both pipeline tasks are suspended; they are resumed on every
//! path except a successful flash, which ends in a restart instead.

use crate::config::{EndpointConfig, NodeConfig};
use crate::control::PipelineControl;
use crate::error::{NodeError, Result};
use crate::image_store::{CommittedImage, ImageStore};
use crate::traits::Restart;
use crate::transport::{HttpTransport, ImageFetch};
use crate::version::{CURRENT_VERSION, VersionComparator};
use parking_lot::Mutex;
use powernode_shared::UpdateEvent;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    CheckingVersion,
    Suspending,
    Updating,
    Resuming,
    /// Suspension or resumption could not be performed
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Remote version is not newer than the running one
    UpToDate { remote: String },
    /// Version authority unreachable or answered with something unusable
    CheckFailed,
    /// New image committed and restart requested
    Applied { version: String },
    /// Server had no image to send despite the version check
    NoUpdate,
    /// Transfer or verification failed; old image stays active
    TransferFailed,
    /// Pipeline could not be suspended or resumed
    ControlFailed,
}

/// Read-only view of the coordinator's phase, usable from other threads
#[derive(Debug, Clone)]
pub struct PhaseMonitor(Arc<Mutex<UpdatePhase>>);

impl PhaseMonitor {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(UpdatePhase::Idle)))
    }

    pub fn get(&self) -> UpdatePhase {
        *self.0.lock()
    }

    fn set(&self, phase: UpdatePhase) {
        let mut current = self.0.lock();
        if *current != phase {
            debug!(from = ?*current, to = ?phase, "Update phase changed");
            *current = phase;
        }
    }
}

pub struct UpdateCoordinator {
    transport: HttpTransport,
    store: Box<dyn ImageStore>,
    restart: Arc<dyn Restart>,
    control: Option<PipelineControl>,
    endpoints: EndpointConfig,
    comparator: VersionComparator,
    current_version: String,
    phase: PhaseMonitor,
}

impl fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("control", &self.control)
            .field("endpoints", &self.endpoints)
            .field("comparator", &self.comparator)
            .field("current_version", &self.current_version)
            .field("phase", &self.phase.get())
            .finish_non_exhaustive()
    }
}

impl UpdateCoordinator {
    pub fn new(
        transport: HttpTransport,
        store: Box<dyn ImageStore>,
        restart: Arc<dyn Restart>,
        config: &NodeConfig,
    ) -> Self {
        Self {
            transport,
            store,
            restart,
            control: None,
            endpoints: config.endpoints.clone(),
            comparator: config.update.version_ordering,
            current_version: CURRENT_VERSION.to_owned(),
            phase: PhaseMonitor::new(),
        }
    }

    /// Override the version compared against (defaults to the crate version)
    #[must_use]
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Hand over the pipeline's task handles. Until then updates run
    /// without suspending anything.
    pub fn attach(&mut self, control: PipelineControl) {
        self.control = Some(control);
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase.get()
    }

    pub fn phase_monitor(&self) -> PhaseMonitor {
        self.phase.clone()
    }

    /// Check the version authority and, if it has something newer, replace
    /// the image.
    pub async fn check_and_update(&mut self) -> UpdateOutcome {
        self.phase.set(UpdatePhase::CheckingVersion);

        let remote = match self.remote_version().await {
            Ok((remote, true)) => remote,
            Ok((remote, false)) => {
                info!(version = %self.current_version, remote = %remote, "Device is up to date");
                report(&UpdateEvent::NoUpdateAvailable {
                    version: self.current_version.clone(),
                });
                self.phase.set(UpdatePhase::Idle);
                return UpdateOutcome::UpToDate { remote };
            }
            Err(e) => {
                let status = match &e {
                    NodeError::VersionCheck { status } => Some(*status),
                    _ => None,
                };
                warn!("Version check failed: {e}");
                report(&UpdateEvent::CheckFailed {
                    status,
                    error: e.to_string(),
                });
                self.phase.set(UpdatePhase::Idle);
                return UpdateOutcome::CheckFailed;
            }
        };

        info!(
            current = %self.current_version,
            remote = %remote,
            "Newer firmware available, starting update"
        );
        report(&UpdateEvent::UpdateStarted {
            from_version: self.current_version.clone(),
            to_version: remote.clone(),
        });

        self.phase.set(UpdatePhase::Suspending);
        if let Err(e) = self.suspend_pipeline() {
            error!("Failed to suspend pipeline: {e}");
            if let Err(e) = self.resume_pipeline() {
                error!("Failed to resume pipeline after aborted suspension: {e}");
            }
            self.phase.set(UpdatePhase::Failed);
            return UpdateOutcome::ControlFailed;
        }

        self.phase.set(UpdatePhase::Updating);
        let started = Instant::now();
        let outcome = match self.transfer().await {
            Ok(Some(committed)) => {
                report(&UpdateEvent::UpdateApplied {
                    from_version: self.current_version.clone(),
                    to_version: remote.clone(),
                    bytes: committed.bytes,
                    duration_secs: started.elapsed().as_secs(),
                });
                info!(
                    version = %remote,
                    slot = committed.slot.as_str(),
                    "Firmware applied, restarting"
                );
                self.restart.restart(&format!("firmware {remote} applied"));
                return UpdateOutcome::Applied { version: remote };
            }
            Ok(None) => {
                info!("Update server reports no update");
                UpdateOutcome::NoUpdate
            }
            Err(e) => {
                warn!("Firmware update failed, keeping current image: {e}");
                report(&UpdateEvent::UpdateFailed {
                    from_version: self.current_version.clone(),
                    to_version: remote.clone(),
                    error: e.to_string(),
                });
                UpdateOutcome::TransferFailed
            }
        };

        self.phase.set(UpdatePhase::Resuming);
        if let Err(e) = self.resume_pipeline() {
            error!("Failed to resume pipeline: {e}");
            self.phase.set(UpdatePhase::Failed);
            return UpdateOutcome::ControlFailed;
        }

        self.phase.set(UpdatePhase::Idle);
        outcome
    }

    /// Remote version and whether it is newer than ours
    async fn remote_version(&self) -> Result<(String, bool)> {
        let remote = self
            .transport
            .fetch_version(&self.endpoints.version_url)
            .await?;
        debug!(current = %self.current_version, remote = %remote, "Fetched remote version");

        let newer = self.comparator.is_newer(&self.current_version, &remote)?;
        Ok((remote, newer))
    }

    async fn transfer(&mut self) -> Result<Option<CommittedImage>> {
        let expected_sha256 = match &self.endpoints.image_sha256_url {
            Some(url) => Some(self.transport.fetch_digest(url).await?),
            None => None,
        };

        let digest_verified = expected_sha256.is_some();
        match self
            .transport
            .fetch_image(&self.endpoints.image_url, self.store.as_mut(), digest_verified)
            .await?
        {
            ImageFetch::NotModified => Ok(None),
            ImageFetch::Received { .. } => self.store.commit(expected_sha256.as_deref()).map(Some),
        }
    }

    fn suspend_pipeline(&self) -> Result<()> {
        match &self.control {
            Some(control) => control.suspend_all(),
            None => {
                debug!("No pipeline attached, nothing to suspend");
                Ok(())
            }
        }
    }

    fn resume_pipeline(&self) -> Result<()> {
        match &self.control {
            Some(control) => control.resume_all(),
            None => Ok(()),
        }
    }
}

fn report(event: &UpdateEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!("Update event: {json}"),
        Err(e) => warn!("Failed to serialize update event: {e}"),
    }
}
