// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Cooperative suspend/resume of the long-lived pipeline tasks
//!
//! Each task owns a [`TaskGate`] and passes through [`TaskGate::checkpoint`]
//! at the top of every loop iteration. The matching [`TaskHandle`] flips the
//! gate. A suspended task finishes whatever wait it is in and parks at its
//! next checkpoint; on resume it continues from that point.

use crate::error::{NodeError, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Suspended,
}

/// Create the controller/task pair for one long-lived task
pub fn task_control(task: &'static str) -> (TaskHandle, TaskGate) {
    let (tx, rx) = watch::channel(RunState::Running);
    (
        TaskHandle {
            task,
            tx: Arc::new(tx),
        },
        TaskGate { task, rx },
    )
}

/// Controller side, held by the update coordinator
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task: &'static str,
    tx: Arc<watch::Sender<RunState>>,
}

impl TaskHandle {
    pub fn task(&self) -> &'static str {
        self.task
    }

    /// Stop scheduling the task at its next checkpoint.
    /// Fails if the task has exited and dropped its gate.
    pub fn suspend(&self) -> Result<()> {
        self.set(RunState::Suspended)
    }

    pub fn resume(&self) -> Result<()> {
        self.set(RunState::Running)
    }

    pub fn is_suspended(&self) -> bool {
        *self.tx.borrow() == RunState::Suspended
    }

    fn set(&self, state: RunState) -> Result<()> {
        self.tx
            .send(state)
            .map_err(|_| NodeError::TaskUnavailable { task: self.task })?;
        debug!(task = self.task, ?state, "Task control updated");
        Ok(())
    }
}

/// Task side
#[derive(Debug)]
pub struct TaskGate {
    task: &'static str,
    rx: watch::Receiver<RunState>,
}

impl TaskGate {
    pub fn task(&self) -> &'static str {
        self.task
    }

    pub fn is_suspended(&self) -> bool {
        *self.rx.borrow() == RunState::Suspended
    }

    /// Returns immediately while running, otherwise parks until resumed.
    pub async fn checkpoint(&mut self) {
        if !self.is_suspended() {
            return;
        }

        debug!(task = self.task, "Task suspended");
        if self
            .rx
            .wait_for(|state| *state == RunState::Running)
            .await
            .is_err()
        {
            // Nobody can resume us any more.
            warn!(task = self.task, "Task controller dropped while suspended");
            std::future::pending::<()>().await;
        }
        debug!(task = self.task, "Task resumed");
    }
}

/// The pair of handles used to pause the whole pipeline
#[derive(Debug, Clone)]
pub struct PipelineControl {
    pub sampler: TaskHandle,
    pub publisher: TaskHandle,
}

impl PipelineControl {
    /// Suspend the sampler, then the publisher. Stops at the first failure.
    pub fn suspend_all(&self) -> Result<()> {
        self.sampler.suspend()?;
        self.publisher.suspend()
    }

    /// Resume both tasks. Both are attempted even if the first one fails.
    pub fn resume_all(&self) -> Result<()> {
        let sampler = self.sampler.resume();
        let publisher = self.publisher.resume();
        sampler.and(publisher)
    }

    pub fn any_suspended(&self) -> bool {
        self.sampler.is_suspended() || self.publisher.is_suspended()
    }

    pub fn all_suspended(&self) -> bool {
        self.sampler.is_suspended() && self.publisher.is_suspended()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn spawn_counter(mut gate: TaskGate) -> Arc<AtomicU32> {
        let counter = Arc::new(AtomicU32::new(0));
        let task_counter = counter.clone();
        tokio::spawn(async move {
            loop {
                gate.checkpoint().await;
                task_counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });
        counter
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_parks_task_and_resume_continues() {
        let (handle, gate) = task_control("worker");
        let counter = spawn_counter(gate);

        tokio::time::sleep(Duration::from_millis(55)).await;
        handle.suspend().unwrap();
        assert!(handle.is_suspended());

        // let the in-flight sleep finish and the task reach its checkpoint
        tokio::time::sleep(Duration::from_millis(20)).await;
        let parked_at = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), parked_at);

        handle.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(counter.load(Ordering::SeqCst) > parked_at);
    }

    #[tokio::test]
    async fn test_checkpoint_is_free_while_running() {
        let (_handle, mut gate) = task_control("worker");
        tokio::time::timeout(Duration::from_millis(100), gate.checkpoint())
            .await
            .expect("checkpoint should not block");
        assert!(!gate.is_suspended());
        assert_eq!(gate.task(), "worker");
    }

    #[test]
    fn test_handle_fails_once_task_is_gone() {
        let (handle, gate) = task_control("sampler");
        drop(gate);

        assert!(matches!(
            handle.suspend(),
            Err(NodeError::TaskUnavailable { task: "sampler" })
        ));
        assert!(handle.resume().is_err());
    }

    #[test]
    fn test_pipeline_resume_attempts_both() {
        let (sampler, sampler_gate) = task_control("sampler");
        let (publisher, _publisher_gate) = task_control("publisher");
        let control = PipelineControl { sampler, publisher };

        control.suspend_all().unwrap();
        assert!(control.all_suspended());

        drop(sampler_gate);
        assert!(control.resume_all().is_err());
        // the publisher was still resumed
        assert!(!control.publisher.is_suspended());
    }

    #[test]
    fn test_pipeline_suspend_stops_at_first_failure() {
        let (sampler, sampler_gate) = task_control("sampler");
        let (publisher, _publisher_gate) = task_control("publisher");
        let control = PipelineControl { sampler, publisher };
        drop(sampler_gate);

        assert!(control.suspend_all().is_err());
        assert!(!control.publisher.is_suspended());
        assert!(!control.any_suspended());
    }
}
