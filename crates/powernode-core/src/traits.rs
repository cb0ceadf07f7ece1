// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Capabilities the node core is driven through
//!
//! The metering driver, the wireless link and the device restart live
//! outside the core. Implementations are supplied by the binary (host
//! stand-ins) or by tests.

use async_trait::async_trait;

/// Metering sensor driver.
///
/// Each read returns `f32::NAN` when the meter does not answer or answers
/// garbage; the sampler takes care of sanitizing.
pub trait MeteringSensor: Send {
    fn voltage(&mut self) -> f32;
    fn current(&mut self) -> f32;
    fn power(&mut self) -> f32;
    fn energy(&mut self) -> f32;
    fn frequency(&mut self) -> f32;
    fn pf(&mut self) -> f32;

    /// Human-readable name for logs
    fn name(&self) -> &str {
        "meter"
    }
}

/// Network association between the node and its access point
#[async_trait]
pub trait Link: Send + Sync {
    /// Start associating. Completion is observed through `is_connected`.
    async fn begin(&self);

    async fn is_connected(&self) -> bool;

    /// Drop the current association and try again
    async fn reconnect(&self);

    fn name(&self) -> &str {
        "link"
    }
}

/// Reboot into whatever image the boot pointer selects
pub trait Restart: Send + Sync {
    fn restart(&self, reason: &str);
}
