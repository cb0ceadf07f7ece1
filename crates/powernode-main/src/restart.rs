// SPDX-License-Identifier: CC-BY-NC-ND-4.0

use powernode_core::Restart;
use tracing::warn;

/// Exit code telling the service manager to start us again
pub const RESTART_EXIT_CODE: i32 = 75;

/// Restarts by exiting; the service manager brings the process back up
/// on the freshly selected image.
#[derive(Debug, Default)]
pub struct ProcessRestart;

impl Restart for ProcessRestart {
    fn restart(&self, reason: &str) {
        warn!("Restarting: {reason}");
        std::process::exit(RESTART_EXIT_CODE);
    }
}
