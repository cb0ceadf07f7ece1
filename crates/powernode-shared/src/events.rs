// SPDX-License-Identifier: CC-BY-NC-ND-4.0

use serde::Serialize;

/// Firmware update lifecycle events, emitted as JSON log lines
#[derive(Debug, Clone, Serialize)]
pub enum UpdateEvent {
    CheckFailed {
        status: Option<u16>,
        error: String,
    },
    UpdateStarted {
        from_version: String,
        to_version: String,
    },
    UpdateApplied {
        from_version: String,
        to_version: String,
        bytes: u64,
        duration_secs: u64,
    },
    UpdateFailed {
        from_version: String,
        to_version: String,
        error: String,
    },
    NoUpdateAvailable {
        version: String,
    },
}
