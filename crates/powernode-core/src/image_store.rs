// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Firmware image storage with A/B slots
//!
//! A transfer is written to a scratch file next to the slots. Only a fully
//! received and verified image is moved into the inactive slot, and only
//! after that is the boot pointer switched. A failed or partial transfer
//! never touches the slot the device boots from.

use crate::error::{NodeError, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const BOOT_POINTER: &str = "boot";
const INCOMING: &str = "incoming.part";

/// Storage for the image being received
pub trait ImageStore: Send {
    /// Start a new transfer, discarding any unfinished one
    fn begin(&mut self, expected_len: Option<u64>) -> Result<()>;

    fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Verify the received image and make it the boot image
    fn commit(&mut self, expected_sha256: Option<&str>) -> Result<CommittedImage>;

    /// Discard the unfinished transfer. Safe to call when nothing is pending.
    fn abort(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Self::A => "slot-a.bin",
            Self::B => "slot-b.bin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedImage {
    pub slot: Slot,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug)]
struct PendingImage {
    file: File,
    hasher: Sha256,
    written: u64,
    expected_len: Option<u64>,
}

/// Directory-backed A/B slot store
#[derive(Debug)]
pub struct SlotImageStore {
    dir: PathBuf,
    pending: Option<PendingImage>,
}

impl SlotImageStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let incoming = dir.join(INCOMING);
        if incoming.exists() {
            warn!("Removing leftover partial image at {}", incoming.display());
            fs::remove_file(&incoming)?;
        }

        Ok(Self { dir, pending: None })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Slot the device boots from. A store without a boot pointer boots slot A.
    pub fn active_slot(&self) -> Result<Slot> {
        let pointer = self.dir.join(BOOT_POINTER);
        if !pointer.exists() {
            return Ok(Slot::A);
        }

        match fs::read_to_string(&pointer)?.trim() {
            "a" => Ok(Slot::A),
            "b" => Ok(Slot::B),
            other => Err(NodeError::Transfer(format!("corrupt boot pointer: {other:?}"))),
        }
    }

    pub fn slot_path(&self, slot: Slot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    fn incoming_path(&self) -> PathBuf {
        self.dir.join(INCOMING)
    }

    fn remove_incoming(&self) {
        let incoming = self.incoming_path();
        match fs::remove_file(&incoming) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove partial image {}: {e}", incoming.display()),
        }
    }

    fn set_active_slot(&self, slot: Slot) -> Result<()> {
        let pointer = self.dir.join(BOOT_POINTER);
        let temp = pointer.with_extension("tmp");

        // Atomic write
        fs::write(&temp, slot.as_str())?;
        fs::rename(&temp, &pointer)?;
        Ok(())
    }

    fn verify(pending: PendingImage, expected_sha256: Option<&str>) -> Result<(u64, String)> {
        let PendingImage {
            file,
            hasher,
            written,
            expected_len,
        } = pending;
        file.sync_all()?;

        if let Some(expected) = expected_len
            && expected != written
        {
            return Err(NodeError::ImageLength {
                expected,
                actual: written,
            });
        }

        if written == 0 {
            return Err(NodeError::Transfer("empty image".to_owned()));
        }

        let actual = format!("{:x}", hasher.finalize());
        if let Some(expected) = expected_sha256 {
            let expected = expected.to_lowercase();
            if expected != actual {
                return Err(NodeError::DigestMismatch { expected, actual });
            }
        }

        Ok((written, actual))
    }
}

impl ImageStore for SlotImageStore {
    fn begin(&mut self, expected_len: Option<u64>) -> Result<()> {
        self.abort();

        let file = File::create(self.incoming_path())?;
        self.pending = Some(PendingImage {
            file,
            hasher: Sha256::new(),
            written: 0,
            expected_len,
        });
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| NodeError::Transfer("no image transfer in progress".to_owned()))?;

        pending.file.write_all(chunk)?;
        pending.hasher.update(chunk);
        pending.written += chunk.len() as u64;
        Ok(())
    }

    fn commit(&mut self, expected_sha256: Option<&str>) -> Result<CommittedImage> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| NodeError::Transfer("no image transfer in progress".to_owned()))?;
        let incoming = self.incoming_path();

        let placed = Self::verify(pending, expected_sha256).and_then(|(bytes, sha256)| {
            let target = self.active_slot()?.other();
            fs::rename(&incoming, self.slot_path(target))?;
            Ok((target, bytes, sha256))
        });
        let (target, bytes, sha256) = match placed {
            Ok(placed) => placed,
            Err(e) => {
                self.remove_incoming();
                return Err(e);
            }
        };

        self.set_active_slot(target)?;

        info!(
            slot = target.as_str(),
            bytes,
            sha256 = %sha256,
            "Image committed, boot slot switched"
        );

        Ok(CommittedImage {
            slot: target,
            bytes,
            sha256,
        })
    }

    fn abort(&mut self) {
        if self.pending.take().is_some() {
            self.remove_incoming();
        }
    }
}

/// Extract the digest from a sha256sum-style line ("<hex>  <name>")
pub fn parse_sha256_line(content: &str) -> Result<String> {
    let digest = content
        .split_whitespace()
        .next()
        .ok_or_else(|| NodeError::Transfer("empty digest file".to_owned()))?;

    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(NodeError::Transfer(format!("invalid sha256 digest: {digest}")));
    }

    Ok(digest.to_lowercase())
}
