//! # Change Detector
//!
//! Decides whether the watched key file holds a new gossip key.
//!
//! The file is reopened on every detection. The committed fingerprint only
//! moves forward when a rotation completes, so a failed rotation is retried
//! on the next tick.

mod material;

pub use material::{Fingerprint, KeyMaterial, MaterialError};

use crate::observability::metrics;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of one detection
#[derive(Debug)]
pub enum Detection {
    /// File holds a valid key whose fingerprint differs from the committed one
    Changed(KeyMaterial),
    /// Same key, unreadable file, or malformed content
    Unchanged,
}

/// Tracks the last committed fingerprint of the watched key file
#[derive(Debug)]
pub struct ChangeDetector {
    path: PathBuf,
    committed: Option<Fingerprint>,
}

impl ChangeDetector {
    /// Create a detector with an explicit baseline
    pub fn new(path: impl Into<PathBuf>, committed: Option<Fingerprint>) -> Self {
        Self {
            path: path.into(),
            committed,
        }
    }

    /// Read the file once and commit its fingerprint as the baseline
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or does not hold a valid gossip key.
    pub fn initialize(path: impl Into<PathBuf>) -> Result<(Self, KeyMaterial)> {
        let path = path.into();
        let raw = std::fs::read(&path)
            .with_context(|| format!("Unable to read gossip key file {}", path.display()))?;
        let material = KeyMaterial::from_bytes(&raw)
            .with_context(|| format!("Invalid gossip key in {}", path.display()))?;
        let detector = Self::new(path, Some(material.fingerprint().clone()));
        Ok((detector, material))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn committed(&self) -> Option<&Fingerprint> {
        self.committed.as_ref()
    }

    /// Reread the file and compare against the committed fingerprint
    pub fn detect(&mut self) -> Detection {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unable to read gossip key file, treating as unchanged");
                metrics::increment_detections("unreadable");
                return Detection::Unchanged;
            }
        };

        let material = match KeyMaterial::from_bytes(&raw) {
            Ok(material) => material,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Gossip key file holds no usable key (possibly mid-write), treating as unchanged");
                metrics::increment_detections("malformed");
                return Detection::Unchanged;
            }
        };

        if self.committed.as_ref() == Some(material.fingerprint()) {
            debug!(fingerprint = %material.fingerprint(), "Gossip key unchanged");
            metrics::increment_detections("unchanged");
            return Detection::Unchanged;
        }

        debug!(
            fingerprint = %material.fingerprint(),
            committed = ?self.committed.as_ref().map(Fingerprint::short),
            "Gossip key changed"
        );
        metrics::increment_detections("changed");
        Detection::Changed(material)
    }

    /// Record a completed rotation
    pub fn commit(&mut self, fingerprint: &Fingerprint) {
        self.committed = Some(fingerprint.clone());
    }

    /// Forget the baseline so the current file content counts as a change
    pub fn reset_baseline(&mut self) {
        self.committed = None;
    }
}
