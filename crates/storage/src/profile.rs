//! Calibration profile file

use crate::StorageError;
use detector::CalibrationProfile;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{info, warn};

/// JSON file holding the single user's calibration profile
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the profile; `None` when the file does not exist
    pub async fn load(&self) -> Result<Option<CalibrationProfile>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let profile: CalibrationProfile = serde_json::from_slice(&bytes)?;
        if !profile.is_valid() {
            warn!(
                "Calibration profile at {} is incomplete, recalibration recommended",
                self.path.display()
            );
        }
        Ok(Some(profile))
    }

    /// Whether a complete profile is on disk
    pub async fn is_calibrated(&self) -> bool {
        matches!(self.load().await, Ok(Some(p)) if p.is_valid())
    }

    /// Write the profile, replacing any previous one
    pub async fn save(&self, profile: &CalibrationProfile) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_vec_pretty(profile)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        info!("Calibration profile saved to {}", self.path.display());
        Ok(())
    }
}
