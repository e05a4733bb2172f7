// sbx-common/src/state.rs
//! Durable installation-state markers. One JSON file per (software, marker)
//! under the sandbox state directory, so `is_installed`/`is_configured`
//! queries never have to re-derive status from filesystem or checksum scans.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::Config;
use super::error::{Result, SbxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMarker {
    Installed,
    Configured,
}

impl StateMarker {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateMarker::Installed => "installed",
            StateMarker::Configured => "configured",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub software: String,
    pub marker: StateMarker,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct StateTracker {
    state_dir: PathBuf,
}

impl StateTracker {
    pub fn new(config: &Config) -> Self {
        Self {
            state_dir: config.state_dir(),
        }
    }

    fn marker_path(&self, software: &str, marker: StateMarker) -> PathBuf {
        self.state_dir
            .join(format!("{software}.{}.json", marker.as_str()))
    }

    pub fn record_state(&self, software: &str, marker: StateMarker, version: &str) -> Result<()> {
        fs::create_dir_all(&self.state_dir).map_err(|e| SbxError::FileSystem {
            path: self.state_dir.clone(),
            reason: format!("failed to create state directory: {e}"),
        })?;
        let record = StateRecord {
            software: software.to_string(),
            marker,
            version: version.to_string(),
        };
        let path = self.marker_path(software, marker);
        let data = serde_json::to_string_pretty(&record)?;
        fs::write(&path, data).map_err(|e| SbxError::FileSystem {
            path: path.clone(),
            reason: format!("failed to write state marker: {e}"),
        })?;
        debug!("Recorded state marker: {}", path.display());
        Ok(())
    }

    /// Clears a marker. Removing a marker that was never recorded is fine.
    pub fn remove_state(&self, software: &str, marker: StateMarker) -> Result<()> {
        let path = self.marker_path(software, marker);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed state marker: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SbxError::FileSystem {
                path,
                reason: format!("failed to remove state marker: {e}"),
            }),
        }
    }

    pub fn exists(&self, software: &str, marker: StateMarker) -> bool {
        self.marker_path(software, marker).is_file()
    }

    /// Version recorded for a marker, or `None` when the marker is absent.
    /// A marker file that no longer parses is treated as absent.
    pub fn recorded_version(&self, software: &str, marker: StateMarker) -> Option<String> {
        let path = self.marker_path(software, marker);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<StateRecord>(&raw) {
            Ok(record) => Some(record.version),
            Err(e) => {
                warn!(
                    "State marker {} is unreadable ({}), treating as absent.",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// All readable marker records, for status listing.
    pub fn records(&self) -> Result<Vec<StateRecord>> {
        let mut records = Vec::new();
        if !self.state_dir.is_dir() {
            return Ok(records);
        }
        for entry in fs::read_dir(&self.state_dir)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        "Error reading entry in {}: {}. Skipping.",
                        self.state_dir.display(),
                        e
                    );
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<StateRecord>(&raw) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping unreadable state marker {}: {}", path.display(), e),
                },
                Err(e) => warn!("Failed to read state marker {}: {}", path.display(), e),
            }
        }
        records.sort_by(|a, b| a.software.cmp(&b.software));
        Ok(records)
    }
}
