//! Emergency halt flag shared across processes.
//!
//! The persisted marker format is:
//! - absent: disengaged
//! - `1`: engaged, no reason
//! - `1|<reason>`: engaged with a reason
//!
//! Readers never cache: every `is_engaged`/`reason` call re-reads the marker so
//! an external controller flipping it is seen on the very next check. The
//! switch is passed into engines as a capability (`Arc<dyn KillSwitch>`), so
//! tests can give each engine its own instance.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{info, warn};

/// Default marker location, relative to the working directory.
pub const DEFAULT_KILL_SWITCH_PATH: &str = ".runtime/killswitch.flag";

#[derive(Debug, Error)]
pub enum KillSwitchError {
    #[error("kill switch marker {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Read shape of the control-plane contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchStatus {
    pub engaged: bool,
    pub reason: Option<String>,
}

/// Write shape of the control-plane contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchRequest {
    pub state: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

pub trait KillSwitch: Send + Sync {
    /// Engage (persisting the optional reason) or disengage (clearing the marker).
    fn engage(&self, state: bool, reason: Option<&str>) -> Result<(), KillSwitchError>;

    /// Raw marker contents, `None` when absent.
    fn read_marker(&self) -> Result<Option<String>, KillSwitchError>;

    fn is_engaged(&self) -> bool {
        match self.read_marker() {
            Ok(marker) => marker.as_deref().is_some_and(marker_engaged),
            Err(err) => {
                warn!(error = %err, "unreadable kill switch marker, treating as engaged");
                true
            }
        }
    }

    fn reason(&self) -> Option<String> {
        match self.read_marker() {
            Ok(marker) => marker.as_deref().and_then(marker_reason),
            Err(_) => None,
        }
    }

    fn status(&self) -> KillSwitchStatus {
        KillSwitchStatus {
            engaged: self.is_engaged(),
            reason: self.reason(),
        }
    }

    /// Apply a control-plane write and return the resulting state.
    fn apply(&self, request: &KillSwitchRequest) -> Result<KillSwitchStatus, KillSwitchError> {
        self.engage(request.state, request.reason.as_deref())?;
        Ok(self.status())
    }
}

/// Marker payload for an engaged switch.
pub fn encode_marker(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("1|{reason}"),
        None => "1".to_string(),
    }
}

fn marker_engaged(marker: &str) -> bool {
    marker.trim().starts_with('1')
}

fn marker_reason(marker: &str) -> Option<String> {
    marker
        .trim()
        .split_once('|')
        .map(|(_, reason)| reason.to_string())
}

/// Kill switch persisted as a marker file.
#[derive(Debug, Clone)]
pub struct FileKillSwitch {
    path: PathBuf,
}

impl FileKillSwitch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the marker atomically: readers see the old or the new
    /// content, never a truncated file.
    fn write_marker(&self, content: &str) -> Result<(), KillSwitchError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_err(e))?;
        let mut staged = NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;
        staged
            .write_all(content.as_bytes())
            .map_err(|e| self.io_err(e))?;
        staged
            .persist(&self.path)
            .map_err(|e| self.io_err(e.error))?;
        Ok(())
    }

    fn io_err(&self, source: io::Error) -> KillSwitchError {
        KillSwitchError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Default for FileKillSwitch {
    fn default() -> Self {
        Self::new(DEFAULT_KILL_SWITCH_PATH)
    }
}

impl KillSwitch for FileKillSwitch {
    fn engage(&self, state: bool, reason: Option<&str>) -> Result<(), KillSwitchError> {
        if state {
            self.write_marker(&encode_marker(reason))?;
            info!(path = %self.path.display(), reason, "kill switch engaged");
        } else {
            match fs::remove_file(&self.path) {
                Ok(()) => info!(path = %self.path.display(), "kill switch disengaged"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(self.io_err(e)),
            }
        }
        Ok(())
    }

    fn read_marker(&self) -> Result<Option<String>, KillSwitchError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

/// In-process kill switch holding the same marker text in memory.
#[derive(Debug, Default)]
pub struct MemoryKillSwitch {
    marker: Mutex<Option<String>>,
}

impl MemoryKillSwitch {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KillSwitch for MemoryKillSwitch {
    fn engage(&self, state: bool, reason: Option<&str>) -> Result<(), KillSwitchError> {
        let mut marker = self.marker.lock().unwrap_or_else(PoisonError::into_inner);
        *marker = state.then(|| encode_marker(reason));
        Ok(())
    }

    fn read_marker(&self) -> Result<Option<String>, KillSwitchError> {
        Ok(self
            .marker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
