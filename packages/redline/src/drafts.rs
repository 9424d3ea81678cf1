//! Local draft snapshots, saved on explicit request.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use redline_patch::Patch;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    pub document_id: String,
    pub current_text: String,
    /// In acceptance order.
    pub applied_patches: Vec<Patch>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("invalid document id: {0:?}")]
    InvalidId(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt draft {path:?}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One JSON file per document: `<dir>/draft-<document_id>.json`.
#[derive(Debug, Clone)]
pub struct DraftStore {
    dir: PathBuf,
}

impl DraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, document_id: &str) -> Result<PathBuf, DraftError> {
        if document_id.is_empty() || document_id.contains(['/', '\\', '\0']) {
            return Err(DraftError::InvalidId(document_id.to_string()));
        }
        Ok(self.dir.join(format!("draft-{document_id}.json")))
    }

    pub fn save(&self, snapshot: &DraftSnapshot) -> Result<PathBuf, DraftError> {
        let path = self.path_for(&snapshot.document_id)?;
        let json = serde_json::to_vec_pretty(snapshot).map_err(|source| DraftError::Corrupt {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| DraftError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            document_id = %snapshot.document_id,
            applied = snapshot.applied_patches.len(),
            "saved draft"
        );
        Ok(path)
    }

    /// `Ok(None)` when no draft has been saved for the document.
    pub fn load(&self, document_id: &str) -> Result<Option<DraftSnapshot>, DraftError> {
        let path = self.path_for(document_id)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(document_id, "no saved draft");
                return Ok(None);
            }
            Err(source) => return Err(DraftError::Io { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| DraftError::Corrupt { path, source })
    }

    /// Returns true if a draft was removed.
    pub fn remove(&self, document_id: &str) -> Result<bool, DraftError> {
        let path = self.path_for(document_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(DraftError::Io { path, source }),
        }
    }
}
