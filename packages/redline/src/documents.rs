//! Document loading and submission.

use std::path::PathBuf;

use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid document id: {0:?}")]
    InvalidId(String),

    #[error("document {0} not found")]
    NotFound(String),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the session's initial text comes from and where the final text goes.
pub trait DocumentSource {
    fn load(&self, document_id: &str) -> Result<String, DocumentError>;
    fn submit(&self, document_id: &str, text: &str) -> Result<(), DocumentError>;
}

/// Plain-text documents stored as `<dir>/<document_id>.txt`.
#[derive(Debug, Clone)]
pub struct FileDocuments {
    dir: PathBuf,
}

impl FileDocuments {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, document_id: &str) -> Result<PathBuf, DocumentError> {
        let valid = !document_id.is_empty()
            && document_id != "."
            && document_id != ".."
            && !document_id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(DocumentError::InvalidId(document_id.to_string()));
        }
        Ok(self.dir.join(format!("{document_id}.txt")))
    }
}

impl DocumentSource for FileDocuments {
    fn load(&self, document_id: &str) -> Result<String, DocumentError> {
        let path = self.path_for(document_id)?;
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!(document_id, bytes = text.len(), "loaded document");
                Ok(text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DocumentError::NotFound(document_id.to_string()))
            }
            Err(source) => Err(DocumentError::Io { path, source }),
        }
    }

    fn submit(&self, document_id: &str, text: &str) -> Result<(), DocumentError> {
        let path = self.path_for(document_id)?;
        std::fs::create_dir_all(&self.dir).map_err(|source| DocumentError::Io {
            path: self.dir.clone(),
            source,
        })?;
        std::fs::write(&path, text).map_err(|source| DocumentError::Io {
            path: path.clone(),
            source,
        })?;
        info!(document_id, path = %path.display(), "submitted document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_submit() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = FileDocuments::new(tmp.path());
        std::fs::write(tmp.path().join("essay.txt"), "Line1\nLine2").unwrap();

        assert_eq!(docs.load("essay").unwrap(), "Line1\nLine2");
        docs.submit("essay", "Line1\nLine2x").unwrap();
        assert_eq!(docs.load("essay").unwrap(), "Line1\nLine2x");
    }

    #[test]
    fn test_missing_document() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = FileDocuments::new(tmp.path());
        assert!(matches!(docs.load("nope"), Err(DocumentError::NotFound(_))));
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = FileDocuments::new(tmp.path());
        for id in ["", "..", "../etc/passwd", "a/b", "a\\b"] {
            assert!(
                matches!(docs.load(id), Err(DocumentError::InvalidId(_))),
                "{id:?} accepted"
            );
        }
    }

    #[test]
    fn test_submit_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let docs = FileDocuments::new(tmp.path().join("nested"));
        docs.submit("d1", "text").unwrap();
        assert!(tmp.path().join("nested/d1.txt").exists());
    }
}
