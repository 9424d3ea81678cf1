use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::connection::{Backoff, ConnectionConfig};

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [reconnect]
//                    max_attempts = 8
//
//   env var:         REDLINE_RECONNECT__MAX_ATTEMPTS=8   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub auth: AuthFileConfig,
    #[serde(default)]
    pub reconnect: ReconnectFileConfig,
    #[serde(default)]
    pub documents: DocumentsFileConfig,
}

/// `[server]`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    /// WebSocket base URL; the document id is appended as the last segment.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

/// `[auth]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// `[reconnect]`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectFileConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectFileConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectFileConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.base_delay_ms),
            cap: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// `[documents]`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentsFileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:8000/ws/documents".to_string()
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    5
}

impl FileConfig {
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            endpoint: self.server.endpoint.clone(),
            backoff: self.reconnect.backoff(),
        }
    }
}

/// Build a figment that layers: defaults → config.toml → REDLINE_* env vars.
///
///   `REDLINE_AUTH__TOKEN=...`  →  `auth.token`
///   `REDLINE_SERVER__ENDPOINT=wss://...`  →  `server.endpoint`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("REDLINE_").split("__"))
}

// =============================================================================
// Directory layout (not tunable via figment; derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RedlineConfig {
    pub data_dir: PathBuf,
    pub drafts_dir: PathBuf,
    pub documents_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl RedlineConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".redline"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let drafts_dir = data_dir.join("drafts");
        std::fs::create_dir_all(&drafts_dir)
            .with_context(|| format!("Failed to create drafts directory: {:?}", drafts_dir))?;

        let documents_dir = data_dir.join("documents");
        std::fs::create_dir_all(&documents_dir).with_context(|| {
            format!("Failed to create documents directory: {:?}", documents_dir)
        })?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self {
            data_dir,
            drafts_dir,
            documents_dir,
            logs_dir,
        })
    }

    /// Configured documents directory, or the default under the data dir.
    pub fn documents_dir(&self, fc: &FileConfig) -> PathBuf {
        fc.documents
            .dir
            .clone()
            .unwrap_or_else(|| self.documents_dir.clone())
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_defaults() {
        let fc = FileConfig::default();
        assert_eq!(fc.server.endpoint, "ws://127.0.0.1:8000/ws/documents");
        assert!(fc.auth.token.is_none());
        assert_eq!(fc.reconnect.backoff(), Backoff::default());
        assert!(fc.documents.dir.is_none());
    }

    #[test]
    fn test_redline_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RedlineConfig::new(Some(tmp.path().to_path_buf())).unwrap();

        assert_eq!(config.data_dir, tmp.path());
        assert_eq!(config.drafts_dir, tmp.path().join("drafts"));
        assert!(tmp.path().join("drafts").exists());
        assert!(tmp.path().join("documents").exists());
        assert!(tmp.path().join("logs").exists());
        assert_eq!(config.config_toml_path(), tmp.path().join("config.toml"));
    }

    #[test]
    fn test_documents_dir_override() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RedlineConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        let mut fc = FileConfig::default();
        assert_eq!(config.documents_dir(&fc), tmp.path().join("documents"));

        fc.documents.dir = Some(PathBuf::from("/srv/docs"));
        assert_eq!(config.documents_dir(&fc), PathBuf::from("/srv/docs"));
    }

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.reconnect.max_attempts, 5);
        assert_eq!(fc.server.endpoint, default_endpoint());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nendpoint = \"wss://edit.example.com/ws\"\n\n[auth]\ntoken = \"abc\"\n\n[reconnect]\nmax_attempts = 8\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.endpoint, "wss://edit.example.com/ws");
        assert_eq!(fc.auth.token.as_deref(), Some("abc"));
        assert_eq!(fc.reconnect.max_attempts, 8);
        assert_eq!(fc.reconnect.base_delay_ms, 1000);

        let connection = fc.connection();
        assert_eq!(connection.backoff.max_attempts, 8);
        assert_eq!(connection.endpoint, "wss://edit.example.com/ws");
    }
}
