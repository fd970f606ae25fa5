//! Host configuration: TOML file + CLI overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use aft_core::{AftError, AftResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub export: ExportSection,
}

/// `[telemetry]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
        }
    }
}

/// `[worker]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    /// Development override for the worker directory. When unset, the
    /// supervisor resolves the platform-specific path relative to the host
    /// executable.
    pub directory: Option<String>,
    /// Spawn the worker on host startup.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            directory: None,
            autostart: default_true(),
        }
    }
}

/// `[export]` section of the config TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportSection {
    /// Directory for export artifacts. Defaults to the platform documents
    /// directory.
    pub directory: Option<String>,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:8765".to_string()
}
fn default_true() -> bool {
    true
}

/// Resolved host configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub endpoint: String,
    pub worker_dir: Option<PathBuf>,
    pub autostart: bool,
    pub export_dir: PathBuf,
}

impl HostConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_endpoint: Option<&str>,
        cli_worker_dir: Option<&str>,
        cli_export_dir: Option<&str>,
        cli_no_worker: bool,
    ) -> AftResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| AftError::Other(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let endpoint = cli_endpoint
            .map(|s| s.to_string())
            .unwrap_or(file_config.telemetry.endpoint);

        let worker_dir = cli_worker_dir
            .map(|s| s.to_string())
            .or(file_config.worker.directory)
            .map(|s| expand_tilde_str(&s));

        let export_dir = cli_export_dir
            .map(|s| s.to_string())
            .or(file_config.export.directory)
            .map(|s| expand_tilde_str(&s))
            .unwrap_or_else(default_export_dir);

        let autostart = !cli_no_worker && file_config.worker.autostart;

        Ok(Self {
            endpoint,
            worker_dir,
            autostart,
            export_dir,
        })
    }
}

/// Documents directory, falling back to home, then the current directory.
fn default_export_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
