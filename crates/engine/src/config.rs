//! Process-level configuration.
//!
//! Read from a TOML file via `toml_edit`, with defaults usable when no file
//! is present at all -- a fresh embedder can call [`EngineConfig::default`]
//! and get a working, if permissive, configuration.

use std::{path::PathBuf, time::Duration};

use crate::error::{EngineError, ErrorKind};

/// Tree snapshot format, selected by configuration or inferred from a file
/// extension on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeFormat {
    Json,
    Yaml,
    Xml,
    Binary,
}

impl TreeFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "xml" => Some(Self::Xml),
            "gob" | "bin" => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Process-level configuration struct (spec.md §6 "Environment").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root for `data` confinement.
    pub data_root: PathBuf,
    /// Root for `tree` confinement.
    pub tree_root: PathBuf,
    /// Root for `diagram` confinement.
    pub diagram_root: PathBuf,
    /// Port injected into SQL target connection strings.
    pub sql_port: u16,
    /// Script run in every new session before the caller's own code, if set.
    /// Registers the session's `OnStart`/`OnExit` hooks via the `onStart`/
    /// `onExit` built-ins (spec.md §4.8).
    pub bootstrap_script: Option<PathBuf>,
    /// Default tree snapshot format when none is inferable from a path.
    pub default_tree_format: TreeFormat,
    /// Default session time-to-live.
    pub session_ttl_secs: u64,
    /// Interval at which the background reaper scans for expired sessions.
    pub reaper_interval_secs: u64,
    /// Row count per ETL batch (spec.md §4.7: "`ProcessETLJob` drives
    /// `StreamProcess` with a batch size of 1000").
    pub etl_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
            tree_root: PathBuf::from("./tree"),
            diagram_root: PathBuf::from("./diagram"),
            sql_port: 5432,
            bootstrap_script: None,
            default_tree_format: TreeFormat::Json,
            session_ttl_secs: 30 * 60,
            reaper_interval_secs: 60,
            etl_batch_size: 1000,
        }
    }
}

impl EngineConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    /// Parses a TOML document into a config, overlaying unspecified fields
    /// with [`EngineConfig::default`].
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        toml_edit::de::from_str(text)
            .map_err(|e| EngineError::new(ErrorKind::Validation, format!("invalid config: {e}")))
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::backend(format!("reading config {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Env var toggling parser tracing, read at lexer/parser construction.
    pub fn parser_debug_enabled() -> bool {
        std::env::var("CH_PARSER_DEBUG").is_ok_and(|v| v != "0" && !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_batch_size() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.etl_batch_size, 1000);
    }

    #[test]
    fn partial_toml_overlays_defaults() {
        let cfg = EngineConfig::from_toml_str("sql_port = 1543\n").unwrap();
        assert_eq!(cfg.sql_port, 1543);
        assert_eq!(cfg.etl_batch_size, 1000);
    }

    #[test]
    fn format_inferred_from_extension() {
        assert_eq!(TreeFormat::from_extension("YML"), Some(TreeFormat::Yaml));
        assert_eq!(TreeFormat::from_extension("bin"), Some(TreeFormat::Binary));
        assert_eq!(TreeFormat::from_extension("txt"), None);
    }
}
