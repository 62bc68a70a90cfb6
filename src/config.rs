//! Configuration types and validation for the pipeline

use std::{path::{Path, PathBuf}, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    cleaner::{Denylist, DEFAULT_MAX_DECODED_BYTES},
    error::{Error, Result},
};

/// Which structural rewriter the pipeline hands documents to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriterKind {
    /// External `qpdf` process
    Qpdf,
    /// In-process compaction
    Builtin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriterConfig {
    pub kind: RewriterKind,
    pub program: PathBuf,
    pub timeout_secs: u64,
    /// Emit qpdf's human-diffable QDF form instead of linearizing
    pub qdf: bool,
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            kind: RewriterKind::Qpdf,
            program: PathBuf::from("qpdf"),
            timeout_secs: 60,
            qdf: false,
        }
    }
}

impl RewriterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A named byte pattern for the obfuscation scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub regex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Bytes of context kept on each side of a match
    pub context_window: usize,
    pub max_decoded_bytes: usize,
    /// Replaces the built-in patterns when non-empty
    pub patterns: Vec<PatternConfig>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            context_window: 50,
            max_decoded_bytes: 1024 * 1024,
            patterns: Vec::new(),
        }
    }
}

/// Global pipeline execution config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub denylist: Denylist,
    pub rewriter: RewriterConfig,
    pub output_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub max_concurrent_documents: usize,
    pub stale_artifact_age_secs: u64,
    /// Cap on the decoded size of one stream during compaction and risk checks
    pub max_stream_bytes: usize,
    pub scanner: ScannerConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            denylist: Denylist::default(),
            rewriter: RewriterConfig::default(),
            output_dir: None,
            temp_dir: None,
            max_concurrent_documents: num_cpus::get(),
            stale_artifact_age_secs: 3600,
            max_stream_bytes: DEFAULT_MAX_DECODED_BYTES,
            scanner: ScannerConfig::default(),
        }
    }
}

impl ProcessingConfig {
    /// Loads a config file, trying JSON first and then YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("failed to read {}: {e}", path.display())))?;
        Self::from_str_any(&content)
    }

    pub fn from_str_any(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .or_else(|_| serde_yaml::from_str(content))
            .map_err(|e| Error::ConfigError(format!("config parsing error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rewriter.timeout_secs == 0 {
            return Err(Error::ConfigError("rewriter timeout must be at least 1 second".into()));
        }
        if self.max_concurrent_documents == 0 {
            return Err(Error::ConfigError("concurrency must be at least 1".into()));
        }
        if self.max_stream_bytes == 0 || self.scanner.max_decoded_bytes == 0 {
            return Err(Error::ConfigError("decoded size limits must be positive".into()));
        }
        if self.denylist.is_empty() {
            return Err(Error::ConfigError(format!(
                "denylist '{}' has no rules",
                self.denylist.name
            )));
        }
        if self.scanner.context_window == 0 {
            return Err(Error::ConfigError("scanner context window must be positive".into()));
        }
        for pattern in &self.scanner.patterns {
            regex::bytes::Regex::new(&pattern.regex).map_err(|e| {
                Error::ConfigError(format!("pattern '{}' does not compile: {e}", pattern.name))
            })?;
        }
        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn stale_artifact_age(&self) -> Duration {
        Duration::from_secs(self.stale_artifact_age_secs)
    }
}
