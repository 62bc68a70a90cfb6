//! Per-document event reporting
//!
//! Pipeline stages report user-visible events through an injected `Reporter`
//! instead of process-wide state, so a test can capture exactly what one run
//! produced.

use std::{fmt, path::{Path, PathBuf}, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Report severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportSeverity {
    Info,
    Warning,
    Error,
}

/// Individual report entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: ReportSeverity,
    pub category: String,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl ReportEntry {
    pub fn new(severity: ReportSeverity, category: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            category: category.to_string(),
            message: message.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }
}

/// Report summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub info_count: usize,
    pub warning_count: usize,
    pub error_count: usize,
}

impl ReportSummary {
    pub fn from_entries(entries: &[ReportEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.severity {
                ReportSeverity::Info => summary.info_count += 1,
                ReportSeverity::Warning => summary.warning_count += 1,
                ReportSeverity::Error => summary.error_count += 1,
            }
        }
        summary
    }
}

/// Destination for report entries
pub trait ReportSink: Send + Sync + fmt::Debug {
    fn record(&self, entry: ReportEntry);
}

/// Forwards entries to `tracing` at the matching level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn record(&self, entry: ReportEntry) {
        let path = entry
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match entry.severity {
            ReportSeverity::Info => info!(category = %entry.category, %path, "{}", entry.message),
            ReportSeverity::Warning => warn!(category = %entry.category, %path, "{}", entry.message),
            ReportSeverity::Error => error!(category = %entry.category, %path, "{}", entry.message),
        }
    }
}

/// Collects entries in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<ReportEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ReportEntry> {
        self.entries.lock().clone()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_entries(&self.entries.lock())
    }

    /// Entries of the given category, in arrival order.
    pub fn category(&self, category: &str) -> Vec<ReportEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn record(&self, entry: ReportEntry) {
        self.entries.lock().push(entry);
    }
}

/// Shared report handle passed to each pipeline stage
#[derive(Debug, Clone)]
pub struct Reporter {
    sink: Arc<dyn ReportSink>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl Reporter {
    pub fn new(sink: Arc<dyn ReportSink>) -> Self {
        Self { sink }
    }

    pub fn record(&self, entry: ReportEntry) {
        self.sink.record(entry);
    }

    pub fn info(&self, path: &Path, category: &str, message: impl Into<String>) {
        self.record(ReportEntry::new(ReportSeverity::Info, category, message).with_path(path));
    }

    pub fn warn(&self, path: &Path, category: &str, message: impl Into<String>) {
        self.record(ReportEntry::new(ReportSeverity::Warning, category, message).with_path(path));
    }

    pub fn error(&self, path: &Path, category: &str, message: impl Into<String>) {
        self.record(ReportEntry::new(ReportSeverity::Error, category, message).with_path(path));
    }
}
