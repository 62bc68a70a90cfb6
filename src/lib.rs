//! Main Library File for PDF Active-Content Scrubbing
//! Removes automatic actions, scripts and interactive forms from PDF
//! documents, compacts the object graph, and scans content for obfuscated
//! script payloads.

// Configuration and Core Pipeline
pub mod config;
pub mod error;
pub mod pipeline;
pub mod types;

// Object Model Adapter
pub mod pdf_document;
pub mod structure;

// Scrubbing and Compaction
pub mod cleaner;

// Residual Risk Assessment
pub mod verification;

// Obfuscation Scanner
pub mod scanner;

// Report Generation
pub mod report;

// Shared Utilities
pub mod utils;

// Re-exports for crate consumers
pub use cleaner::{Denylist, DenylistPreset, GraphCompactor, ObjectRole, ScrubReport, Scrubber};
pub use config::{ProcessingConfig, RewriterKind};
pub use error::{CollaboratorFailure, Error, Result, StructureError};
pub use pdf_document::{DocumentCodec, LopdfCodec, PdfDocument};
pub use pipeline::{BatchReport, Pipeline, PipelineState, SanitizeOutcome, ScanReport};
pub use report::{MemorySink, ReportEntry, ReportSeverity, ReportSink, Reporter};
pub use scanner::{Finding, ObfuscationScanner};
pub use structure::{BuiltinRewriter, QpdfRewriter, StructuralRewriter};
pub use types::{Dictionary, Document, ObjectId, Stream, Value};
