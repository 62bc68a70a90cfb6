//! Pipeline Orchestrator
//!
//! Drives one document through
//! `Parsed -> Scrubbed1 -> Rewritten -> Scrubbed2 -> Done`, falling back to
//! the first-pass artifact (`Failed -> FallbackDone`) when the structural
//! rewriter cannot produce a usable document. Batches run each document as
//! an independent task.

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::{
    cleaner::{CompactionReport, GraphCompactor, ScrubReport, Scrubber},
    config::ProcessingConfig,
    error::{CollaboratorFailure, Error, Result},
    pdf_document::{read_document_bytes, DocumentCodec, LopdfCodec, PdfDocument},
    report::Reporter,
    scanner::{Finding, ObfuscationScanner},
    structure::{linearization, StructuralRewriter},
    types::Document,
    utils::{
        destination_key, output_path_for, reclaim_stale_artifacts, sha256_hex, RunToken,
        TempArtifact,
    },
    verification::{RiskAssessment, RiskChecker},
};

/// States one document passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Parsed,
    Scrubbed1,
    Rewritten,
    Scrubbed2,
    Done,
    Failed,
    FallbackDone,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Removals and compaction of one sanitize pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub scrub: ScrubReport,
    pub compaction: CompactionReport,
    /// Whether compaction exposed packed objects and the pass ran again
    pub repeated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizeOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub states: Vec<PipelineState>,
    pub rewriter: String,
    pub fallback_reason: Option<String>,
    pub first_pass: PassReport,
    pub second_pass: Option<PassReport>,
    pub risk: RiskAssessment,
    pub input_sha256: String,
    pub output_sha256: String,
}

impl SanitizeOutcome {
    pub fn final_state(&self) -> Option<PipelineState> {
        self.states.last().copied()
    }

    pub fn used_fallback(&self) -> bool {
        self.final_state() == Some(PipelineState::FallbackDone)
    }
}

/// Findings for one input in scan-only mode
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub input: PathBuf,
    pub raw: Vec<Finding>,
    pub objects: Vec<Finding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Sanitized,
    SanitizedWithFallback,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub input: PathBuf,
    pub status: DocumentStatus,
    pub outcome: Option<SanitizeOutcome>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    pub reclaimed_artifacts: usize,
}

impl BatchReport {
    /// True when every input produced an output, fallback included.
    pub fn all_sanitized(&self) -> bool {
        self.documents
            .iter()
            .all(|d| d.status != DocumentStatus::Failed)
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.documents.iter().filter(|d| d.status == status).count()
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_sanitized() {
            0
        } else {
            1
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<ProcessingConfig>,
    codec: Arc<dyn DocumentCodec>,
    rewriter: Arc<dyn StructuralRewriter>,
    reporter: Reporter,
    scrubber: Scrubber,
    compactor: GraphCompactor,
    risk_checker: RiskChecker,
    scanner: ObfuscationScanner,
}

impl Pipeline {
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        config.validate()?;
        let codec: Arc<dyn DocumentCodec> = Arc::new(LopdfCodec);
        let max_stream = config.max_stream_bytes;
        let rewriter = linearization::from_config(&config.rewriter, codec.clone(), max_stream);
        Ok(Self {
            scrubber: Scrubber::new(config.denylist.clone()),
            compactor: GraphCompactor::new(max_stream),
            risk_checker: RiskChecker::new(config.denylist.clone(), max_stream),
            scanner: ObfuscationScanner::from_config(&config.scanner)?,
            reporter: Reporter::default(),
            config: Arc::new(config),
            codec,
            rewriter,
        })
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn StructuralRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replaces the codec used for parsing and serializing. The configured
    /// rewriter is left as is.
    pub fn with_codec(mut self, codec: Arc<dyn DocumentCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }

    /// Sanitizes one document, reporting any failure with its path.
    pub async fn execute(&self, input: &Path) -> Result<SanitizeOutcome> {
        match self.run(input).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.reporter.error(input, "failure", e.to_string());
                Err(e)
            }
        }
    }

    #[instrument(skip_all, fields(input = %input.display()))]
    async fn run(&self, input: &Path) -> Result<SanitizeOutcome> {
        let output = output_path_for(input, self.config.output_dir.as_deref())?;
        let PdfDocument {
            mut document,
            bytes,
        } = PdfDocument::load(input, self.codec.as_ref()).await?;
        let mut states = Vec::new();
        self.transition(input, &mut states, PipelineState::Parsed);

        let first_pass = self.sanitize(input, &mut document)?;
        let scrubbed1 = self.codec.serialize(&document)?;
        self.transition(input, &mut states, PipelineState::Scrubbed1);

        let temp_dir = self.config.temp_dir();
        tokio::fs::create_dir_all(&temp_dir).await?;
        let token = RunToken::new();
        let stage1 = TempArtifact::new(token.artifact_path(&temp_dir, "stage1"));
        let stage2 = TempArtifact::new(token.artifact_path(&temp_dir, "stage2"));
        tokio::fs::write(stage1.path(), &scrubbed1).await?;

        let (final_bytes, final_document, second_pass, fallback_reason) =
            match self.second_pass(input, stage1.path(), stage2.path()).await {
                Ok((bytes, document, report)) => {
                    self.transition(input, &mut states, PipelineState::Rewritten);
                    self.transition(input, &mut states, PipelineState::Scrubbed2);
                    (bytes, document, Some(report), None)
                }
                Err(e) if e.is_recoverable() => {
                    let reason = e.to_string();
                    self.reporter.warn(
                        input,
                        "fallback",
                        format!("{} failed, keeping first-pass output: {reason}", self.rewriter.name()),
                    );
                    self.transition(input, &mut states, PipelineState::Failed);
                    (scrubbed1, document, None, Some(reason))
                }
                Err(e) => return Err(e),
            };

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&output, &final_bytes).await?;
        let done = if fallback_reason.is_some() {
            PipelineState::FallbackDone
        } else {
            PipelineState::Done
        };
        self.transition(input, &mut states, done);

        let risk = self.risk_checker.assess(&final_document);
        if !risk.is_clean() {
            self.reporter.warn(
                input,
                "risk",
                format!("residual risk score {} after sanitizing", risk.score()),
            );
        }

        info!(output = %output.display(), final_state = %done, "document sanitized");
        Ok(SanitizeOutcome {
            input: input.to_path_buf(),
            output,
            states,
            rewriter: self.rewriter.name().to_string(),
            fallback_reason,
            first_pass,
            second_pass,
            risk,
            input_sha256: sha256_hex(&bytes),
            output_sha256: sha256_hex(&final_bytes),
        })
    }

    /// Scrub then compact. When compaction exposed packed objects, both run
    /// once more so the pass never emits content hidden in a container.
    fn sanitize(&self, input: &Path, document: &mut Document) -> Result<PassReport> {
        let mut scrub = self.scrubber.scrub(document);
        let mut compaction = self.compactor.compact(document)?;
        let repeated = compaction.containers_expanded > 0;
        if repeated {
            scrub.merge(self.scrubber.scrub(document));
            let again = self.compactor.compact(document)?;
            compaction.objects_removed += again.objects_removed;
        }

        for removal in &scrub.removals {
            self.reporter.info(
                input,
                "removal",
                format!("removed /{} from {} {}", removal.key, removal.role, removal.object),
            );
        }
        Ok(PassReport {
            scrub,
            compaction,
            repeated,
        })
    }

    /// Rewrite, re-parse and sanitize again.
    ///
    /// A rewrite whose output cannot be parsed or compacted counts as a
    /// malformed result from the rewriter.
    async fn second_pass(
        &self,
        input: &Path,
        stage1: &Path,
        stage2: &Path,
    ) -> Result<(Vec<u8>, Document, PassReport)> {
        self.rewriter.rewrite(stage1, stage2).await?;

        let malformed = |reason: String| -> Error {
            CollaboratorFailure::MalformedOutput {
                tool: self.rewriter.name().to_string(),
                reason,
            }
            .into()
        };
        let rewritten = tokio::fs::read(stage2)
            .await
            .map_err(|e| malformed(e.to_string()))?;
        let mut document = self
            .codec
            .parse(&rewritten)
            .map_err(|e| malformed(e.to_string()))?;
        debug!(objects = document.objects.len(), "re-parsed rewritten document");

        let report = self
            .sanitize(input, &mut document)
            .map_err(|e| malformed(e.to_string()))?;
        let bytes = self.codec.serialize(&document)?;
        Ok((bytes, document, report))
    }

    fn transition(&self, input: &Path, states: &mut Vec<PipelineState>, state: PipelineState) {
        if states.last() != Some(&state) {
            states.push(state);
        }
        debug!(%state, "state transition");
        self.reporter.info(input, "state", state.to_string());
    }

    /// Sanitizes every input concurrently, isolating per-document failures.
    #[instrument(skip_all, fields(documents = inputs.len()))]
    pub async fn execute_batch(&self, inputs: &[PathBuf]) -> BatchReport {
        let reclaimed_artifacts = match reclaim_stale_artifacts(
            &self.config.temp_dir(),
            self.config.stale_artifact_age(),
        )
        .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "could not reclaim stale artifacts");
                0
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_documents));
        let handles: Vec<_> = inputs
            .iter()
            .zip(self.destination_conflicts(inputs))
            .map(|(input, conflict)| {
                let pipeline = self.clone();
                let semaphore = semaphore.clone();
                let input = input.clone();
                tokio::spawn(async move {
                    if let Some(e) = conflict {
                        pipeline.reporter.error(&input, "failure", e.to_string());
                        return Err(e);
                    }
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::ConcurrencyError(e.to_string()))?;
                    pipeline.execute(&input).await
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let documents = inputs
            .iter()
            .zip(results)
            .map(|(input, joined)| {
                let result = joined.map_err(Error::from).and_then(|r| r);
                match result {
                    Ok(outcome) => DocumentReport {
                        input: input.clone(),
                        status: if outcome.used_fallback() {
                            DocumentStatus::SanitizedWithFallback
                        } else {
                            DocumentStatus::Sanitized
                        },
                        outcome: Some(outcome),
                        error: None,
                    },
                    Err(e) => DocumentReport {
                        input: input.clone(),
                        status: DocumentStatus::Failed,
                        outcome: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect();

        let report = BatchReport {
            documents,
            reclaimed_artifacts,
        };
        info!(
            sanitized = report.count(DocumentStatus::Sanitized),
            fallback = report.count(DocumentStatus::SanitizedWithFallback),
            failed = report.count(DocumentStatus::Failed),
            "batch finished"
        );
        report
    }

    /// One entry per input: an error when an earlier input already claimed the
    /// same output path, so no output is ever written twice.
    fn destination_conflicts(&self, inputs: &[PathBuf]) -> Vec<Option<Error>> {
        let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
        inputs
            .iter()
            .map(|input| {
                let output = output_path_for(input, self.config.output_dir.as_deref()).ok()?;
                match claimed.entry(destination_key(&output)) {
                    Entry::Occupied(first) => Some(Error::ConfigError(format!(
                        "output {} is already claimed by {}",
                        output.display(),
                        first.get().display()
                    ))),
                    Entry::Vacant(slot) => {
                        slot.insert(input.as_path());
                        None
                    }
                }
            })
            .collect()
    }

    /// Runs the obfuscation scanner over the raw bytes and parsed objects of
    /// `input`. Never writes anything.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub async fn scan(&self, input: &Path) -> Result<ScanReport> {
        let bytes = read_document_bytes(input).await?;
        let raw: Vec<Finding> = self.scanner.scan(&bytes).collect();
        let objects = match self.codec.parse(&bytes) {
            Ok(document) => self.scanner.scan_document(&document),
            Err(e) => {
                self.reporter.warn(
                    input,
                    "scan",
                    format!("object scan skipped, document did not parse: {e}"),
                );
                Vec::new()
            }
        };
        for finding in raw.iter().chain(&objects) {
            self.reporter.info(
                input,
                "finding",
                format!("{} at {}: {}", finding.pattern, finding.location, finding.decoded),
            );
        }
        Ok(ScanReport {
            input: input.to_path_buf(),
            raw,
            objects,
        })
    }
}
