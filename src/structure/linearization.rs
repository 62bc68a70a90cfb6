//! Structural rewrite collaborators
//!
//! A rewriter takes a serialized document on disk and writes a compacted copy:
//! object streams disabled, unreferenced objects dropped. The production
//! implementation shells out to `qpdf`; the builtin one compacts in-process.

use std::{
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::{
    cleaner::GraphCompactor,
    config::{RewriterConfig, RewriterKind},
    error::{CollaboratorFailure, Error, Result},
    pdf_document::{has_signature, DocumentCodec},
};

/// Longest stderr excerpt kept in a failure.
const MAX_STDERR: usize = 2048;

#[async_trait]
pub trait StructuralRewriter: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Rewrites `input` into `output`. Any failure is reported as
    /// `Error::CollaboratorFailure`.
    async fn rewrite(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Builds the rewriter selected by `config`.
pub fn from_config(
    config: &RewriterConfig,
    codec: Arc<dyn DocumentCodec>,
    max_decoded_bytes: usize,
) -> Arc<dyn StructuralRewriter> {
    match config.kind {
        RewriterKind::Qpdf => Arc::new(QpdfRewriter::new(
            config.program.clone(),
            config.timeout(),
            config.qdf,
        )),
        RewriterKind::Builtin => Arc::new(BuiltinRewriter::new(
            codec,
            GraphCompactor::new(max_decoded_bytes),
        )),
    }
}

/// Runs `qpdf` as a child process under a timeout
#[derive(Debug, Clone)]
pub struct QpdfRewriter {
    program: PathBuf,
    timeout: Duration,
    qdf: bool,
}

impl QpdfRewriter {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration, qdf: bool) -> Self {
        Self {
            program: program.into(),
            timeout,
            qdf,
        }
    }

    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = Vec::new();
        if self.qdf {
            args.push("--qdf".into());
            args.push("--stream-data=uncompress".into());
        } else {
            args.push("--linearize".into());
        }
        args.push("--object-streams=disable".into());
        args.push("--remove-unreferenced-resources=yes".into());
        args.push(input.into());
        args.push(output.into());
        args
    }

    fn tool(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait]
impl StructuralRewriter for QpdfRewriter {
    fn name(&self) -> &str {
        "qpdf"
    }

    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn rewrite(&self, input: &Path, output: &Path) -> Result<()> {
        let child = Command::new(&self.program)
            .args(self.arguments(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CollaboratorFailure::Missing {
                tool: self.tool(),
                reason: e.to_string(),
            })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorFailure::TimedOut {
                tool: self.tool(),
                timeout: self.timeout,
            })?
            .map_err(|e| CollaboratorFailure::Exited {
                tool: self.tool(),
                code: None,
                stderr: e.to_string(),
            })?;

        if !result.status.success() {
            let mut stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            if stderr.len() > MAX_STDERR {
                let cut = (0..=MAX_STDERR)
                    .rev()
                    .find(|i| stderr.is_char_boundary(*i))
                    .unwrap_or(0);
                stderr.truncate(cut);
            }
            return Err(CollaboratorFailure::Exited {
                tool: self.tool(),
                code: result.status.code(),
                stderr,
            }
            .into());
        }

        let written = tokio::fs::read(output)
            .await
            .map_err(|e| CollaboratorFailure::MalformedOutput {
                tool: self.tool(),
                reason: format!("output unreadable: {e}"),
            })?;
        if !has_signature(&written) {
            return Err(CollaboratorFailure::MalformedOutput {
                tool: self.tool(),
                reason: "output does not start with %PDF-".into(),
            }
            .into());
        }
        debug!(bytes = written.len(), "qpdf rewrite finished");
        Ok(())
    }
}

/// Parse, compact and serialize in-process
#[derive(Debug, Clone)]
pub struct BuiltinRewriter {
    codec: Arc<dyn DocumentCodec>,
    compactor: GraphCompactor,
}

impl BuiltinRewriter {
    pub fn new(codec: Arc<dyn DocumentCodec>, compactor: GraphCompactor) -> Self {
        Self { codec, compactor }
    }

    fn failure(reason: impl fmt::Display) -> Error {
        CollaboratorFailure::MalformedOutput {
            tool: "builtin".into(),
            reason: reason.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl StructuralRewriter for BuiltinRewriter {
    fn name(&self) -> &str {
        "builtin"
    }

    #[instrument(skip(self))]
    async fn rewrite(&self, input: &Path, output: &Path) -> Result<()> {
        let bytes = tokio::fs::read(input).await.map_err(Self::failure)?;
        let mut document = self.codec.parse(&bytes).map_err(Self::failure)?;
        let report = self.compactor.compact(&mut document).map_err(Self::failure)?;
        let rewritten = self.codec.serialize(&document).map_err(Self::failure)?;
        tokio::fs::write(output, &rewritten).await.map_err(Self::failure)?;
        info!(removed = report.objects_removed, "builtin rewrite finished");
        Ok(())
    }
}
