//! Obfuscation Scanner
//!
//! Byte-pattern search with speculative decoding of each match's context.
//! Read-only and advisory: findings are hints for an operator, false
//! positives are expected and some encodings will be missed.

use std::{fmt, sync::Arc};

use lazy_static::lazy_static;
use regex::bytes::Regex;
use serde::{Serialize, Serializer};

use crate::{
    config::{PatternConfig, ScannerConfig},
    error::Result,
    types::ObjectId,
};

pub mod content_scanner;
pub mod decoders;
pub mod object_scanner;

pub use self::{content_scanner::Findings, decoders::Decoded};

lazy_static! {
    static ref DEFAULT_PATTERNS: Vec<Pattern> = [
        ("script-tag", r"(?i)<\s*script"),
        ("eval-call", r"eval\s*\("),
        ("unescape-call", r"unescape\s*\("),
        ("from-char-code", r"String\.fromCharCode\s*\("),
        ("hex-escape", r"(?:\\x[0-9a-fA-F]{2})+"),
        ("unicode-escape", r"(?:%u[0-9a-fA-F]{4})+"),
        ("percent-encoding", r"(?:%[0-9a-fA-F]{2}){2,}"),
        ("js-name", r"/(?:JS|JavaScript)\b"),
        ("hex-run", r"[0-9a-fA-F]{32,}"),
    ]
    .into_iter()
    .map(|(name, source)| Pattern {
        name: name.to_string(),
        regex: Regex::new(source).unwrap(),
    })
    .collect();
}

/// A named byte pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub regex: Regex,
}

impl Pattern {
    pub fn new(name: &str, source: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            regex: Regex::new(source)?,
        })
    }
}

/// Where a match was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Location {
    /// Byte offset into a raw buffer
    Offset(usize),
    /// Offset into a string, name or decoded stream of an indirect object
    Object { id: ObjectId, offset: usize },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Offset(offset) => write!(f, "offset {offset}"),
            Location::Object { id, offset } => write!(f, "object {id} +{offset}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub pattern: String,
    pub location: Location,
    #[serde(serialize_with = "lossy")]
    pub matched: Vec<u8>,
    #[serde(serialize_with = "lossy")]
    pub context: Vec<u8>,
    pub decoded: Decoded,
}

fn lossy<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

#[derive(Debug, Clone)]
pub struct ObfuscationScanner {
    patterns: Arc<[Pattern]>,
    context_window: usize,
    max_decoded_bytes: usize,
}

impl Default for ObfuscationScanner {
    fn default() -> Self {
        let config = ScannerConfig::default();
        Self {
            patterns: DEFAULT_PATTERNS.iter().cloned().collect(),
            context_window: config.context_window,
            max_decoded_bytes: config.max_decoded_bytes,
        }
    }
}

impl ObfuscationScanner {
    /// Builds a scanner from config; custom patterns replace the defaults.
    pub fn from_config(config: &ScannerConfig) -> Result<Self> {
        let patterns: Arc<[Pattern]> = if config.patterns.is_empty() {
            DEFAULT_PATTERNS.iter().cloned().collect()
        } else {
            config
                .patterns
                .iter()
                .map(|PatternConfig { name, regex }| Pattern::new(name, regex))
                .collect::<Result<Vec<_>>>()?
                .into()
        };
        Ok(Self {
            patterns,
            context_window: config.context_window,
            max_decoded_bytes: config.max_decoded_bytes,
        })
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn context_window(&self) -> usize {
        self.context_window
    }

    /// Lazily scans `bytes`. Every call yields the same sequence.
    pub fn scan<'a>(&'a self, bytes: &'a [u8]) -> Findings<'a> {
        Findings::new(self, bytes, None)
    }

    /// Context window around `start..end`, clamped to `bytes`.
    fn context<'b>(&self, bytes: &'b [u8], start: usize, end: usize) -> &'b [u8] {
        let from = start.saturating_sub(self.context_window);
        let to = end.saturating_add(self.context_window).min(bytes.len());
        &bytes[from..to]
    }

    fn finding(
        &self,
        pattern: &Pattern,
        bytes: &[u8],
        start: usize,
        end: usize,
        location: Location,
    ) -> Finding {
        let context = self.context(bytes, start, end);
        Finding {
            pattern: pattern.name.clone(),
            location,
            matched: bytes[start..end].to_vec(),
            context: context.to_vec(),
            decoded: decoders::decode(context, self.max_decoded_bytes),
        }
    }
}
