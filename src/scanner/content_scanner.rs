//! Lazy raw-byte scanning

use regex::bytes::Matches;

use super::{Finding, Location, ObfuscationScanner};
use crate::types::ObjectId;

/// Lazy sequence of findings over one buffer.
///
/// Patterns run one after another in configuration order; within a pattern,
/// matches are non-overlapping and in offset order.
pub struct Findings<'a> {
    scanner: &'a ObfuscationScanner,
    bytes: &'a [u8],
    object: Option<ObjectId>,
    next_pattern: usize,
    current: Option<(usize, Matches<'a, 'a>)>,
}

impl<'a> Findings<'a> {
    pub(crate) fn new(
        scanner: &'a ObfuscationScanner,
        bytes: &'a [u8],
        object: Option<ObjectId>,
    ) -> Self {
        Self {
            scanner,
            bytes,
            object,
            next_pattern: 0,
            current: None,
        }
    }

    fn location(&self, offset: usize) -> Location {
        match self.object {
            Some(id) => Location::Object { id, offset },
            None => Location::Offset(offset),
        }
    }
}

impl<'a> Iterator for Findings<'a> {
    type Item = Finding;

    fn next(&mut self) -> Option<Finding> {
        loop {
            if let Some((index, matches)) = self.current.as_mut() {
                if let Some(m) = matches.next() {
                    let pattern = &self.scanner.patterns[*index];
                    let location = self.location(m.start());
                    return Some(self.scanner.finding(
                        pattern,
                        self.bytes,
                        m.start(),
                        m.end(),
                        location,
                    ));
                }
            }

            let scanner = self.scanner;
            let pattern = scanner.patterns.get(self.next_pattern)?;
            self.current = Some((self.next_pattern, pattern.regex.find_iter(self.bytes)));
            self.next_pattern += 1;
        }
    }
}
