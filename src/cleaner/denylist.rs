//! Active-content denylist
//!
//! A denylist is a named set of `(role, key)` pairs. Both scrubbing passes
//! consult the same instance, so it is the single definition of what counts
//! as active content for a run.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which kind of object a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectRole {
    Page,
    Annotation,
    Catalog,
}

impl fmt::Display for ObjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectRole::Page => "Page",
            ObjectRole::Annotation => "Annotation",
            ObjectRole::Catalog => "Catalog",
        })
    }
}

/// One `(role, key)` pair to strip
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DenyRule {
    pub role: ObjectRole,
    pub key: String,
}

impl DenyRule {
    pub fn new(role: ObjectRole, key: &str) -> Self {
        Self {
            role,
            key: key.to_string(),
        }
    }
}

/// Built-in policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenylistPreset {
    /// Every known trigger, including form and outline trees
    Strict,
    /// Keeps `AcroForm` and `Outlines` on the catalog
    PreserveNavigation,
}

impl FromStr for DenylistPreset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "strict" => Ok(Self::Strict),
            "preserve-navigation" => Ok(Self::PreserveNavigation),
            other => Err(Error::ConfigError(format!("unknown denylist preset '{other}'"))),
        }
    }
}

const PAGE_KEYS: [&str; 3] = ["Annots", "AA", "JS"];
const ANNOTATION_KEYS: [&str; 1] = ["A"];
const CATALOG_KEYS: [&str; 6] = [
    "Names",
    "OpenAction",
    "AA",
    "AcroForm",
    "Outlines",
    "JavaScript",
];
const NAVIGATION_KEYS: [&str; 2] = ["AcroForm", "Outlines"];

/// Named, ordered set of rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denylist {
    pub name: String,
    pub rules: Vec<DenyRule>,
}

impl Default for Denylist {
    fn default() -> Self {
        Self::preset(DenylistPreset::Strict)
    }
}

impl Denylist {
    pub fn new(name: impl Into<String>, rules: Vec<DenyRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    pub fn preset(preset: DenylistPreset) -> Self {
        let rules = PAGE_KEYS
            .iter()
            .map(|key| DenyRule::new(ObjectRole::Page, key))
            .chain(
                ANNOTATION_KEYS
                    .iter()
                    .map(|key| DenyRule::new(ObjectRole::Annotation, key)),
            )
            .chain(
                CATALOG_KEYS
                    .iter()
                    .filter(|key| {
                        preset == DenylistPreset::Strict || !NAVIGATION_KEYS.contains(*key)
                    })
                    .map(|key| DenyRule::new(ObjectRole::Catalog, key)),
            )
            .collect();

        let name = match preset {
            DenylistPreset::Strict => "strict",
            DenylistPreset::PreserveNavigation => "preserve-navigation",
        };
        Self::new(name, rules)
    }

    /// Keys to strip from objects of `role`, in rule order.
    pub fn keys_for(&self, role: ObjectRole) -> impl Iterator<Item = &str> + '_ {
        self.rules
            .iter()
            .filter(move |rule| rule.role == role)
            .map(|rule| rule.key.as_str())
    }

    pub fn denies(&self, role: ObjectRole, key: &[u8]) -> bool {
        self.keys_for(role).any(|denied| denied.as_bytes() == key)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
