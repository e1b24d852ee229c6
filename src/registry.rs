//! Converter registry: an immutable `(source, target) → converter` map.
//!
//! The registry is built once from an explicit manifest of
//! [`ConverterDescriptor`]s and never mutated afterwards, so it can be
//! shared across worker tasks as an `Arc<ConverterRegistry>` without
//! locking. Duplicate pairs are rejected at construction time; a process
//! should refuse to start rather than discover the conflict per request.
//!
//! Lookup is exact-pair only. Chaining converters (`md -> html -> txt`) is
//! not the registry's job.

use crate::error::RegistryError;
use crate::format::canonical_format;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// What a converter reports back. Expected failures (corrupt input,
/// unsupported content) are `success = false`, never a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterReport {
    pub success: bool,
    pub message: String,
}

impl ConverterReport {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl<E: fmt::Display> From<Result<String, E>> for ConverterReport {
    fn from(r: Result<String, E>) -> Self {
        match r {
            Ok(msg) => ConverterReport::ok(msg),
            Err(e) => ConverterReport::failed(e.to_string()),
        }
    }
}

/// The one converter signature: `(input_path, output_path) -> report`.
pub type ConverterFn = fn(&Path, &Path) -> ConverterReport;

/// A manifest line: which pair a converter handles.
#[derive(Clone, Copy)]
pub struct ConverterDescriptor {
    pub source: &'static str,
    pub target: &'static str,
    pub convert: ConverterFn,
}

impl fmt::Debug for ConverterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterDescriptor")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

/// A canonical `(source, target)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FormatPair {
    pub source: String,
    pub target: String,
}

impl FormatPair {
    /// Canonicalizes both tokens.
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: canonical_format(source),
            target: canonical_format(target),
        }
    }
}

impl fmt::Display for FormatPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

pub struct ConverterRegistry {
    converters: BTreeMap<FormatPair, ConverterFn>,
}

impl ConverterRegistry {
    /// Build from a manifest, rejecting empty tokens and duplicate pairs.
    pub fn from_descriptors<'a>(
        descriptors: impl IntoIterator<Item = &'a ConverterDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut converters = BTreeMap::new();
        for d in descriptors {
            let pair = FormatPair::new(d.source, d.target);
            for token in [&pair.source, &pair.target] {
                if token.is_empty() || token.contains(char::is_whitespace) {
                    return Err(RegistryError::InvalidToken {
                        token: token.clone(),
                    });
                }
            }
            if converters.contains_key(&pair) {
                return Err(RegistryError::DuplicatePair {
                    source_format: pair.source,
                    target_format: pair.target,
                });
            }
            converters.insert(pair, d.convert);
        }
        Ok(Self { converters })
    }

    /// The built-in converter manifest.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_descriptors(crate::converters::MANIFEST)
    }

    /// Exact-pair lookup. Tokens are canonicalized first.
    pub fn get(&self, source: &str, target: &str) -> Option<ConverterFn> {
        self.converters.get(&FormatPair::new(source, target)).copied()
    }

    pub fn contains(&self, source: &str, target: &str) -> bool {
        self.get(source, target).is_some()
    }

    /// All registered pairs, sorted.
    pub fn pairs(&self) -> Vec<FormatPair> {
        self.converters.keys().cloned().collect()
    }

    /// Targets reachable from `source` in one step, sorted.
    pub fn targets_for(&self, source: &str) -> Vec<String> {
        let source = canonical_format(source);
        self.converters
            .keys()
            .filter(|p| p.source == source)
            .map(|p| p.target.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("pairs", &self.converters.keys().map(|p| p.to_string()).collect::<Vec<_>>())
            .finish()
    }
}
