//! Conversion requests.

use crate::format::{canonical_format, format_from_path};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default account charged when the caller names none.
pub const DEFAULT_USER: &str = "local";

/// One conversion to perform.
///
/// The id is assigned at construction so callers can subscribe to progress
/// (see [`crate::progress::ProgressHub::subscribe`]) before submitting.
///
/// ```rust
/// use docshift::ConversionRequest;
///
/// let req = ConversionRequest::new("report.TXT", "out/report.html", "HTML");
/// assert_eq!(req.source_format(), "txt");
/// assert_eq!(req.target_format(), "html");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub conversion_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Declared source format. Inferred from `input_path` when `None`.
    pub source_format: Option<String>,
    pub target_format: String,
    pub user: String,
}

impl ConversionRequest {
    pub fn new(
        input_path: impl AsRef<Path>,
        output_path: impl AsRef<Path>,
        target_format: impl Into<String>,
    ) -> Self {
        Self {
            conversion_id: Uuid::new_v4().to_string(),
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
            source_format: None,
            target_format: target_format.into(),
            user: DEFAULT_USER.to_string(),
        }
    }

    pub fn with_source_format(mut self, format: impl Into<String>) -> Self {
        self.source_format = Some(format.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_id(mut self, conversion_id: impl Into<String>) -> Self {
        self.conversion_id = conversion_id.into();
        self
    }

    /// Canonical source format, or `"unknown"` if none was declared and the
    /// input has no extension.
    pub fn source_format(&self) -> String {
        match self.source_format.as_deref() {
            Some(f) if !f.trim().is_empty() => canonical_format(f),
            _ => format_from_path(&self.input_path).unwrap_or_else(|| "unknown".to_string()),
        }
    }

    pub fn target_format(&self) -> String {
        canonical_format(&self.target_format)
    }
}
