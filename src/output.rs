//! Result types returned by the conversion engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Outcome of one [`crate::convert::ConversionEngine::convert_file`] call.
///
/// `output_path` is present iff `success`; `classification` is present iff
/// the conversion failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub conversion_id: String,
    pub success: bool,
    /// Converter message, or the failure description. Prefixed with
    /// `normalized:<from>-><to>` when the source was re-encoded first.
    pub message: String,
    pub output_path: Option<PathBuf>,
    pub classification: Option<FailureKind>,
    /// Encoding transform applied to the source, if any.
    pub normalization: Option<EncodingTransform>,
    /// Credits charged for this conversion (0 on failure).
    pub credits_debited: u64,
}

impl ConversionResult {
    pub(crate) fn succeeded(
        conversion_id: String,
        message: String,
        output_path: PathBuf,
        normalization: Option<EncodingTransform>,
        credits_debited: u64,
    ) -> Self {
        Self {
            conversion_id,
            success: true,
            message,
            output_path: Some(output_path),
            classification: None,
            normalization,
            credits_debited,
        }
    }

    pub(crate) fn failed(conversion_id: String, kind: FailureKind, message: String) -> Self {
        Self {
            conversion_id,
            success: false,
            message,
            output_path: None,
            classification: Some(kind),
            normalization: None,
            credits_debited: 0,
        }
    }

    /// `(success, message)` view used by HTTP-style callers.
    pub fn as_tuple(&self) -> (bool, &str) {
        (self.success, &self.message)
    }
}

/// Why a conversion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedPair,
    InputNotFound,
    UnsalvageableInput,
    OutputConflict,
    NormalizationIo,
    ConverterFailure,
    EmptyOutput,
    InsufficientCredits,
    Bookkeeping,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::UnsupportedPair => "unsupported_pair",
            FailureKind::InputNotFound => "input_not_found",
            FailureKind::UnsalvageableInput => "unsalvageable_input",
            FailureKind::OutputConflict => "output_conflict",
            FailureKind::NormalizationIo => "normalization_io",
            FailureKind::ConverterFailure => "converter_failure",
            FailureKind::EmptyOutput => "empty_output",
            FailureKind::InsufficientCredits => "insufficient_credits",
            FailureKind::Bookkeeping => "bookkeeping",
        };
        f.write_str(s)
    }
}

/// The encoding rewrite performed before conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingTransform {
    pub from: String,
    pub to: String,
    pub backup_path: PathBuf,
    pub mojibake_repaired: bool,
}

impl EncodingTransform {
    /// The `normalized:<from>-><to>` marker prefixed to result messages.
    pub fn marker(&self) -> String {
        format!("normalized:{}->{}", self.from, self.to)
    }
}
