//! Error types for the docshift library.
//!
//! Each component owns one error enum so that callers can match on exactly
//! the failures that component can produce:
//!
//! * [`ConvertError`]: a single conversion attempt failed. The engine never
//!   returns it directly: [`crate::convert::ConversionEngine::convert_file`]
//!   folds it into a failed [`crate::output::ConversionResult`] whose
//!   `classification` is [`ConvertError::kind`].
//!
//! * [`NormalizeError`]: the encoding normalizer could not read or rewrite a
//!   file.
//!
//! * [`RegistryError`]: the converter manifest is inconsistent. This is the
//!   only error that is fatal at startup.
//!
//! * [`UndoError`] / [`LedgerError`]: undo bookkeeping and credit movements.
//!
//! * [`DocShiftError`]: configuration and internal failures surfaced by
//!   builders and sync wrappers.

use crate::output::FailureKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single conversion attempt.
///
/// Every message names the conversion pair and the underlying cause, so the
/// `Display` output can be handed to an end user unchanged.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Dispatch ──────────────────────────────────────────────────────────
    /// No converter is registered for the canonical pair.
    #[error("Unsupported conversion pair {source_format} -> {target_format}: no converter is registered")]
    UnsupportedPair {
        source_format: String,
        target_format: String,
    },

    // ── Input ─────────────────────────────────────────────────────────────
    /// The input file is missing, unreadable, or not a regular file.
    #[error("Input file for {pair} not found or unreadable: '{path}'")]
    InputNotFound { pair: String, path: PathBuf },

    /// A text-like source is binary or undecodable under every probed encoding.
    #[error("Input '{path}' for {pair} is unsalvageable: not valid text under any probed encoding")]
    UnsalvageableInput { pair: String, path: PathBuf },

    /// The output path would overwrite the input or its `.bak` backup.
    #[error("Output '{path}' for {pair} would overwrite the input or its backup; choose another output path")]
    OutputConflict { pair: String, path: PathBuf },

    /// Normalizing the source to UTF-8 failed on I/O.
    #[error("Encoding normalization failed for {pair}: {source}")]
    NormalizationIo {
        pair: String,
        #[source]
        source: NormalizeError,
    },

    // ── Converter ─────────────────────────────────────────────────────────
    /// The converter reported failure or panicked.
    #[error("Conversion {pair} failed: {message}")]
    ConverterFailure { pair: String, message: String },

    /// The converter reported success but left no usable output.
    #[error("Conversion {pair} failed: converter reported success but produced no output at '{path}'")]
    EmptyOutput { pair: String, path: PathBuf },

    // ── Bookkeeping ───────────────────────────────────────────────────────
    /// The requesting user cannot pay for the conversion.
    #[error("Conversion {pair} refused: user '{user}' has {available} credits, {required} required")]
    InsufficientCredits {
        pair: String,
        user: String,
        required: u64,
        available: u64,
    },

    /// Credits or the conversion journal could not be updated.
    #[error("Conversion {pair} could not be recorded: {detail}")]
    Bookkeeping { pair: String, detail: String },
}

impl ConvertError {
    /// Classification reported in [`crate::output::ConversionResult`].
    pub fn kind(&self) -> FailureKind {
        match self {
            ConvertError::UnsupportedPair { .. } => FailureKind::UnsupportedPair,
            ConvertError::InputNotFound { .. } => FailureKind::InputNotFound,
            ConvertError::UnsalvageableInput { .. } => FailureKind::UnsalvageableInput,
            ConvertError::OutputConflict { .. } => FailureKind::OutputConflict,
            ConvertError::NormalizationIo { .. } => FailureKind::NormalizationIo,
            ConvertError::ConverterFailure { .. } => FailureKind::ConverterFailure,
            ConvertError::EmptyOutput { .. } => FailureKind::EmptyOutput,
            ConvertError::InsufficientCredits { .. } => FailureKind::InsufficientCredits,
            ConvertError::Bookkeeping { .. } => FailureKind::Bookkeeping,
        }
    }
}

/// Failures of the encoding normalizer.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NormalizeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            NormalizeError::NotFound { path }
        } else {
            NormalizeError::Io { path, source }
        }
    }
}

/// Inconsistent converter manifest. Fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Converter for {source_format} -> {target_format} is registered twice")]
    DuplicatePair {
        source_format: String,
        target_format: String,
    },

    #[error("Invalid format token '{token}' in converter manifest")]
    InvalidToken { token: String },
}

/// Credit movements that could not be applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("User '{user}' has {available} credits, {required} required")]
    InsufficientCredits {
        user: String,
        required: u64,
        available: u64,
    },

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

/// Failures of [`crate::undo::UndoManager::undo`]. None of them leave the
/// ledger half-updated.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error("Nothing to undo: no conversion '{conversion_id}' was recorded")]
    NotFound { conversion_id: String },

    #[error("Conversion '{conversion_id}' was already undone at {undone_at}")]
    AlreadyUndone {
        conversion_id: String,
        undone_at: String,
    },

    #[error("Failed to restore '{path}' from its backup: {source}")]
    Restore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refund failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Conversion journal error: {0}")]
    Journal(#[source] std::io::Error),
}

/// Configuration and internal errors.
#[derive(Debug, Error)]
pub enum DocShiftError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
