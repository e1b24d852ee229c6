//! # docshift
//!
//! File-format conversion core: a registry of per-format-pair converters, an
//! encoding normalizer that repairs text before conversion, and credit/undo
//! bookkeeping that stays consistent when a conversion fails.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Resolve     canonicalize formats, look up the (source, target) converter
//!  ├─ 2. Input       readable regular file; output must not overwrite it
//!  ├─ 3. Credits     the user must be able to pay for the conversion
//!  ├─ 4. Normalize   text-like sources: classify, re-encode to UTF-8, keep .bak
//!  ├─ 5. Convert     converter runs on the blocking pool (panics contained)
//!  ├─ 6. Verify      output must exist and be non-empty
//!  └─ 7. Record      debit credits, write the journal entry
//! ```
//!
//! Every step can fail; [`ConversionEngine::convert_file`] folds the failure
//! into a [`ConversionResult`] instead of returning an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docshift::{ConversionEngine, ConversionRequest, ConverterRegistry, EngineConfig, InMemoryLedger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(ConverterRegistry::builtin()?);
//!     let ledger = Arc::new(InMemoryLedger::new().with_balance("local", 10));
//!     let engine = ConversionEngine::new(EngineConfig::default(), registry, ledger);
//!
//!     let result = engine
//!         .convert_file(ConversionRequest::new("menu.txt", "menu.html", "html"))
//!         .await;
//!     println!("{}: {}", result.success, result.message);
//!
//!     if result.success {
//!         let report = engine.undo_manager().undo(&result.conversion_id).await?;
//!         println!("refunded {} credits", report.refunded);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docshift` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docshift = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod converters;
pub mod error;
pub mod format;
pub mod journal;
pub mod ledger;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod request;
pub mod undo;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{EngineConfig, EngineConfigBuilder};
pub use convert::ConversionEngine;
pub use error::{ConvertError, DocShiftError, LedgerError, NormalizeError, RegistryError, UndoError};
pub use format::canonical_format;
pub use journal::{ConversionJournal, ConversionLogEntry};
pub use ledger::{CreditLedger, InMemoryLedger, JsonFileLedger};
pub use normalize::{EncodingNormalizer, NormalizationReport, RestoreOutcome, TextClass};
pub use output::{ConversionResult, EncodingTransform, FailureKind};
pub use progress::{Phase, ProgressEvent, ProgressHub, ProgressSink};
pub use registry::{ConverterDescriptor, ConverterFn, ConverterRegistry, ConverterReport, FormatPair};
pub use request::ConversionRequest;
pub use undo::{UndoManager, UndoReport};
