//! The conversion engine.
//!
//! [`ConversionEngine::convert_file`] is the single entry point every caller
//! goes through. It never returns `Err` and never unwinds: each failure is
//! folded into a [`ConversionResult`] with `success = false`, a
//! [`crate::output::FailureKind`] classification, and a message naming the
//! conversion pair and the cause.
//!
//! Bookkeeping is all-or-nothing. Credits are debited and the journal entry
//! written only after the converter has produced a non-empty output; if the
//! attempt fails after the source was re-encoded, the re-encoding is rolled
//! back so the input is left as it was found.

use crate::config::EngineConfig;
use crate::error::{ConvertError, DocShiftError, LedgerError};
use crate::format::{canonical_format, pair_label};
use crate::journal::{ConversionJournal, ConversionLogEntry};
use crate::ledger::CreditLedger;
use crate::normalize::{EncodingNormalizer, NormalizationReport};
use crate::output::{ConversionResult, EncodingTransform};
use crate::pipeline::{input, invoke, postprocess, preprocess};
use crate::progress::{Phase, ProgressEmitter};
use crate::registry::{ConverterFn, ConverterRegistry, FormatPair};
use crate::request::ConversionRequest;
use crate::undo::UndoManager;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Orchestrates registry lookup, normalization, conversion, and bookkeeping.
///
/// Cheap to share: wrap in an `Arc` and call from as many tasks as needed.
/// Requests for unrelated inputs run fully in parallel; callers must not
/// submit two concurrent requests for the same input path, since both would
/// race on `<input>.bak`.
///
/// # Example
/// ```rust,no_run
/// use docshift::{ConversionEngine, ConversionRequest, ConverterRegistry, EngineConfig, InMemoryLedger};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = ConversionEngine::new(
///     EngineConfig::default(),
///     Arc::new(ConverterRegistry::builtin()?),
///     Arc::new(InMemoryLedger::new().with_balance("local", 10)),
/// );
/// let result = engine
///     .convert_file(ConversionRequest::new("notes.txt", "notes.html", "html"))
///     .await;
/// println!("{} {}", result.success, result.message);
/// # Ok(())
/// # }
/// ```
pub struct ConversionEngine {
    config: EngineConfig,
    registry: Arc<ConverterRegistry>,
    ledger: Arc<dyn CreditLedger>,
    normalizer: EncodingNormalizer,
    journal: ConversionJournal,
    progress: ProgressEmitter,
    undo: UndoManager,
}

impl fmt::Debug for ConversionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("ledger", &"<dyn CreditLedger>")
            .finish()
    }
}

/// What a successful attempt produced, before it becomes a result.
struct Converted {
    message: String,
    output_path: PathBuf,
    normalization: Option<EncodingTransform>,
    credits: u64,
}

impl ConversionEngine {
    pub fn new(
        config: EngineConfig,
        registry: Arc<ConverterRegistry>,
        ledger: Arc<dyn CreditLedger>,
    ) -> Self {
        let normalizer = EncodingNormalizer::new(config.audit_log()).with_bom(config.write_bom);
        let journal = ConversionJournal::new(config.journal_dir());
        let progress = ProgressEmitter::new(config.progress_sink.clone());
        let undo = UndoManager::new(journal.clone(), Arc::clone(&ledger));
        Self {
            config,
            registry,
            ledger,
            normalizer,
            journal,
            progress,
            undo,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    pub fn normalizer(&self) -> &EncodingNormalizer {
        &self.normalizer
    }

    pub fn journal(&self) -> &ConversionJournal {
        &self.journal
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    /// Every registered pair, sorted.
    pub fn supported_pairs(&self) -> Vec<FormatPair> {
        self.registry.pairs()
    }

    /// Convert one file. Never fails: inspect `success` on the result.
    pub async fn convert_file(&self, request: ConversionRequest) -> ConversionResult {
        let start = Instant::now();
        let id = request.conversion_id.clone();
        info!(
            "Starting conversion {}: {} -> {}",
            id,
            request.input_path.display(),
            request.output_path.display()
        );

        match self.run(&request).await {
            Ok(done) => {
                info!(
                    "Conversion {} complete in {}ms: {}",
                    id,
                    start.elapsed().as_millis(),
                    done.message
                );
                ConversionResult::succeeded(
                    id,
                    done.message,
                    done.output_path,
                    done.normalization,
                    done.credits,
                )
            }
            Err(e) => {
                warn!("Conversion {} failed: {}", id, e);
                ConversionResult::failed(id, e.kind(), e.to_string())
            }
        }
    }

    /// Synchronous wrapper around [`ConversionEngine::convert_file`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn convert_file_sync(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionResult, DocShiftError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| DocShiftError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
        Ok(runtime.block_on(self.convert_file(request)))
    }

    /// Convert uploaded bytes.
    ///
    /// The bytes are staged as `<work_dir>/uploads/<id>/<file_name>` and the
    /// result is written to `<work_dir>/outputs/<id>/<stem>.<target>`. The
    /// source format is inferred from `file_name`'s extension. Staged files
    /// are kept so the conversion can be undone later.
    pub async fn convert_upload(
        &self,
        bytes: &[u8],
        file_name: &str,
        target_format: &str,
        user: &str,
    ) -> ConversionResult {
        let id = Uuid::new_v4().to_string();
        let input_path =
            match input::stage_upload(&self.config.upload_dir(&id), file_name, bytes).await {
                Ok(p) => p,
                Err(e) => {
                    let pair = pair_label("upload", &canonical_format(target_format));
                    warn!("Could not stage upload {}: {}", file_name, e);
                    let err = ConvertError::InputNotFound {
                        pair,
                        path: self.config.upload_dir(&id),
                    };
                    return ConversionResult::failed(id, err.kind(), err.to_string());
                }
            };

        let target = canonical_format(target_format);
        let stem = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let output_path = self
            .config
            .output_dir(&id)
            .join(format!("{stem}.{target}"));

        let request = ConversionRequest::new(&input_path, &output_path, target)
            .with_id(id)
            .with_user(user);
        self.convert_file(request).await
    }

    /// Convert many unrelated files, at most `config.concurrency` at a time.
    ///
    /// Results come back in completion order; match them to requests by
    /// `conversion_id`.
    pub async fn convert_batch(&self, requests: Vec<ConversionRequest>) -> Vec<ConversionResult> {
        debug!("Batch of {} conversions", requests.len());
        stream::iter(requests.into_iter().map(|req| self.convert_file(req)))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await
    }

    // ── Internal steps ───────────────────────────────────────────────────

    async fn run(&self, request: &ConversionRequest) -> Result<Converted, ConvertError> {
        let id = request.conversion_id.as_str();

        // ── Step 1: Preprocess ───────────────────────────────────────────
        let phase = self.progress.start(id, Phase::Preprocess);

        let source = request.source_format();
        let target = request.target_format();
        let pair = pair_label(&source, &target);

        let converter = self.registry.get(&source, &target).ok_or_else(|| {
            ConvertError::UnsupportedPair {
                source_format: source.clone(),
                target_format: target.clone(),
            }
        })?;

        input::validate_input(&request.input_path, &pair).await?;
        input::check_output_path(&request.input_path, &request.output_path, &pair).await?;
        self.check_credits(&request.user, &pair)?;

        let normalized =
            preprocess::prepare_source(&self.normalizer, &request.input_path, &source, &pair)
                .await?;
        phase.complete();

        // Anything failing from here on must leave the input as found.
        let outcome = self
            .convert_and_record(request, &source, &target, &pair, converter, normalized.as_ref())
            .await;

        if outcome.is_err() {
            if let Some(report) = normalized.as_ref() {
                self.roll_back_normalization(&report.path);
            }
        }
        outcome
    }

    async fn convert_and_record(
        &self,
        request: &ConversionRequest,
        source: &str,
        target: &str,
        pair: &str,
        converter: ConverterFn,
        normalized: Option<&NormalizationReport>,
    ) -> Result<Converted, ConvertError> {
        let id = request.conversion_id.as_str();

        // ── Step 2: Convert ──────────────────────────────────────────────
        let phase = self.progress.start(id, Phase::Convert);
        let converter_message =
            invoke::run_converter(converter, &request.input_path, &request.output_path, pair)
                .await?;
        phase.complete();

        // ── Step 3: Postprocess ──────────────────────────────────────────
        let phase = self.progress.start(id, Phase::Postprocess);
        let bytes = postprocess::verify_output(&request.output_path, pair).await?;
        debug!("{} wrote {} bytes", pair, bytes);

        let credits = self.config.credit_cost;
        self.debit(&request.user, credits, pair)?;

        let entry = ConversionLogEntry {
            conversion_id: id.to_string(),
            user: request.user.clone(),
            source_path: request.input_path.clone(),
            output_path: request.output_path.clone(),
            backup_path: normalized.map(|r| r.backup_path.clone()),
            source_format: source.to_string(),
            target_format: target.to_string(),
            credits,
            created_at: Utc::now(),
            undone_at: None,
        };
        if let Err(e) = self.journal.record(&entry).await {
            self.refund_after_failed_record(&request.user, credits);
            return Err(ConvertError::Bookkeeping {
                pair: pair.to_string(),
                detail: format!("journal write failed: {e}"),
            });
        }
        phase.complete();

        let normalization = normalized.map(NormalizationReport::transform);
        let message = match normalization.as_ref() {
            Some(t) => format!("{}; {}", t.marker(), converter_message),
            None => converter_message,
        };

        Ok(Converted {
            message,
            output_path: request.output_path.clone(),
            normalization,
            credits,
        })
    }

    fn check_credits(&self, user: &str, pair: &str) -> Result<(), ConvertError> {
        let required = self.config.credit_cost;
        if required == 0 {
            return Ok(());
        }
        let available = self
            .ledger
            .balance(user)
            .map_err(|e| ledger_failure(e, pair))?;
        if available < required {
            return Err(ConvertError::InsufficientCredits {
                pair: pair.to_string(),
                user: user.to_string(),
                required,
                available,
            });
        }
        Ok(())
    }

    fn debit(&self, user: &str, amount: u64, pair: &str) -> Result<(), ConvertError> {
        if amount == 0 {
            return Ok(());
        }
        let remaining = self
            .ledger
            .debit(user, amount)
            .map_err(|e| ledger_failure(e, pair))?;
        debug!("Charged '{}' {} credits, {} left", user, amount, remaining);
        Ok(())
    }

    fn refund_after_failed_record(&self, user: &str, amount: u64) {
        if amount == 0 {
            return;
        }
        if let Err(e) = self.ledger.refund(user, amount) {
            warn!(
                "Could not refund {} credits to '{}' after journal failure: {}",
                amount, user, e
            );
        }
    }

    fn roll_back_normalization(&self, path: &Path) {
        let outcome = self.normalizer.undo_normalization(path);
        if outcome.is_restored() {
            debug!("Rolled back normalization of {}", path.display());
        } else {
            warn!(
                "Could not roll back normalization of {}: {:?}",
                path.display(),
                outcome
            );
        }
    }
}

fn ledger_failure(e: LedgerError, pair: &str) -> ConvertError {
    match e {
        LedgerError::InsufficientCredits {
            user,
            required,
            available,
        } => ConvertError::InsufficientCredits {
            pair: pair.to_string(),
            user,
            required,
            available,
        },
        LedgerError::Storage(detail) => ConvertError::Bookkeeping {
            pair: pair.to_string(),
            detail,
        },
    }
}
