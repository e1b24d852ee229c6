//! Configuration for the conversion engine.
//!
//! All engine behaviour is controlled through [`EngineConfig`], built via its
//! [`EngineConfigBuilder`]. Paths default to locations under `work_dir`, so
//! pointing `work_dir` somewhere else relocates the whole state tree.

use crate::error::DocShiftError;
use crate::progress::ProgressSink;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default state directory, relative to the process working directory.
pub const DEFAULT_WORK_DIR: &str = ".docshift";

/// Configuration for a [`crate::convert::ConversionEngine`].
///
/// # Example
/// ```rust
/// use docshift::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .work_dir("/var/lib/docshift")
///     .credit_cost(2)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.journal_dir(), std::path::Path::new("/var/lib/docshift/journal"));
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Root of the engine's state: uploads, outputs, journal, audit log.
    /// Default: `.docshift`.
    pub work_dir: PathBuf,

    /// Where conversion journal entries live. Default: `<work_dir>/journal`.
    pub journal_dir: Option<PathBuf>,

    /// Encoding audit log (JSON Lines). Default: `<work_dir>/normalization.log`.
    pub audit_log: Option<PathBuf>,

    /// Credits debited per successful conversion. Default: 1.
    ///
    /// Zero is allowed and makes every conversion free; the ledger is then
    /// never consulted.
    pub credit_cost: u64,

    /// Prefix normalized text with a UTF-8 BOM. Default: false.
    pub write_bom: bool,

    /// Maximum simultaneous conversions in [`crate::convert::ConversionEngine::convert_batch`].
    /// Default: 4.
    pub concurrency: usize,

    /// Optional progress sink. `None` disables events entirely.
    pub progress_sink: Option<Arc<dyn ProgressSink>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            journal_dir: None,
            audit_log: None,
            credit_cost: 1,
            write_bom: false,
            concurrency: 4,
            progress_sink: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("work_dir", &self.work_dir)
            .field("journal_dir", &self.journal_dir())
            .field("audit_log", &self.audit_log())
            .field("credit_cost", &self.credit_cost)
            .field("write_bom", &self.write_bom)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_sink",
                &self.progress_sink.as_ref().map(|_| "<dyn ProgressSink>"),
            )
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.journal_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.join("journal"))
    }

    pub fn audit_log(&self) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| self.work_dir.join("normalization.log"))
    }

    /// Staging directory for one uploaded file.
    pub fn upload_dir(&self, conversion_id: &str) -> PathBuf {
        self.work_dir.join("uploads").join(conversion_id)
    }

    /// Output directory for one uploaded file's result.
    pub fn output_dir(&self, conversion_id: &str) -> PathBuf {
        self.work_dir.join("outputs").join(conversion_id)
    }
}

/// Builder for [`EngineConfig`].
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl fmt::Debug for EngineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EngineConfigBuilder").field(&self.config).finish()
    }
}

impl EngineConfigBuilder {
    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.work_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn journal_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.journal_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn audit_log(mut self, path: impl AsRef<Path>) -> Self {
        self.config.audit_log = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn credit_cost(mut self, cost: u64) -> Self {
        self.config.credit_cost = cost;
        self
    }

    pub fn write_bom(mut self, v: bool) -> Self {
        self.config.write_bom = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.config.progress_sink = Some(sink);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, DocShiftError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(DocShiftError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.work_dir.as_os_str().is_empty() {
            return Err(DocShiftError::InvalidConfig(
                "Work directory must not be empty".into(),
            ));
        }
        if let Some(ref log) = c.audit_log {
            if log.file_name().is_none() {
                return Err(DocShiftError::InvalidConfig(format!(
                    "Audit log path '{}' does not name a file",
                    log.display()
                )));
            }
        }
        Ok(self.config)
    }
}
