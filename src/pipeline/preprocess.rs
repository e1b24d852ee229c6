//! Text classification and encoding normalization ahead of conversion.

use crate::error::{ConvertError, NormalizeError};
use crate::format::is_text_format;
use crate::normalize::{EncodingNormalizer, NormalizationReport, TextClass};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Classify a text-like source and normalize it when it is salvageable.
///
/// Returns the normalization report when the file was rewritten. Binary
/// formats pass through untouched. Runs on the blocking pool because the
/// normalizer does synchronous file I/O.
pub async fn prepare_source(
    normalizer: &EncodingNormalizer,
    path: &Path,
    source_format: &str,
    pair: &str,
) -> Result<Option<NormalizationReport>, ConvertError> {
    if !is_text_format(source_format) {
        return Ok(None);
    }

    let normalizer = normalizer.clone();
    let owned: PathBuf = path.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || normalize_if_needed(&normalizer, &owned))
        .await
        .map_err(|e| ConvertError::NormalizationIo {
            pair: pair.to_string(),
            source: NormalizeError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            },
        })?;

    match outcome {
        Ok(Prepared::Clean) => {
            debug!("{} is clean UTF-8", path.display());
            Ok(None)
        }
        Ok(Prepared::Normalized(report)) => {
            info!(
                "Normalized {} before {}: {} -> {}",
                path.display(),
                pair,
                report.from,
                report.to
            );
            Ok(Some(report))
        }
        Ok(Prepared::Unsalvageable) => Err(ConvertError::UnsalvageableInput {
            pair: pair.to_string(),
            path: path.to_path_buf(),
        }),
        Err(source) => Err(ConvertError::NormalizationIo {
            pair: pair.to_string(),
            source,
        }),
    }
}

enum Prepared {
    Clean,
    Normalized(NormalizationReport),
    Unsalvageable,
}

fn normalize_if_needed(
    normalizer: &EncodingNormalizer,
    path: &Path,
) -> Result<Prepared, NormalizeError> {
    match normalizer.classify_file(path)? {
        TextClass::Valid => Ok(Prepared::Clean),
        TextClass::Unsalvageable => Ok(Prepared::Unsalvageable),
        TextClass::Salvageable => normalizer
            .normalize_to_utf8(path, None)
            .map(Prepared::Normalized),
    }
}
