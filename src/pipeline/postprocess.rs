//! Output verification.
//!
//! A converter that reports success must leave a non-empty regular file at
//! the requested output path. Anything else is an
//! [`ConvertError::EmptyOutput`] failure and is never charged.

use crate::error::ConvertError;
use std::path::Path;
use tracing::debug;

/// Return the output size in bytes, or `EmptyOutput`.
pub async fn verify_output(path: &Path, pair: &str) -> Result<u64, ConvertError> {
    let empty = || ConvertError::EmptyOutput {
        pair: pair.to_string(),
        path: path.to_path_buf(),
    };
    let meta = tokio::fs::metadata(path).await.map_err(|_| empty())?;
    if !meta.is_file() || meta.len() == 0 {
        return Err(empty());
    }
    debug!("Verified output {} ({} bytes)", path.display(), meta.len());
    Ok(meta.len())
}
