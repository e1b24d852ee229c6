//! Input validation and upload staging.
//!
//! Uploaded bytes are written to a per-conversion directory so that the
//! `.bak` sibling created by normalization can never collide with another
//! request's backup.

use crate::error::ConvertError;
use crate::normalize::backup_path;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fallback when an upload's name has nothing usable left after sanitizing.
const DEFAULT_UPLOAD_NAME: &str = "upload";

/// Confirm `path` is an existing, readable regular file.
pub async fn validate_input(path: &Path, pair: &str) -> Result<(), ConvertError> {
    let not_found = || ConvertError::InputNotFound {
        pair: pair.to_string(),
        path: path.to_path_buf(),
    };

    let meta = tokio::fs::metadata(path).await.map_err(|_| not_found())?;
    if !meta.is_file() {
        return Err(not_found());
    }
    // Check read permission by attempting to open
    tokio::fs::File::open(path).await.map_err(|_| not_found())?;

    debug!("Resolved local input: {}", path.display());
    Ok(())
}

/// Reject an output path that resolves to the input itself or to the
/// input's `.bak` backup. Both would be removed before the converter runs.
pub async fn check_output_path(input: &Path, output: &Path, pair: &str) -> Result<(), ConvertError> {
    let input = resolve(input).await;
    let output = resolve(output).await;
    if output == input || output == backup_path(&input) {
        return Err(ConvertError::OutputConflict {
            pair: pair.to_string(),
            path: output,
        });
    }
    Ok(())
}

/// Canonical form of `path`. A path that does not exist yet is resolved
/// through its parent directory.
async fn resolve(path: &Path) -> PathBuf {
    if let Ok(p) = tokio::fs::canonicalize(path).await {
        return p;
    }
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match (tokio::fs::canonicalize(parent).await, path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Reduce a client-supplied file name to a single safe path component.
///
/// Directory parts are dropped and anything outside `[A-Za-z0-9._-]` becomes
/// `_`. The extension survives so the source format can still be inferred.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        DEFAULT_UPLOAD_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Write uploaded bytes to `<dir>/<sanitized name>` and return the path.
pub async fn stage_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(sanitize_file_name(file_name));
    tokio::fs::write(&path, bytes).await?;
    debug!("Staged {} bytes at {}", bytes.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_oddities() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\résumé.txt"), "r_sum_.txt");
        assert_eq!(sanitize_file_name("my report.MD"), "my_report.MD");
        assert_eq!(sanitize_file_name(".."), DEFAULT_UPLOAD_NAME);
        assert_eq!(sanitize_file_name(""), DEFAULT_UPLOAD_NAME);
    }

    #[tokio::test]
    async fn missing_and_directory_inputs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = validate_input(&dir.path().join("nope.txt"), "txt -> html").await;
        assert!(matches!(missing, Err(ConvertError::InputNotFound { .. })));

        let as_dir = validate_input(dir.path(), "txt -> html").await;
        assert!(matches!(as_dir, Err(ConvertError::InputNotFound { .. })));
    }

    #[tokio::test]
    async fn output_may_not_alias_input_or_backup() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, "hello").unwrap();

        let same = check_output_path(&input, &input, "md -> txt").await;
        assert!(matches!(same, Err(ConvertError::OutputConflict { .. })));

        let dotted = dir.path().join(".").join("notes.txt");
        let via_dot = check_output_path(&input, &dotted, "md -> txt").await;
        assert!(matches!(via_dot, Err(ConvertError::OutputConflict { .. })));

        let bak = dir.path().join("notes.txt.bak");
        let backup = check_output_path(&input, &bak, "txt -> md").await;
        assert!(matches!(backup, Err(ConvertError::OutputConflict { .. })));

        check_output_path(&input, &dir.path().join("notes.html"), "txt -> html")
            .await
            .unwrap();
        check_output_path(&input, &dir.path().join("new/notes.html"), "txt -> html")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn staged_upload_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = stage_upload(&dir.path().join("uploads/x"), "a b.csv", b"a,b\n1,2\n")
            .await
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "a_b.csv");
        validate_input(&path, "csv -> json").await.unwrap();
    }
}
