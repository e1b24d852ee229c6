//! Converter execution on tokio's blocking pool.
//!
//! Converters are synchronous library calls (image codecs, file I/O), so they
//! run under `spawn_blocking`. A panic inside the converter surfaces as a
//! `JoinError`; it is turned into [`ConvertError::ConverterFailure`] carrying
//! the panic message.

use crate::error::ConvertError;
use crate::registry::ConverterFn;
use std::any::Any;
use std::path::Path;
use tracing::{debug, warn};

/// Run `converter(input, output)` and return its success message.
pub async fn run_converter(
    converter: ConverterFn,
    input: &Path,
    output: &Path,
    pair: &str,
) -> Result<String, ConvertError> {
    let failure = |message: String| ConvertError::ConverterFailure {
        pair: pair.to_string(),
        message,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| failure(format!("cannot create output directory '{}': {e}", parent.display())))?;
    }
    // A stale file would mask a converter that silently writes nothing.
    match tokio::fs::remove_file(output).await {
        Ok(()) => debug!("Removed stale output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(failure(format!("cannot replace '{}': {e}", output.display()))),
    }

    let (input_owned, output_owned) = (input.to_path_buf(), output.to_path_buf());
    let joined = tokio::task::spawn_blocking(move || converter(&input_owned, &output_owned)).await;

    match joined {
        Ok(report) if report.success => {
            debug!("{}: {}", pair, report.message);
            Ok(report.message)
        }
        Ok(report) => Err(failure(report.message)),
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            warn!("Converter for {} panicked: {}", pair, message);
            Err(failure(format!("converter panicked: {message}")))
        }
        Err(e) => Err(failure(format!("converter task did not complete: {e}"))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
