//! Pipeline stages for a single conversion.
//!
//! Each submodule implements exactly one step of
//! [`crate::convert::ConversionEngine::convert_file`] and returns a
//! [`crate::error::ConvertError`] on failure, so the engine can fold every
//! outcome into one result type.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ preprocess ──▶ invoke ──▶ postprocess
//! (exists?)  (classify,     (blocking   (non-empty
//!             normalize)     worker)     output?)
//! ```
//!
//! 1. [`input`]: validate the source path, refuse an output that would
//!    overwrite it or its backup; stage uploaded bytes
//! 2. [`preprocess`]: classify text-like sources and re-encode salvageable
//!    ones to UTF-8, keeping a `.bak` backup
//! 3. [`invoke`]: run the converter on tokio's blocking pool; a panic
//!    becomes a failure instead of unwinding into the caller
//! 4. [`postprocess`]: confirm the converter left a non-empty output file

pub mod input;
pub mod invoke;
pub mod postprocess;
pub mod preprocess;
