//! Format tokens: alias canonicalization and text-vs-binary classification.
//!
//! Every format token that enters the registry or the engine passes through
//! [`canonical_format`] first, so `("jpeg", "png")` and `("JPG", "png")`
//! resolve to the same converter.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;

/// Alias → canonical token. Canonical tokens map to themselves implicitly.
static ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("jpeg", "jpg"),
        ("jpe", "jpg"),
        ("jfif", "jpg"),
        ("markdown", "md"),
        ("mkd", "md"),
        ("mdown", "md"),
        ("htm", "html"),
        ("xhtml", "html"),
        ("text", "txt"),
        ("plain", "txt"),
        ("tif", "tiff"),
        ("yml", "yaml"),
        ("dib", "bmp"),
    ])
});

/// Formats whose payload is character data and therefore subject to
/// encoding normalization before conversion.
const TEXT_FORMATS: &[&str] = &["txt", "md", "html", "csv", "tsv", "json", "xml", "yaml"];

/// Canonicalize a user-supplied format token.
///
/// Trims whitespace, drops a leading `.`, lower-cases, then applies the
/// alias table. Unknown tokens are returned lower-cased so that the registry
/// can report them verbatim in an "unsupported pair" error.
pub fn canonical_format(token: &str) -> String {
    let t = token.trim().trim_start_matches('.').to_ascii_lowercase();
    match ALIASES.get(t.as_str()) {
        Some(canonical) => (*canonical).to_string(),
        None => t,
    }
}

/// Whether the (canonical or alias) token names a text-like format.
pub fn is_text_format(token: &str) -> bool {
    let canonical = canonical_format(token);
    TEXT_FORMATS.contains(&canonical.as_str())
}

/// Infer a canonical format from a path's extension.
pub fn format_from_path(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(canonical_format)
}

/// Human-readable `src -> tgt` label used in logs and error messages.
pub fn pair_label(source: &str, target: &str) -> String {
    format!("{source} -> {target}")
}
