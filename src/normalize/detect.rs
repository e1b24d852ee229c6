//! Encoding sniffing, strict decoding, mojibake repair, and text classification.
//!
//! Detection order matters: a byte-order mark is authoritative, strict UTF-8
//! validity beats any statistical guess, and the BOM-less UTF-16 check has to
//! run before `chardetng` because the latter only knows legacy single- and
//! multi-byte encodings.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse verdict on whether a file's bytes are text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextClass {
    /// Clean UTF-8 (or ASCII) text. No normalization needed.
    Valid,
    /// Not UTF-8, but decodes without error under a probed encoding.
    Salvageable,
    /// Binary, or not text under any probed encoding.
    Unsalvageable,
}

impl fmt::Display for TextClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextClass::Valid => "valid",
            TextClass::Salvageable => "salvageable",
            TextClass::Unsalvageable => "unsalvageable",
        })
    }
}

/// Detect the encoding of `bytes`. Never fails: valid UTF-8 (including empty
/// input) is UTF-8, and bytes the detector is unsure about are windows-1252.
pub fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }
    if let Some(encoding) = sniff_utf16(bytes) {
        return encoding;
    }
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let (guess, confident) = detector.guess_assess(None, true);
    // An unconfident guess on short input is close to arbitrary among the
    // legacy codecs; windows-1252 maps every byte.
    if !confident
        || guess
            .decode_without_bom_handling_and_without_replacement(bytes)
            .is_none()
    {
        return WINDOWS_1252;
    }
    guess
}

/// Lower-case label used in audit lines and result markers (`utf-8`,
/// `windows-1252`, `utf-16le`, …).
pub fn encoding_label(encoding: &'static Encoding) -> String {
    encoding.name().to_ascii_lowercase()
}

/// Decode without replacement characters. A BOM matching `encoding` is
/// stripped; `None` means the bytes are malformed for that encoding.
pub fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Option<String> {
    let body = strip_bom(bytes, encoding);
    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| text.into_owned())
}

/// Decode with U+FFFD replacement. Returns the text and whether anything was
/// replaced.
pub fn decode_lossy(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let body = strip_bom(bytes, encoding);
    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    (text.into_owned(), had_errors)
}

fn strip_bom<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> &'a [u8] {
    match Encoding::for_bom(bytes) {
        Some((bom_encoding, len)) if bom_encoding == encoding => &bytes[len..],
        _ => bytes,
    }
}

/// BOM-less UTF-16: ASCII-heavy UTF-16 text has NUL in every other byte.
fn sniff_utf16(bytes: &[u8]) -> Option<&'static Encoding> {
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return None;
    }
    let half = bytes.len() / 2;
    let even_zeros = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_zeros = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();

    // ≥ 40 % NUL on one parity, ≤ 10 % on the other.
    let dominant = |zeros: usize| zeros * 10 >= half * 4;
    let sparse = |zeros: usize| zeros * 10 <= half;

    if dominant(odd_zeros) && sparse(even_zeros) {
        Some(UTF_16LE)
    } else if dominant(even_zeros) && sparse(odd_zeros) {
        Some(UTF_16BE)
    } else {
        None
    }
}

// ── Mojibake ────────────────────────────────────────────────────────────────

/// A UTF-8 lead byte followed by continuation bytes, as they appear after
/// being mis-decoded through windows-1252 (`Ã©`, `Â `, `â€™`, …).
static RE_MOJIBAKE: Lazy<Regex> = Lazy::new(|| {
    let cont = r"[\x{80}-\x{BF}€‚ƒ„…†‡ˆ‰Š‹ŒŽ‘’“”•–—˜™š›œžŸ]";
    Regex::new(&format!(
        r"[\x{{C2}}-\x{{DF}}]{cont}|[\x{{E0}}-\x{{EF}}]{cont}{cont}"
    ))
    .unwrap()
});

/// Whether `text` carries the double-encoded UTF-8 signature.
pub fn looks_like_mojibake(text: &str) -> bool {
    RE_MOJIBAKE.is_match(text)
}

/// Undo one round of UTF-8-read-as-Latin-1 damage.
///
/// Re-encodes the text with the single-byte Latin-1 family codec and decodes
/// the result as strict UTF-8. Returns `None` when the pattern does not
/// match or either step would lose information.
pub fn repair_mojibake(text: &str) -> Option<String> {
    if !looks_like_mojibake(text) {
        return None;
    }
    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return None;
    }
    match String::from_utf8(bytes.into_owned()) {
        Ok(repaired) if repaired != text => Some(repaired),
        _ => None,
    }
}

// ── Classification ─────────────────────────────────────────────────────────

/// Classify raw bytes as valid, salvageable, or unsalvageable text.
pub fn classify_bytes(bytes: &[u8]) -> TextClass {
    if bytes.is_empty() {
        return TextClass::Valid;
    }

    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(body) {
        return if looks_like_text(text) {
            TextClass::Valid
        } else {
            TextClass::Unsalvageable
        };
    }

    let encoding = detect_encoding(bytes);
    match decode_strict(bytes, encoding) {
        Some(text) if looks_like_text(&text) => TextClass::Salvageable,
        _ => TextClass::Unsalvageable,
    }
}

/// No NUL, and control characters (other than common whitespace) stay
/// under 5 % of the decoded characters.
fn looks_like_text(text: &str) -> bool {
    let mut total = 0usize;
    let mut control = 0usize;
    for ch in text.chars() {
        total += 1;
        if ch == '\0' {
            return false;
        }
        if ch.is_control() && !matches!(ch, '\t' | '\n' | '\r' | '\u{0C}') {
            control += 1;
        }
    }
    control * 20 <= total
}
