//! Normalization of escaped numeric character references
//!
//! Encoders frequently hand back text such as `\u4E2D\u6587` or `&#x4E2D;`.
//! Before a document is written to disk those references are turned back into
//! literal characters so the file stays human-editable.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\\u([dD][89abAB][0-9a-fA-F]{2})\\u([dD][c-fC-F][0-9a-fA-F]{2})|\\u([0-9a-fA-F]{4})|&#[xX]([0-9a-fA-F]{1,6});|&#([0-9]{1,7});",
    )
    .expect("escape regex is valid")
});

/// Replace `\uXXXX` (including surrogate pairs), `&#xH;` and `&#D;` with literal characters.
///
/// References that decode to control characters, quotes or backslashes are
/// kept verbatim, as are invalid code points.
pub fn unescape_numeric_references(text: &str) -> Cow<'_, str> {
    if !text.contains("\\u") && !text.contains("&#") {
        return Cow::Borrowed(text);
    }

    ESCAPE_RE.replace_all(text, |caps: &Captures<'_>| {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        decode_capture(caps)
            .filter(|c| is_printable(*c))
            .map(String::from)
            .unwrap_or_else(|| whole.to_string())
    })
}

fn decode_capture(caps: &Captures<'_>) -> Option<char> {
    if let (Some(high), Some(low)) = (caps.get(1), caps.get(2)) {
        let high = u32::from_str_radix(high.as_str(), 16).ok()?;
        let low = u32::from_str_radix(low.as_str(), 16).ok()?;
        let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
        return char::from_u32(code);
    }
    if let Some(hex) = caps.get(3).or_else(|| caps.get(4)) {
        return char::from_u32(u32::from_str_radix(hex.as_str(), 16).ok()?);
    }
    if let Some(dec) = caps.get(5) {
        return char::from_u32(dec.as_str().parse().ok()?);
    }
    None
}

fn is_printable(c: char) -> bool {
    !c.is_control() && c != '"' && c != '\\'
}
