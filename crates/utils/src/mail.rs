//! Decoding of raw email bodies ahead of field extraction: quoted-
//! printable unescaping and HTML-to-text stripping. Both transforms are
//! pure and composable; only the email-sourced parser uses them.

use models::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("invalid tag regex"))
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid ws regex"))
}

/// Decodes quoted-printable text: soft line breaks (`=` before a line
/// terminator) are removed, `=XX` hex escapes become the encoded byte.
/// Escapes that are not two hex digits pass through untouched. Escaped
/// bytes may form multi-byte UTF-8 sequences (`=C2=A3` -> `£`).
pub fn decode_quoted_printable(raw: &str) -> String {
    let unfolded = raw.replace("=\r\n", "").replace("=\n", "");
    let bytes = unfolded.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Strips HTML down to plain text: tags removed, the four common named
/// entities decoded, whitespace runs collapsed to a single space.
/// An empty result means decoding destroyed the content and is an error.
pub fn strip_html(raw: &str) -> Result<String> {
    let text = tag_re().replace_all(raw, " ");
    // &amp; goes last: decoding it earlier would turn &amp;lt; into &lt;
    // and then into <, double-decoding the original text.
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    let text = ws_re().replace_all(&text, " ").trim().to_string();
    if text.is_empty() {
        Err(Error::UnrecognizedContent(
            "email body decoded to empty text".to_string(),
        ))
    } else {
        Ok(text)
    }
}
