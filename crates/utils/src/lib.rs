pub mod mail;

use chrono::{NaiveDate, NaiveDateTime};
use models::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Fund families whose name prefix is stripped when deriving an asset
/// slug from a free-text investment name. Callers with other platforms
/// can pass their own list to [`derive_asset_name_from`].
pub const FUND_FAMILIES: &[&str] = &[
    "Vanguard",
    "iShares",
    "Baillie Gifford",
    "Fidelity",
    "Legal & General",
    "HSBC",
];

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%Y-%m-%d", "%d %b %Y", "%d %B %Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"];

fn day_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+([A-Za-z]{3,9})\.?,?\s+(\d{4})\b")
            .expect("invalid day-first date regex")
    })
}

fn month_first_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b([A-Za-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b")
            .expect("invalid month-first date regex")
    })
}

/// Parses a monetary or quantity field, tolerating currency symbols and
/// thousands separators (`£1,234.56` -> 1234.56). Non-finite results are
/// rejected: a `NaN` that survives parsing would poison every comparison
/// downstream.
pub fn parse_decimal(field: &'static str, raw: &str) -> Result<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | '€' | ',') && !c.is_whitespace())
        .collect();
    let invalid = || Error::InvalidNumber { field, value: raw.trim().to_string() };
    let value: f64 = cleaned.parse().map_err(|_| invalid())?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid())
    }
}

/// Normalizes a broker date string to a calendar date.
///
/// Tries the known slash/ISO/abbreviated formats first, then falls back
/// to extracting an explicit day + month-name + year (in either order)
/// from free text such as "11 October, 2024 at 3:00pm GMT". Anything
/// else is `UnparsableDate`; a date is never fabricated.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    extract_prose_date(s).ok_or_else(|| Error::UnparsableDate(s.to_string()))
}

fn extract_prose_date(s: &str) -> Option<NaiveDate> {
    for caps in day_first_re().captures_iter(s) {
        let day: u32 = caps[1].parse().ok()?;
        if let Some(month) = month_number(&caps[2]) {
            let year: i32 = caps[3].parse().ok()?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }
    for caps in month_first_re().captures_iter(s) {
        if let Some(month) = month_number(&caps[1]) {
            let day: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
    }
    None
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let lower = name.to_lowercase();
    MONTHS
        .iter()
        .position(|m| lower.starts_with(m))
        .map(|i| i as u32 + 1)
}

/// Derives an asset slug from a free-text fund name, for sources that
/// carry no ticker/ISIN/SEDOL column.
///
/// Best-effort heuristic, not a registry lookup: a recognized
/// fund-family prefix is stripped and the remainder up to the first
/// comma becomes the slug ("Vanguard FTSE Global All Cap" ->
/// "FTSE_Global_All_Cap"); otherwise the first three words survive with
/// non-alphanumerics removed.
pub fn derive_asset_name(name: &str) -> Result<String> {
    derive_asset_name_from(FUND_FAMILIES, name)
}

pub fn derive_asset_name_from(families: &[&str], name: &str) -> Result<String> {
    let trimmed = name.trim();
    for family in families {
        if let Some(rest) = strip_prefix_ignore_case(trimmed, family) {
            let head = rest.split(',').next().unwrap_or("");
            let slug = head.split_whitespace().collect::<Vec<_>>().join("_");
            if !slug.is_empty() {
                return Ok(slug);
            }
        }
    }
    let fallback = trimmed
        .split_whitespace()
        .take(3)
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if fallback.is_empty() {
        Err(Error::MissingAssetIdentifier(format!(
            "cannot derive an identifier from '{trimmed}'"
        )))
    } else {
        Ok(fallback)
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
