//! Parser for precious-metal dealing confirmation emails.
//!
//! One email body is one logical deal. The body arrives quoted-printable
//! encoded and usually as HTML; both transforms are applied before a set
//! of named-capture regexes extracts the deal, consideration, commission
//! and deal-time lines. The dataset is single-currency: any currency
//! token other than GBP on a monetary field is a hard failure.
//!
//! A missing commission line is also a hard failure rather than a zero
//! default. Historical treatments of this case differed; the strict
//! reading is kept because a silently-zero fee understates acquisition
//! cost downstream.

use chrono::{DateTime, NaiveDate};
use models::{Direction, Error, Result, Transaction};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};
use utils::mail::{decode_quoted_printable, strip_html};
use utils::{parse_date, parse_decimal};

pub const PARSER_NAME: &str = "bullionvault";

const BASE_CURRENCY: &str = "GBP";

const METAL_KEYWORDS: &[(&str, &str)] =
    &[("gold", "GOLD"), ("silver", "SILVER"), ("platinum", "PLATINUM")];

fn deal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?P<dir>buy|bought|sell|sold)\b\s+(?P<qty>[0-9][0-9,.]*)\s*kg\s*@\s*(?P<ccy>[A-Za-z]{3})\s*(?P<price>[0-9][0-9,.]*)",
        )
        .expect("invalid deal regex")
    })
}

fn consideration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:net\s+)?consideration:?\s*(?P<ccy>[A-Za-z]{3})\s*(?P<amt>[0-9][0-9,.]*)")
            .expect("invalid consideration regex")
    })
}

fn commission_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bcommission:?\s*(?P<ccy>[A-Za-z]{3})\s*(?P<amt>[0-9][0-9,.]*)")
            .expect("invalid commission regex")
    })
}

fn deal_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bdeal\s+time:?\s*(?P<when>.{0,60})").expect("invalid deal time regex")
    })
}

fn date_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?mi)^date:\s*(?P<when>.+)$").expect("invalid header regex"))
}

/// Parses one raw email message (headers plus body) into zero or one
/// canonical transactions. A message with no deal summary line is
/// `UnrecognizedContent`; a deal for zero kilograms is skipped.
pub fn parse_bullionvault_email(raw: &str) -> Result<Vec<Transaction>> {
    let text = strip_html(&decode_quoted_printable(raw))?;

    let caps = deal_re().captures(&text).ok_or_else(|| {
        Error::UnrecognizedContent("no deal summary line in email body".to_string())
    })?;

    let direction = match caps["dir"].to_lowercase().as_str() {
        "buy" | "bought" => Direction::Buy,
        _ => Direction::Sell,
    };
    require_base_currency(&caps["ccy"])?;
    let quantity = parse_decimal("quantity", &caps["qty"])?;
    if quantity == 0.0 {
        debug!("skipping zero-quantity deal");
        return Ok(Vec::new());
    }
    let price = parse_decimal("price per kg", &caps["price"])?;

    let commission = extract_commission(&text)?;
    check_consideration(&text, quantity, price, commission)?;

    let tx = Transaction::trade(
        direction,
        resolve_date(&text, raw)?,
        detect_metal(&text)?,
        quantity,
        price,
        commission,
    )?;
    Ok(vec![tx])
}

fn require_base_currency(token: &str) -> Result<()> {
    if token.eq_ignore_ascii_case(BASE_CURRENCY) {
        Ok(())
    } else {
        Err(Error::UnsupportedCurrency {
            token: token.to_uppercase(),
            expected: BASE_CURRENCY,
        })
    }
}

fn extract_commission(text: &str) -> Result<f64> {
    let caps = commission_re().captures(text).ok_or_else(|| {
        Error::UnrecognizedContent("no commission line in email body".to_string())
    })?;
    require_base_currency(&caps["ccy"])?;
    parse_decimal("commission", &caps["amt"])
}

/// The consideration line is a cross-check, not a source field: when
/// present its currency must still be GBP, and a figure far from
/// quantity x price is flagged but does not fail the deal (gross and
/// net figures legitimately differ by the commission).
fn check_consideration(text: &str, quantity: f64, price: f64, commission: f64) -> Result<()> {
    if let Some(caps) = consideration_re().captures(text) {
        require_base_currency(&caps["ccy"])?;
        let stated = parse_decimal("consideration", &caps["amt"])?;
        let expected = quantity * price;
        let tolerance = commission + expected * 0.01;
        if (stated - expected).abs() > tolerance {
            warn!(stated, expected, "consideration does not match quantity x price");
        }
    }
    Ok(())
}

/// Keyword match against the `Security:` line when one exists, else the
/// whole decoded body. No recognized metal is a hard failure.
fn detect_metal(text: &str) -> Result<String> {
    let lower = text.to_lowercase();
    let scope: String = match lower.find("security") {
        Some(pos) => lower[pos..].chars().take(80).collect(),
        None => lower.clone(),
    };
    METAL_KEYWORDS
        .iter()
        .find(|(keyword, _)| scope.contains(*keyword))
        .map(|(_, tag)| tag.to_string())
        .ok_or_else(|| {
            Error::MissingAssetIdentifier(
                "no recognized security keyword (gold/silver/platinum)".to_string(),
            )
        })
}

/// Prefers the in-body deal time; falls back to the transport-level
/// `Date:` header of the raw message. Neither parsing is an error for
/// the other: only when both fail does the deal fail.
fn resolve_date(text: &str, raw: &str) -> Result<NaiveDate> {
    if let Some(caps) = deal_time_re().captures(text) {
        if let Ok(date) = parse_date(&caps["when"]) {
            return Ok(date);
        }
    }
    if let Some(caps) = date_header_re().captures(raw) {
        let when = caps["when"].trim();
        if let Ok(dt) = DateTime::parse_from_rfc2822(when) {
            return Ok(dt.date_naive());
        }
        if let Ok(date) = parse_date(when) {
            return Ok(date);
        }
    }
    Err(Error::UnparsableDate(
        "no parsable deal time line or message date header".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEAL_EMAIL: &str = "Date: Fri, 15 Oct 2021 10:00:02 +0000\n\
Subject: Deal confirmation\n\
\n\
<html><body>\n\
<p>Security: Gold bullion (great delivery)</p>\n\
<p>Summary: Buy 1.000kg @ GBP 45,0=\n\
00.00/kg</p>\n\
<p>Net consideration: GBP 45,010.00</p>\n\
<p>Commission: GBP 10.00</p>\n\
<p>Deal time: October 15, 2021 at 10:00am GMT</p>\n\
</body></html>\n";

    #[test]
    fn test_full_deal_email() {
        let txs = parse_bullionvault_email(DEAL_EMAIL).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].to_line(), "BUY 15/10/2021 GOLD 1 45000 10");
    }

    #[test]
    fn test_sell_wording() {
        let raw = "Security: silver\nSummary: Sold 2.5kg @ GBP 500.00/kg\n\
                   Commission: GBP 5.00\nDeal time: 11 October, 2024 at 3:00pm GMT\n";
        let txs = parse_bullionvault_email(raw).unwrap();
        assert_eq!(txs[0].to_line(), "SELL 11/10/2024 SILVER 2.5 500 5");
    }

    #[test]
    fn test_foreign_currency_is_hard_failure() {
        let raw = DEAL_EMAIL.replace("GBP 45,0=\n00.00", "USD 45,000.00");
        let err = parse_bullionvault_email(&raw).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCurrency { .. }));
    }

    #[test]
    fn test_foreign_commission_currency_is_hard_failure() {
        let raw = DEAL_EMAIL.replace("Commission: GBP", "Commission: EUR");
        let err = parse_bullionvault_email(&raw).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCurrency { .. }));
    }

    #[test]
    fn test_missing_commission_is_hard_failure() {
        let raw = DEAL_EMAIL.replace("<p>Commission: GBP 10.00</p>\n", "");
        let err = parse_bullionvault_email(&raw).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedContent(_)));
    }

    #[test]
    fn test_missing_deal_time_falls_back_to_date_header() {
        let raw = DEAL_EMAIL.replace("<p>Deal time: October 15, 2021 at 10:00am GMT</p>\n", "");
        let txs = parse_bullionvault_email(&raw).unwrap();
        assert_eq!(txs[0].to_line(), "BUY 15/10/2021 GOLD 1 45000 10");
    }

    #[test]
    fn test_no_date_at_all_fails() {
        let raw = "Security: gold\nSummary: Buy 1.000kg @ GBP 45000.00/kg\n\
                   Commission: GBP 10.00\n";
        let err = parse_bullionvault_email(raw).unwrap_err();
        assert!(matches!(err, Error::UnparsableDate(_)));
    }

    #[test]
    fn test_unrecognized_metal_fails() {
        let raw = DEAL_EMAIL.replace("Gold bullion (great delivery)", "Copper cathode");
        let err = parse_bullionvault_email(&raw).unwrap_err();
        assert!(matches!(err, Error::MissingAssetIdentifier(_)));
    }

    #[test]
    fn test_non_deal_email_is_unrecognized() {
        let raw = "Date: Fri, 15 Oct 2021 10:00:02 +0000\n\nYour statement is ready to view.\n";
        let err = parse_bullionvault_email(raw).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedContent(_)));
    }

    #[test]
    fn test_zero_quantity_deal_is_skipped() {
        let raw = DEAL_EMAIL.replace("Buy 1.000kg", "Buy 0.000kg");
        assert!(parse_bullionvault_email(&raw).unwrap().is_empty());
    }
}
