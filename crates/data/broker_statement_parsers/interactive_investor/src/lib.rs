use csv::ReaderBuilder;
use models::{Direction, Error, Result, Transaction};
use serde::Deserialize;
use tracing::debug;
use utils::{parse_date, parse_decimal};

pub const PARSER_NAME: &str = "interactive_investor";

/// Descriptions matching any of these are cash movements, not trades.
const CASH_KEYWORDS: &[&str] = &[
    "TRANSFER",
    "SUBSCRIPTION",
    "WITHDRAWAL",
    "INTEREST",
    "FEE",
    "CASH",
];

#[derive(Debug, Deserialize)]
struct InteractiveInvestorRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "Sedol")]
    sedol: String,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Quantity")]
    quantity: String,
    #[serde(rename = "Price")]
    price: String,
    #[serde(rename = "Commission")]
    commission: String,
    #[serde(rename = "Charges")]
    charges: String,
}

/// Parses the trading-account export. Direction comes from the sign of
/// the quantity column; expenses are the sum of the commission and
/// charges columns, each blank when not levied.
pub fn parse_interactive_investor_csv(content: &str) -> Result<Vec<Transaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut transactions = Vec::new();
    for row in rdr.deserialize::<InteractiveInvestorRow>() {
        if let Some(tx) = convert(&row?)? {
            transactions.push(tx);
        }
    }
    Ok(transactions)
}

fn convert(row: &InteractiveInvestorRow) -> Result<Option<Transaction>> {
    if is_cash_movement(row) {
        debug!(description = %row.description, "skipping cash movement row");
        return Ok(None);
    }

    let quantity = parse_decimal("Quantity", &row.quantity)?;
    if quantity == 0.0 {
        debug!(description = %row.description, "skipping zero-quantity row");
        return Ok(None);
    }
    let direction = if quantity > 0.0 { Direction::Buy } else { Direction::Sell };

    let expenses =
        optional_fee("Commission", &row.commission)? + optional_fee("Charges", &row.charges)?;

    let tx = Transaction::trade(
        direction,
        parse_date(&row.date)?,
        asset_identifier(row)?,
        quantity.abs(),
        parse_decimal("Price", &row.price)?,
        expenses,
    )?;
    Ok(Some(tx))
}

/// A row with a symbol or SEDOL is always a trade: only security-less
/// rows are candidates for the cash classifier. Keywords match whole
/// words of the description, never substrings, so a holding named
/// "COFFEE HOLDING CO" or "CASHBUILD LTD" is not mistaken for a fee or
/// cash line.
fn is_cash_movement(row: &InteractiveInvestorRow) -> bool {
    if !row.symbol.trim().is_empty() || !row.sedol.trim().is_empty() {
        return false;
    }
    row.description
        .to_uppercase()
        .split_whitespace()
        .any(|word| CASH_KEYWORDS.contains(&word))
}

/// Ticker symbol when present, SEDOL otherwise. This export always has
/// one of the two for holdings; a row with neither is not a trade we
/// can attribute.
fn asset_identifier(row: &InteractiveInvestorRow) -> Result<String> {
    if !row.symbol.trim().is_empty() {
        Ok(row.symbol.trim().to_string())
    } else if !row.sedol.trim().is_empty() {
        Ok(row.sedol.trim().to_string())
    } else {
        Err(Error::MissingAssetIdentifier(format!(
            "no symbol or SEDOL on '{}'",
            row.description
        )))
    }
}

/// A blank fee cell means the fee was not levied; a populated cell must
/// parse. Defaulting a malformed value to zero would understate costs.
fn optional_fee(field: &'static str, raw: &str) -> Result<f64> {
    if raw.trim().is_empty() {
        Ok(0.0)
    } else {
        parse_decimal(field, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Date,Symbol,Sedol,Description,Quantity,Price,Commission,Charges\n";

    fn parse(rows: &str) -> Result<Vec<Transaction>> {
        parse_interactive_investor_csv(&format!("{HEADER}{rows}"))
    }

    #[test]
    fn test_positive_quantity_is_buy() {
        let txs = parse("15/10/2021,VWRL,BYX8HT1,VANGUARD FTSE ALL-WORLD,25,97.50,7.99,0.50\n")
            .unwrap();
        assert_eq!(txs[0].to_line(), "BUY 15/10/2021 VWRL 25 97.5 8.49");
    }

    #[test]
    fn test_negative_quantity_is_sell() {
        let txs = parse("03/11/2021,VWRL,BYX8HT1,VANGUARD FTSE ALL-WORLD,-10,99.00,7.99,\n")
            .unwrap();
        assert_eq!(txs[0].to_line(), "SELL 03/11/2021 VWRL 10 99 7.99");
    }

    #[test]
    fn test_blank_fees_default_to_zero() {
        let txs = parse("15/10/2021,SGLN,B00FHZ8,ISHARES PHYSICAL GOLD,5,2400,,\n").unwrap();
        assert_eq!(txs[0].to_line(), "BUY 15/10/2021 SGLN 5 2400 0");
    }

    #[test]
    fn test_malformed_fee_fails() {
        let err = parse("15/10/2021,SGLN,B00FHZ8,ISHARES PHYSICAL GOLD,5,2400,free,\n")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { field: "Commission", .. }));
    }

    #[test]
    fn test_cash_rows_are_skipped() {
        let txs = parse(
            "01/10/2021,,,MONTHLY SUBSCRIPTION,0,0,,\n\
             02/10/2021,,,CASH TRANSFER IN,1,1,,\n\
             03/10/2021,,,QUARTERLY FEE,1,1,,\n",
        )
        .unwrap();
        assert!(txs.is_empty());
    }

    #[test]
    fn test_trade_with_keyword_substring_description_is_kept() {
        let txs = parse(
            "15/10/2021,JVA,B00XXX1,COFFEE HOLDING CO,10,5.00,,\n\
             18/10/2021,CSB,B01YYY2,CASHBUILD LTD,-4,25.00,7.99,\n",
        )
        .unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].to_line(), "BUY 15/10/2021 JVA 10 5 0");
        assert_eq!(txs[1].to_line(), "SELL 18/10/2021 CSB 4 25 7.99");
    }

    #[test]
    fn test_zero_quantity_is_excluded_not_an_error() {
        let txs = parse("15/10/2021,VWRL,BYX8HT1,VANGUARD FTSE ALL-WORLD,0,97.50,,\n").unwrap();
        assert!(txs.is_empty());
    }

    #[test]
    fn test_sedol_fallback_and_missing_identifier() {
        let txs = parse("15/10/2021,,BYX8HT1,VANGUARD FTSE ALL-WORLD,5,97.50,,\n").unwrap();
        assert_eq!(txs[0].asset, "BYX8HT1");

        let err = parse("15/10/2021,,,SOME HOLDING,5,97.50,,\n").unwrap_err();
        assert!(matches!(err, Error::MissingAssetIdentifier(_)));
    }

    #[test]
    fn test_prices_with_currency_symbols() {
        let txs = parse("15/10/2021,VWRL,BYX8HT1,VANGUARD FTSE ALL-WORLD,2,\"£1,020.40\",£7.99,\n")
            .unwrap();
        assert_eq!(txs[0].to_line(), "BUY 15/10/2021 VWRL 2 1020.4 7.99");
    }
}
