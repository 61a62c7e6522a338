use csv::ReaderBuilder;
use models::{Direction, Error, Result, Transaction};
use serde::Deserialize;
use tracing::debug;
use utils::{parse_date, parse_decimal};

pub const PARSER_NAME: &str = "hargreaves_lansdown";

/// Non-trade account activity appearing in the same export.
const NON_TRADE_KEYWORDS: &[&str] = &[
    "INTEREST",
    "LOYALTY",
    "TRANSFER",
    "MANAGEMENT",
    "CARD",
    "DIRECT DEBIT",
];

#[derive(Debug, Deserialize)]
struct HargreavesLansdownRow {
    #[serde(rename = "Trade date")]
    trade_date: String,
    #[serde(rename = "Reference")]
    reference: String,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Quantity")]
    quantity: String,
    #[serde(rename = "Unit price")]
    unit_price: String,
    #[serde(rename = "Debit")]
    debit: String,
    #[serde(rename = "Credit")]
    credit: String,
}

/// Parses the stockbroker account export. This source has no signed
/// quantity and no marker column: direction is carried by which of the
/// two money columns is populated. A debit pays for a purchase, a
/// credit receives sale proceeds. Both or neither populated on a trade
/// row means the direction cannot be determined and the row fails
/// rather than being guessed at. No fee columns exist, so expenses are
/// fixed at zero for this source.
pub fn parse_hargreaves_lansdown_csv(content: &str) -> Result<Vec<Transaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut transactions = Vec::new();
    for row in rdr.deserialize::<HargreavesLansdownRow>() {
        if let Some(tx) = convert(&row?)? {
            transactions.push(tx);
        }
    }
    Ok(transactions)
}

fn convert(row: &HargreavesLansdownRow) -> Result<Option<Transaction>> {
    let description = row.description.to_uppercase();
    if NON_TRADE_KEYWORDS.iter().any(|kw| description.contains(kw)) {
        debug!(reference = %row.reference, "skipping non-trade row");
        return Ok(None);
    }

    let quantity = parse_decimal("Quantity", &row.quantity)?;
    if quantity == 0.0 {
        debug!(reference = %row.reference, "skipping zero-quantity row");
        return Ok(None);
    }
    if quantity < 0.0 {
        return Err(Error::AmbiguousDirection(format!(
            "negative quantity {quantity} contradicts the debit/credit convention"
        )));
    }

    let direction = determine_direction(row)?;

    if row.code.trim().is_empty() {
        return Err(Error::MissingAssetIdentifier(format!(
            "no stock code on reference '{}'",
            row.reference
        )));
    }

    let tx = Transaction::trade(
        direction,
        parse_date(&row.trade_date)?,
        row.code.trim(),
        quantity,
        parse_decimal("Unit price", &row.unit_price)?,
        0.0,
    )?;
    Ok(Some(tx))
}

fn determine_direction(row: &HargreavesLansdownRow) -> Result<Direction> {
    let debit = row.debit.trim();
    let credit = row.credit.trim();
    match (debit.is_empty(), credit.is_empty()) {
        (false, true) => {
            parse_decimal("Debit", debit)?;
            Ok(Direction::Buy)
        }
        (true, false) => {
            parse_decimal("Credit", credit)?;
            Ok(Direction::Sell)
        }
        (false, false) => Err(Error::AmbiguousDirection(format!(
            "both debit and credit populated on reference '{}'",
            row.reference
        ))),
        (true, true) => Err(Error::AmbiguousDirection(format!(
            "neither debit nor credit populated on reference '{}'",
            row.reference
        ))),
    }
}
