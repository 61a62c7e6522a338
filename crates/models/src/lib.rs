use chrono::NaiveDate;
use thiserror::Error;

/// Failure categories shared by every source parser and the merge step.
///
/// A parser either returns a complete record set or exactly one of these,
/// naming the field and raw text that failed. Classifier-level skips
/// (cash movements, zero-quantity rows) are not errors and never reach
/// this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid number in {field}: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("unparsable date: '{0}'")]
    UnparsableDate(String),

    #[error("missing asset identifier: {0}")]
    MissingAssetIdentifier(String),

    #[error("unsupported currency '{token}', expected {expected}")]
    UnsupportedCurrency { token: String, expected: &'static str },

    #[error("ambiguous transaction direction: {0}")]
    AmbiguousDirection(String),

    #[error("unrecognized content: {0}")]
    UnrecognizedContent(String),

    #[error("output line has no parsable date in its second field: '{0}'")]
    MalformedOutputLine(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Trade direction. The sign of a transaction lives here, never in the
/// quantity field of a canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Buy,
    Sell,
}

/// Kind-specific payload of a canonical transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionKind {
    Buy { amount: f64, price: f64, expenses: f64 },
    Sell { amount: f64, price: f64, expenses: f64 },
    Dividend { amount: f64, value: f64 },
    CapitalReturn { amount: f64, value: f64 },
    Split { multiplier: f64 },
    Unsplit { multiplier: f64 },
}

impl TransactionKind {
    pub fn tag(&self) -> &'static str {
        match self {
            TransactionKind::Buy { .. } => "BUY",
            TransactionKind::Sell { .. } => "SELL",
            TransactionKind::Dividend { .. } => "DIVIDEND",
            TransactionKind::CapitalReturn { .. } => "CAPRETURN",
            TransactionKind::Split { .. } => "SPLIT",
            TransactionKind::Unsplit { .. } => "UNSPLIT",
        }
    }
}

/// The canonical, source-independent transaction record.
///
/// Constructed once by a source parser from one logical input unit (one
/// CSV row or one email body) and immutable afterwards. The smart
/// constructors below enforce every field invariant, so a value of this
/// type is always formattable.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub asset: String,
    pub kind: TransactionKind,
}

impl Transaction {
    /// Builds a BUY or SELL. `amount` is the unsigned magnitude; callers
    /// resolve the source's sign convention before getting here.
    pub fn trade(
        direction: Direction,
        date: NaiveDate,
        asset: impl Into<String>,
        amount: f64,
        price: f64,
        expenses: f64,
    ) -> Result<Self> {
        let amount = positive("amount", amount)?;
        let price = positive("price", price)?;
        let expenses = non_negative("expenses", expenses)?;
        let kind = match direction {
            Direction::Buy => TransactionKind::Buy { amount, price, expenses },
            Direction::Sell => TransactionKind::Sell { amount, price, expenses },
        };
        Ok(Self { date, asset: checked_asset(asset.into())?, kind })
    }

    /// Builds a DIVIDEND: eligible quantity plus the cash distributed.
    pub fn dividend(
        date: NaiveDate,
        asset: impl Into<String>,
        amount: f64,
        value: f64,
    ) -> Result<Self> {
        let kind = TransactionKind::Dividend {
            amount: positive("amount", amount)?,
            value: positive("value", value)?,
        };
        Ok(Self { date, asset: checked_asset(asset.into())?, kind })
    }

    /// Builds a CAPRETURN: eligible quantity plus the capital returned.
    pub fn capital_return(
        date: NaiveDate,
        asset: impl Into<String>,
        amount: f64,
        value: f64,
    ) -> Result<Self> {
        let kind = TransactionKind::CapitalReturn {
            amount: positive("amount", amount)?,
            value: positive("value", value)?,
        };
        Ok(Self { date, asset: checked_asset(asset.into())?, kind })
    }

    /// Builds a SPLIT (`unsplit` false) or UNSPLIT (`unsplit` true) with
    /// the holding multiplier.
    pub fn adjustment(
        date: NaiveDate,
        asset: impl Into<String>,
        multiplier: f64,
        unsplit: bool,
    ) -> Result<Self> {
        let multiplier = positive("multiplier", multiplier)?;
        let kind = if unsplit {
            TransactionKind::Unsplit { multiplier }
        } else {
            TransactionKind::Split { multiplier }
        };
        Ok(Self { date, asset: checked_asset(asset.into())?, kind })
    }

    /// Formats the record as one whitespace-separated output line.
    ///
    /// Trades carry six fields, distributions five, splits four. The date
    /// always serializes as DD/MM/YYYY. The kind set is closed by the
    /// enum, so every constructed record has a line representation.
    pub fn to_line(&self) -> String {
        let tag = self.kind.tag();
        let date = self.date.format("%d/%m/%Y");
        match &self.kind {
            TransactionKind::Buy { amount, price, expenses }
            | TransactionKind::Sell { amount, price, expenses } => format!(
                "{tag} {date} {} {} {} {}",
                self.asset,
                num(*amount),
                num(*price),
                num(*expenses)
            ),
            TransactionKind::Dividend { amount, value }
            | TransactionKind::CapitalReturn { amount, value } => format!(
                "{tag} {date} {} {} {}",
                self.asset,
                num(*amount),
                num(*value)
            ),
            TransactionKind::Split { multiplier }
            | TransactionKind::Unsplit { multiplier } => {
                format!("{tag} {date} {} {}", self.asset, num(*multiplier))
            }
        }
    }
}

/// Shortest round-trip rendering, so `45000.0` prints as `45000`.
fn num(v: f64) -> String {
    format!("{v}")
}

fn positive(field: &'static str, v: f64) -> Result<f64> {
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(Error::InvalidNumber { field, value: v.to_string() })
    }
}

fn non_negative(field: &'static str, v: f64) -> Result<f64> {
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(Error::InvalidNumber { field, value: v.to_string() })
    }
}

fn checked_asset(asset: String) -> Result<String> {
    if asset.trim().is_empty() {
        Err(Error::MissingAssetIdentifier("asset is empty or whitespace".to_string()))
    } else {
        Ok(asset)
    }
}
