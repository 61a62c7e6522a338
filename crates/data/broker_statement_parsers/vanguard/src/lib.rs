use csv::ReaderBuilder;
use models::{Direction, Error, Result, Transaction};
use serde::Deserialize;
use tracing::debug;
use utils::{derive_asset_name_from, parse_date, parse_decimal};

pub const PARSER_NAME: &str = "vanguard";

#[derive(Debug, Deserialize)]
struct VanguardRow {
    #[serde(rename = "Type")]
    row_type: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Details")]
    details: String,
    #[serde(rename = "InvestmentName")]
    investment_name: String,
    #[serde(rename = "Quantity")]
    quantity: String,
    #[serde(rename = "PricePerUnit")]
    price_per_unit: String,
    #[serde(rename = "Amount")]
    amount: String,
}

/// Parser for the fund-platform transaction export.
///
/// The export names funds in free text (no ticker/ISIN column), marks
/// direction explicitly in the `Details` column, and carries no fee
/// columns, so expenses are fixed at zero for this source.
pub struct VanguardCsvParser {
    pub fund_families: Vec<String>,
}

impl VanguardCsvParser {
    pub fn new() -> Self {
        Self {
            fund_families: utils::FUND_FAMILIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn parse_str(&self, content: &str) -> Result<Vec<Transaction>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut transactions = Vec::new();
        for row in rdr.deserialize::<VanguardRow>() {
            if let Some(tx) = self.convert(&row?)? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    fn convert(&self, row: &VanguardRow) -> Result<Option<Transaction>> {
        match row.row_type.as_str() {
            "Order" => self.convert_order(row),
            "Dividend" => self.convert_distribution(row, false),
            "Capital Return" => self.convert_distribution(row, true),
            other => {
                // Transfers, regular payments, interest: cash movements,
                // not investment events.
                debug!(row_type = other, "skipping non-investment row");
                Ok(None)
            }
        }
    }

    fn convert_order(&self, row: &VanguardRow) -> Result<Option<Transaction>> {
        let direction = match row.details.as_str() {
            "Buy" => Direction::Buy,
            "Sell" => Direction::Sell,
            other => {
                return Err(Error::AmbiguousDirection(format!(
                    "unknown order marker '{other}'"
                )))
            }
        };

        let quantity = parse_decimal("Quantity", &row.quantity)?;
        if quantity == 0.0 {
            debug!(investment = %row.investment_name, "skipping zero-quantity order");
            return Ok(None);
        }
        if quantity < 0.0 {
            return Err(Error::AmbiguousDirection(format!(
                "negative quantity {quantity} on a marker-directed export"
            )));
        }

        // The signed cash column is the cross-check: a Buy debits cash,
        // a Sell credits it. A contradiction means the export cannot be
        // trusted for this row.
        let cash = parse_decimal("Amount", &row.amount)?;
        let consistent = match direction {
            Direction::Buy => cash <= 0.0,
            Direction::Sell => cash >= 0.0,
        };
        if !consistent {
            return Err(Error::AmbiguousDirection(format!(
                "marker '{}' contradicts cash amount {cash}",
                row.details
            )));
        }

        let families: Vec<&str> = self.fund_families.iter().map(String::as_str).collect();
        let tx = Transaction::trade(
            direction,
            parse_date(&row.date)?,
            derive_asset_name_from(&families, &row.investment_name)?,
            quantity,
            parse_decimal("PricePerUnit", &row.price_per_unit)?,
            0.0,
        )?;
        Ok(Some(tx))
    }

    fn convert_distribution(&self, row: &VanguardRow, capital: bool) -> Result<Option<Transaction>> {
        let quantity = parse_decimal("Quantity", &row.quantity)?;
        if quantity == 0.0 {
            debug!(investment = %row.investment_name, "skipping zero-quantity distribution");
            return Ok(None);
        }
        // The eligible quantity is a holding size and is never negative
        // in this export.
        if quantity < 0.0 {
            return Err(Error::InvalidNumber {
                field: "Quantity",
                value: row.quantity.trim().to_string(),
            });
        }

        // The cash column is signed by the platform's credit convention.
        let value = parse_decimal("Amount", &row.amount)?.abs();
        let families: Vec<&str> = self.fund_families.iter().map(String::as_str).collect();
        let date = parse_date(&row.date)?;
        let asset = derive_asset_name_from(&families, &row.investment_name)?;
        let tx = if capital {
            Transaction::capital_return(date, asset, quantity, value)?
        } else {
            Transaction::dividend(date, asset, quantity, value)?
        };
        Ok(Some(tx))
    }
}

impl Default for VanguardCsvParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Type,Date,Details,InvestmentName,Quantity,PricePerUnit,Amount\n";

    fn parse(rows: &str) -> Result<Vec<Transaction>> {
        VanguardCsvParser::new().parse_str(&format!("{HEADER}{rows}"))
    }

    #[test]
    fn test_buy_order_with_fund_name_slug() {
        let txs =
            parse("Order,15 Oct 2021,Buy,Vanguard FTSE Global All Cap,10,50,-500\n").unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].to_line(), "BUY 15/10/2021 FTSE_Global_All_Cap 10 50 0");
    }

    #[test]
    fn test_sell_order() {
        let txs = parse("Order,01/02/2022,Sell,Vanguard LifeStrategy 80,4.5,210.2,946.0\n")
            .unwrap();
        assert_eq!(txs[0].to_line(), "SELL 01/02/2022 LifeStrategy_80 4.5 210.2 0");
    }

    #[test]
    fn test_cash_rows_are_skipped() {
        let txs = parse(
            "Transfer,15 Oct 2021,In,Cash,0,0,500\n\
             Payment,16 Oct 2021,Regular,Cash,0,0,100\n",
        )
        .unwrap();
        assert!(txs.is_empty());
    }

    #[test]
    fn test_zero_quantity_order_is_excluded_not_an_error() {
        let txs = parse("Order,15 Oct 2021,Buy,Vanguard FTSE Global All Cap,0,50,0\n").unwrap();
        assert!(txs.is_empty());
    }

    #[test]
    fn test_marker_contradicting_cash_sign_fails() {
        let err = parse("Order,15 Oct 2021,Buy,Vanguard FTSE Global All Cap,10,50,500\n")
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousDirection(_)));
    }

    #[test]
    fn test_unknown_order_marker_fails() {
        let err = parse("Order,15 Oct 2021,Switch,Vanguard FTSE Global All Cap,10,50,-500\n")
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousDirection(_)));
    }

    #[test]
    fn test_dividend_row() {
        let txs =
            parse("Dividend,30 Sep 2021,Income,Vanguard FTSE Global All Cap,120,0,18.60\n")
                .unwrap();
        assert_eq!(txs[0].to_line(), "DIVIDEND 30/09/2021 FTSE_Global_All_Cap 120 18.6");
    }

    #[test]
    fn test_capital_return_row() {
        let txs = parse("Capital Return,30 Sep 2021,Income,Vanguard FTSE 100 Index,80,0,4.00\n")
            .unwrap();
        assert_eq!(txs[0].to_line(), "CAPRETURN 30/09/2021 FTSE_100_Index 80 4");
    }

    #[test]
    fn test_negative_distribution_quantity_fails() {
        let err = parse("Dividend,30 Sep 2021,Income,Vanguard FTSE Global All Cap,-120,0,18.60\n")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { field: "Quantity", .. }));
    }

    #[test]
    fn test_unparsable_date_fails() {
        let err = parse("Order,someday,Buy,Vanguard FTSE Global All Cap,10,50,-500\n")
            .unwrap_err();
        assert!(matches!(err, Error::UnparsableDate(_)));
    }
}
