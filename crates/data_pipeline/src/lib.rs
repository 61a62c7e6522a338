use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use models::{Error, Transaction};

/// The broker formats this pipeline can ingest. Dispatch is by this
/// explicit tag supplied by the caller; content is never sniffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Vanguard,
    InteractiveInvestor,
    HargreavesLansdown,
    BullionVault,
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::Vanguard => vanguard::PARSER_NAME,
            Source::InteractiveInvestor => interactive_investor::PARSER_NAME,
            Source::HargreavesLansdown => hargreaves_lansdown::PARSER_NAME,
            Source::BullionVault => bullionvault::PARSER_NAME,
        }
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Error> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "vanguard" => Ok(Source::Vanguard),
            "interactive_investor" => Ok(Source::InteractiveInvestor),
            "hargreaves_lansdown" => Ok(Source::HargreavesLansdown),
            "bullionvault" => Ok(Source::BullionVault),
            other => Err(Error::UnrecognizedContent(format!(
                "unknown source tag '{other}'"
            ))),
        }
    }
}

/// Parses one raw content unit (a CSV blob, or one email message) with
/// the parser for `source`.
pub fn parse(source: Source, content: &str) -> models::Result<Vec<Transaction>> {
    match source {
        Source::Vanguard => vanguard::VanguardCsvParser::new().parse_str(content),
        Source::InteractiveInvestor => {
            interactive_investor::parse_interactive_investor_csv(content)
        }
        Source::HargreavesLansdown => {
            hargreaves_lansdown::parse_hargreaves_lansdown_csv(content)
        }
        Source::BullionVault => bullionvault::parse_bullionvault_email(content),
    }
}

pub fn format_transactions(transactions: &[Transaction]) -> Vec<String> {
    transactions.iter().map(Transaction::to_line).collect()
}

/// Extracts the calendar date embedded as the second whitespace token of
/// a formatted output line.
pub fn line_date(line: &str) -> models::Result<NaiveDate> {
    let token = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::MalformedOutputLine(line.to_string()))?;
    NaiveDate::parse_from_str(token, "%d/%m/%Y")
        .map_err(|_| Error::MalformedOutputLine(line.to_string()))
}

/// Merges previously persisted lines with newly formatted ones.
///
/// Blank lines are dropped, duplicates are removed using the exact line
/// text as the identity (first occurrence wins), and the union is
/// stable-sorted by the embedded date. One line without a parsable date
/// aborts the whole merge; silently reordering around it would corrupt
/// the ledger.
pub fn merge(existing: &[String], new: &[String]) -> models::Result<Vec<String>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut keyed: Vec<(NaiveDate, &str)> = Vec::new();
    for line in existing.iter().chain(new.iter()) {
        let line = line.trim();
        if line.is_empty() || !seen.insert(line) {
            continue;
        }
        keyed.push((line_date(line)?, line));
    }
    keyed.sort_by_key(|(date, _)| *date);

    let merged: Vec<String> = keyed.into_iter().map(|(_, line)| line.to_string()).collect();
    for (first, second) in find_near_duplicates(&merged) {
        warn!(%first, %second, "lines differ in a single field; possible corrected duplicate");
    }
    Ok(merged)
}

/// Exact-line dedup cannot collapse a record whose fee or price was
/// corrected between exports: both lines survive. There is no defined
/// reconciliation rule for that case, so pairs that look like the same
/// event are flagged for manual review, never resolved automatically.
///
/// Lines are grouped by kind, date and asset before comparison, so the
/// pairing is found even when unrelated same-day lines sort between the
/// two.
fn find_near_duplicates(lines: &[String]) -> Vec<(String, String)> {
    let mut groups: HashMap<(&str, &str, &str), Vec<Vec<&str>>> = HashMap::new();
    for line in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() >= 4 {
            groups
                .entry((tokens[0], tokens[1], tokens[2]))
                .or_default()
                .push(tokens);
        }
    }

    let mut pairs = Vec::new();
    for group in groups.values() {
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                if a.len() != b.len() {
                    continue;
                }
                let differing = a.iter().zip(b.iter()).filter(|(x, y)| x != y).count();
                if differing == 1 {
                    pairs.push((a.join(" "), b.join(" ")));
                }
            }
        }
    }
    pairs
}

pub struct Config {
    pub source: Source,
    pub inputs: Vec<PathBuf>,
    pub output_file: PathBuf,
    pub write: bool,
}

/// Reads every input file, parses it with the configured source parser,
/// merges the formatted records with the current output file content and
/// returns the merged line list. The output file is rewritten only when
/// `write` is set. A failure in any input unit aborts the run before
/// anything is written; partial results never reach the ledger.
pub fn run(cfg: Config) -> Result<Vec<String>> {
    let mut parsed = Vec::new();
    for path in &cfg.inputs {
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let transactions = parse(cfg.source, &content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(source = cfg.source.name(), file = %path.display(),
            count = transactions.len(), "parsed input");
        parsed.extend(transactions);
    }

    let existing: Vec<String> = if cfg.output_file.exists() {
        fs::read_to_string(&cfg.output_file)
            .with_context(|| format!("cannot read {}", cfg.output_file.display()))?
            .lines()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    let merged = merge(&existing, &format_transactions(&parsed))?;

    if cfg.write {
        let mut body = merged.join("\n");
        body.push('\n');
        fs::write(&cfg.output_file, body)
            .with_context(|| format!("cannot write {}", cfg.output_file.display()))?;
    }
    Ok(merged)
}
