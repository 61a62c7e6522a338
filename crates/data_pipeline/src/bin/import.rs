use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use data_pipeline::{run, Config, Source};

#[derive(Debug, Parser)]
#[command(
    name = "import",
    author,
    version,
    about = "Normalize broker exports into the capital-gains ledger",
    long_about = None
)]
struct Args {
    /// Broker format of the input files: vanguard, interactive-investor,
    /// hargreaves-lansdown or bullionvault
    #[arg(short, long)]
    source: String,

    /// Exported statement files (or raw email files) to ingest
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Ledger file holding the lines from previous runs
    #[arg(short, long, default_value = "./transactions.txt")]
    output: PathBuf,

    /// Write the merged ledger back (otherwise dry-run)
    #[arg(short, long)]
    write: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let source: Source = args.source.parse().map_err(|e| anyhow!("{e}"))?;

    let merged = run(Config {
        source,
        inputs: args.inputs,
        output_file: args.output.clone(),
        write: args.write,
    })?;

    if args.write {
        println!("✓ Wrote {} transactions to {:?}", merged.len(), args.output);
    } else {
        println!(
            "Dry-run: merged ledger holds {} transactions. Use --write to persist.",
            merged.len()
        );
    }
    Ok(())
}
