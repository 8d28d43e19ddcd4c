use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use unique_ipv4_counter::cli::Args;
use unique_ipv4_counter::count_distinct;

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let report = count_distinct(&args.path, &args.config())
        .with_context(|| format!("counting addresses in {}", args.path.display()))?;

    println!("{}", report.distinct);
    Ok(())
}
