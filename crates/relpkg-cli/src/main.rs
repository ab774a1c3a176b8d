//! relpkg - release packaging pipeline

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use relpkg_cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(relpkg_cli::default_filter(cli.verbose)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let report = relpkg_cli::run(cli).await?;

    for target in &report.targets {
        println!("{target}");
    }
    if let Some(page) = &report.setup_page {
        println!("setup page: {}", page.display());
    }
    println!("{}", report.push);
    Ok(())
}
