use anyhow::Result;
use clap::Parser;
use rust_stock_feed::chart;
use rust_stock_feed::cli::{self, Cli};
use rust_stock_feed::server;
use rust_stock_feed::tail;

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command() {
        cli::Command::Serve(args) => {
            let config = args.load_config()?;
            server::run_with_config(config).await
        }
        cli::Command::Tail(args) => tail::run(args).await,
        cli::Command::Chart(args) => chart::run(args).await,
    }
}
