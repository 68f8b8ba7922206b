use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::chart::ChartArgs;
use crate::config::{DeliveryMode, FeedConfig, ProviderKind};
use crate::tail::TailArgs;

#[derive(Debug, Parser)]
#[command(author, version, about = "Stock quote polling and broadcast server")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(self) -> Command {
        self.command
            .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve quote lookups and the live update stream
    Serve(ServeArgs),
    /// Subscribe to symbols on a running server and print updates
    Tail(TailArgs),
    /// Fetch daily history from a running server and render an ASCII chart
    Chart(ChartArgs),
}

/// Flags override the environment.
#[derive(Debug, Args, Clone, Default)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:5000)
    #[arg(long)]
    pub addr: Option<SocketAddr>,

    /// Upstream provider: fmp | alpha_vantage
    #[arg(long)]
    pub provider: Option<ProviderKind>,

    /// Milliseconds between poll ticks
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Milliseconds a fetched result stays fresh
    #[arg(long)]
    pub cache_ttl_ms: Option<u64>,

    /// Update delivery: global | subscribed
    #[arg(long)]
    pub delivery: Option<DeliveryMode>,
}

impl ServeArgs {
    /// Environment (and `.env`) first, then these flags.
    pub fn load_config(&self) -> Result<FeedConfig> {
        self.apply(FeedConfig::from_env(self.provider)?)
    }

    pub fn apply(&self, mut config: FeedConfig) -> Result<FeedConfig> {
        if let Some(addr) = self.addr {
            config.bind_addr = addr;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = self.cache_ttl_ms {
            config.cache_ttl = Duration::from_millis(ms);
        }
        if let Some(delivery) = self.delivery {
            config.delivery = delivery;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::parse_from(["rust-stock-feed"]);
        assert!(matches!(cli.command(), Command::Serve(_)));
    }

    #[test]
    fn serve_flags_override_config() {
        let cli = Cli::parse_from([
            "rust-stock-feed",
            "serve",
            "--addr",
            "0.0.0.0:7000",
            "--poll-interval-ms",
            "250",
            "--delivery",
            "subscribed",
        ]);
        let Command::Serve(args) = cli.command() else {
            panic!("expected serve");
        };
        let config = args.apply(FeedConfig::default()).expect("config");
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.delivery, DeliveryMode::Subscribed);
    }

    #[test]
    fn provider_flag_selects_provider_defaults() {
        let cli = Cli::parse_from(["rust-stock-feed", "serve", "--provider", "alpha_vantage"]);
        let Command::Serve(args) = cli.command() else {
            panic!("expected serve");
        };
        let config = args.load_config().expect("config");
        assert_eq!(config.provider.kind, ProviderKind::AlphaVantage);
    }

    #[test]
    fn tail_splits_symbol_list() {
        let cli = Cli::parse_from(["rust-stock-feed", "tail", "--symbols", "aapl,msft"]);
        let Command::Tail(args) = cli.command() else {
            panic!("expected tail");
        };
        assert_eq!(args.symbols, vec!["aapl", "msft"]);
    }
}
