use anyhow::{bail, Context, Result};
use clap::Args;
use textplots::{Chart, Plot, Shape};

use crate::constants::BIND_PORT;
use crate::model::{HistoryPoint, Symbol};

#[derive(Debug, Args, Clone)]
pub struct ChartArgs {
    /// Symbol whose daily closes should be plotted
    #[arg(short, long)]
    pub symbol: String,

    /// Base URL of a running server
    #[arg(long, default_value_t = default_http_url())]
    pub url: String,

    /// Chart width in characters
    #[arg(long, default_value_t = 120)]
    pub width: u32,

    /// Chart height in characters
    #[arg(long, default_value_t = 30)]
    pub height: u32,
}

fn default_http_url() -> String {
    format!("http://127.0.0.1:{BIND_PORT}")
}

pub async fn run(args: ChartArgs) -> Result<()> {
    let Some(symbol) = Symbol::parse(&args.symbol) else {
        bail!("symbol must not be blank");
    };
    let points = fetch_history(&args.url, &symbol).await?;
    let samples = to_samples(&points)?;

    if samples.len() < 2 {
        bail!("not enough history for {symbol} to render a chart");
    }

    render_chart(&symbol, &points, &samples, args.width, args.height);
    Ok(())
}

async fn fetch_history(base_url: &str, symbol: &Symbol) -> Result<Vec<HistoryPoint>> {
    let url = format!(
        "{}/api/stocks/history/{}",
        base_url.trim_end_matches('/'),
        symbol
    );
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {url}; run `rust-stock-feed serve` first"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("history request for {symbol} failed with {status}: {body}");
    }

    response
        .json::<Vec<HistoryPoint>>()
        .await
        .context("history response was not a list of points")
}

/// (days since first point, close) pairs.
fn to_samples(points: &[HistoryPoint]) -> Result<Vec<(f32, f32)>> {
    let Some(first) = points.first() else {
        return Ok(Vec::new());
    };

    points
        .iter()
        .map(|point| {
            let price: f32 = point
                .price
                .parse()
                .with_context(|| format!("invalid price '{}' on {}", point.price, point.date))?;
            let day = (point.date - first.date).num_days() as f32;
            Ok((day, price))
        })
        .collect()
}

fn render_chart(
    symbol: &Symbol,
    points: &[HistoryPoint],
    samples: &[(f32, f32)],
    width: u32,
    height: u32,
) {
    let (first, last) = (&points[0], &points[points.len() - 1]);
    println!(
        "Daily closes for {symbol}: {} → {} ({} sessions)",
        first.date,
        last.date,
        points.len()
    );

    let min_price = samples.iter().map(|(_, p)| *p).fold(f32::INFINITY, f32::min);
    let max_price = samples
        .iter()
        .map(|(_, p)| *p)
        .fold(f32::NEG_INFINITY, f32::max);
    println!("Price range: {min_price:.2} → {max_price:.2}");

    let max_day = samples.last().map(|(d, _)| *d).unwrap_or(1.0).max(1.0);

    Chart::new(width.max(40), height.max(10), 0.0, max_day)
        .lineplot(&Shape::Lines(samples))
        .display();
    println!();
}
