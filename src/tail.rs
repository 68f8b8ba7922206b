use anyhow::{bail, Context, Result};
use clap::Args;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::broadcast::{ClientEvent, ServerEvent};
use crate::constants::BIND_PORT;

#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// Symbols to subscribe to, comma separated (e.g. AAPL,MSFT)
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub symbols: Vec<String>,

    /// Stop after printing this many updates
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Websocket endpoint of a running server
    #[arg(long, default_value_t = default_ws_url())]
    pub url: String,
}

fn default_ws_url() -> String {
    format!("ws://127.0.0.1:{BIND_PORT}/ws")
}

pub async fn run(args: TailArgs) -> Result<()> {
    let (mut ws, _) = tokio_tungstenite::connect_async(args.url.as_str())
        .await
        .with_context(|| {
            format!(
                "failed to connect to {}; run `rust-stock-feed serve` first",
                args.url
            )
        })?;

    let subscribe = serde_json::to_string(&ClientEvent::Subscribe(args.symbols.clone()))?;
    ws.send(Message::Text(subscribe))
        .await
        .context("failed to send subscription")?;
    println!(
        "Subscribed to {} on {}; streaming updates...",
        args.symbols.join(","),
        args.url
    );

    let mut printed = 0usize;
    while let Some(message) = ws.next().await {
        let payload = match message.context("websocket read failed")? {
            Message::Text(payload) => payload,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ServerEvent>(&payload)? {
            ServerEvent::StockUpdate(quote) => {
                println!(
                    "{:>10} | {:>8} | {:>10} | {:>10} | {:>8}%",
                    quote.last_updated, quote.symbol, quote.price, quote.change, quote.percent_change
                );
                printed += 1;
            }
            ServerEvent::Error { message } => bail!("server rejected request: {message}"),
        }

        if let Some(limit) = args.limit {
            if printed >= limit {
                break;
            }
        }
    }

    let _ = ws.close(None).await;
    Ok(())
}
