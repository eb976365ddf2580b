use tradestation_rs::stream::{BarUnit, DataEvent, EventKind};
use tradestation_rs::{AuthConfig, ClientConfig, TradeStationClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let client_id = std::env::var("TS_CLIENT_ID")?;
    let client_secret = std::env::var("TS_CLIENT_SECRET")?;
    let symbol = std::env::var("TS_SYMBOL").unwrap_or_else(|_| "MSFT".to_string());

    let config = ClientConfig::new(AuthConfig::new(client_id, client_secret));
    let client = TradeStationClient::new(config)?;

    println!("Opening 1-minute bar stream for {}...", symbol);
    println!("(approve access in the browser if prompted)\n");
    let mut session = client.stream_bars(&symbol, 1, BarUnit::Minute).await?;

    let mut bar_count = 0;
    while let Some(result) = session.next().await {
        match result {
            Ok(event) => match event.kind {
                EventKind::Data(DataEvent::Bar(bar)) => {
                    bar_count += 1;
                    println!(
                        "[Bar #{}] {} O {} H {} L {} C {} V {} {:?}",
                        bar_count,
                        bar.time_stamp,
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.total_volume.unwrap_or_default(),
                        bar.bar_status,
                    );
                }
                EventKind::Heartbeat(hb) => {
                    println!("[Heartbeat] {:?}", hb.sequence);
                }
                EventKind::Error(frame) => {
                    println!("[Error frame] {:?}: {:?}", frame.code, frame.message);
                }
                EventKind::Status(change) => {
                    println!("[Status] {:?}", change.status);
                }
                EventKind::Data(other) => {
                    println!("[Unexpected] {:?}", other);
                }
            },
            Err(e) => {
                eprintln!("Stream ended: {}", e);
                break;
            }
        }
    }

    println!("\nReceived {} bars, {} reconnects", bar_count, session.reconnects());
    client.close();
    Ok(())
}
