use futures_util::StreamExt;
use tradestation_rs::config::Environment;
use tradestation_rs::stream::DataEvent;
use tradestation_rs::{AuthConfig, ClientConfig, TradeStationClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let client_id = std::env::var("TS_CLIENT_ID")?;
    let client_secret = std::env::var("TS_CLIENT_SECRET")?;
    let accounts: Vec<String> = std::env::var("TS_ACCOUNTS")?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let config = ClientConfig::new(AuthConfig::new(client_id, client_secret))
        .with_environment(Environment::Demo);
    let client = TradeStationClient::new(config)?;

    println!("Streaming orders for {} account(s)...\n", accounts.len());
    let session = client.stream_orders(accounts).await?;
    let stream = session.into_stream();
    futures_util::pin_mut!(stream);

    // Stop after ten minutes; dropping the stream closes the connection.
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(600));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                println!("Done.");
                break;
            }
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    if let Some(DataEvent::Order(order)) = event.data() {
                        println!(
                            "[{}] order {} {:?} {}",
                            order.account_id,
                            order.order_id,
                            order.status,
                            if order.is_terminal() { "(final)" } else { "" }
                        );
                    } else if event.is_go_away() {
                        println!("Server asked us to reconnect");
                    } else if let Some(frame) = event.error_frame() {
                        println!("Error frame: {:?} {:?}", frame.code, frame.message);
                    }
                }
                Some(Err(e)) => {
                    eprintln!("Stream ended: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    client.close();
    Ok(())
}
