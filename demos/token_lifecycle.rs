use secrecy::SecretString;
use tradestation_rs::auth::TokenManager;
use tradestation_rs::config::{AuthConfig, GrantMode};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let client_id = std::env::var("TS_CLIENT_ID")?;
    let client_secret = std::env::var("TS_CLIENT_SECRET")?;

    // Reuse a refresh token from an earlier session when one is given,
    // otherwise go through the browser.
    let grant = match std::env::var("TS_REFRESH_TOKEN") {
        Ok(token) => GrantMode::RefreshToken(SecretString::from(token)),
        Err(_) => GrantMode::default(),
    };
    let config = AuthConfig::new(client_id, client_secret).with_grant(grant);
    let tokens = TokenManager::new(config)?;

    let token = tokens.acquire().await?;
    println!("Acquired token: {:?}", token);
    println!("Scopes: {:?}", token.scope());

    // Concurrent callers share whatever renewal is needed.
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.get_valid_token().await })
        })
        .collect();
    for handle in handles {
        let token = handle.await??;
        println!("Caller got token issued at {}", token.issued_at());
    }

    let refreshed = tokens.refresh().await?;
    println!(
        "Forced refresh: new token {}",
        if refreshed.same_access_token(&token) { "unchanged" } else { "issued" }
    );

    tokens.close();
    println!("Closed: {}", tokens.is_closed());
    Ok(())
}
