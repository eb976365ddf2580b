use std::sync::Arc;

use reqwest::{Method, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::TokenManager;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::http::{build_client, HttpClient};
use crate::stream::{BarUnit, Connector, HttpConnector, StreamSession, Subscription};

/// Entry point tying the token manager, HTTP client and streaming together.
///
/// REST callers use [`authorize`](Self::authorize) (or
/// [`get_json`](Self::get_json)) to attach a valid token to their own
/// requests; streaming callers open sessions with [`stream`](Self::stream)
/// or one of the typed helpers. All sessions share the client's token.
///
/// # Example
///
/// ```no_run
/// use tradestation_rs::{AuthConfig, ClientConfig, TradeStationClient};
/// use tradestation_rs::stream::BarUnit;
///
/// #[tokio::main]
/// async fn main() -> tradestation_rs::Result<()> {
///     let config = ClientConfig::new(AuthConfig::new("client-id", "client-secret"));
///     let client = TradeStationClient::new(config)?;
///
///     let mut bars = client.stream_bars("MSFT", 1, BarUnit::Minute).await?;
///     while let Some(event) = bars.next().await {
///         println!("{:?}", event?);
///     }
///
///     client.close();
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TradeStationClient {
    config: ClientConfig,
    http: HttpClient,
    tokens: TokenManager,
    connector: Arc<dyn Connector>,
}

impl TradeStationClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let http = build_client(&config.user_agent)?;
        let tokens = TokenManager::with_http_client(config.auth.clone(), http.clone())?;
        let connector = Arc::new(
            HttpConnector::new(http.clone(), config.base_url())
                .with_connect_timeout(config.stream.connect_timeout),
        );
        Ok(Self {
            http: HttpClient::new(http, config.base_url()),
            config,
            tokens,
            connector,
        })
    }

    /// Build a client from an existing token manager and connector
    pub fn with_parts(
        config: ClientConfig,
        tokens: TokenManager,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;
        let http = build_client(&config.user_agent)?;
        Ok(Self {
            http: HttpClient::new(http, config.base_url()),
            config,
            tokens,
            connector,
        })
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Start a request against the API base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.inner().request(method, self.http.url(path))
    }

    /// Attach a valid bearer token to `request`
    pub async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.tokens.get_valid_token().await?;
        Ok(request.bearer_auth(token.access_token().expose_secret()))
    }

    /// Authorized GET of `path`, decoded from JSON.
    ///
    /// A 401 invalidates the token and the request is retried once with a
    /// fresh one.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let token = self.tokens.get_valid_token().await?;
        match self.http.get(path, &token.bearer()).await {
            Err(Error::Api { status: 401, .. }) => {
                debug!(event = "rest_token_rejected", path);
                self.tokens.invalidate(&token);
                let token = self.tokens.get_valid_token().await?;
                self.http.get(path, &token.bearer()).await
            }
            other => other,
        }
    }

    /// Open a stream session for `subscription`
    pub async fn stream(&self, subscription: Subscription) -> Result<StreamSession> {
        StreamSession::open(
            subscription,
            self.tokens.clone(),
            Arc::clone(&self.connector),
            self.config.stream.clone(),
        )
        .await
    }

    pub async fn stream_bars(
        &self,
        symbol: impl Into<String>,
        interval: u32,
        unit: BarUnit,
    ) -> Result<StreamSession> {
        self.stream(Subscription::bars(symbol, interval, unit)).await
    }

    pub async fn stream_quotes<I, S>(&self, symbols: I) -> Result<StreamSession>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stream(Subscription::quotes(symbols)).await
    }

    pub async fn stream_orders<I, S>(&self, accounts: I) -> Result<StreamSession>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stream(Subscription::orders(accounts)).await
    }

    pub async fn stream_positions<I, S>(&self, accounts: I, changes: bool) -> Result<StreamSession>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stream(Subscription::positions(accounts, changes)).await
    }

    /// Close the token manager. Open sessions fail on their next reconnect.
    pub fn close(&self) {
        self.tokens.close();
    }
}
