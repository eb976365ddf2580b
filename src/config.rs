//! Explicit configuration for the token manager, stream sessions and client.
//!
//! Nothing here reads the environment or any global state: callers build the
//! values and pass them in. Every config type has a `validate` method that
//! reports problems as [`Error::Config`].

use std::time::Duration;

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};
use crate::stream::ReconnectConfig;

/// Base URL of the live trading API
pub const LIVE_API_URL: &str = "https://api.tradestation.com";
/// Base URL of the simulated (demo) trading API
pub const DEMO_API_URL: &str = "https://sim-api.tradestation.com";
/// OAuth authorization endpoint
pub const AUTHORIZE_URL: &str = "https://signin.tradestation.com/authorize";
/// OAuth token endpoint
pub const TOKEN_URL: &str = "https://signin.tradestation.com/oauth/token";
/// Audience requested for API access tokens
pub const DEFAULT_AUDIENCE: &str = "https://api.tradestation.com";
/// Scopes requested when none are configured
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "offline_access",
    "MarketData",
    "ReadAccount",
    "Trade",
];
/// Local port the authorization redirect is delivered to
pub const DEFAULT_REDIRECT_PORT: u16 = 31022;

/// Which API deployment to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Real brokerage accounts
    Live,
    /// Simulated accounts
    #[default]
    Demo,
}

impl Environment {
    pub fn api_base_url(&self) -> &'static str {
        match self {
            Environment::Live => LIVE_API_URL,
            Environment::Demo => DEMO_API_URL,
        }
    }
}

/// How the token manager obtains its first token
#[derive(Debug, Clone)]
pub enum GrantMode {
    /// Interactive authorization-code flow; the user approves access in a
    /// browser and is redirected to `http://localhost:{redirect_port}/`
    AuthorizationCode { redirect_port: u16 },
    /// Client-credentials grant, no user interaction
    ClientCredentials,
    /// Headless start from a refresh token issued in an earlier session
    RefreshToken(SecretString),
}

impl Default for GrantMode {
    fn default() -> Self {
        GrantMode::AuthorizationCode {
            redirect_port: DEFAULT_REDIRECT_PORT,
        }
    }
}

/// OAuth client configuration consumed by [`TokenManager`](crate::auth::TokenManager)
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub grant: GrantMode,
    pub scopes: Vec<String>,
    pub audience: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Subtracted from the server-reported lifetime of every token
    pub refresh_margin: Duration,
    /// Upper bound for a single call to the token endpoint
    pub exchange_timeout: Duration,
    /// Upper bound for the user to complete the browser step
    pub authorization_timeout: Duration,
    /// Send a PKCE challenge with the authorization-code flow
    pub use_pkce: bool,
}

impl AuthConfig {
    /// Create a configuration with the default grant (authorization code on
    /// port 31022), scopes, endpoints and timings.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            grant: GrantMode::default(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            audience: DEFAULT_AUDIENCE.to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            refresh_margin: Duration::from_secs(60),
            exchange_timeout: Duration::from_secs(30),
            authorization_timeout: Duration::from_secs(300),
            use_pkce: true,
        }
    }

    pub fn with_grant(mut self, grant: GrantMode) -> Self {
        self.grant = grant;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn with_authorization_timeout(mut self, timeout: Duration) -> Self {
        self.authorization_timeout = timeout;
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Scopes joined the way the authorization server expects them
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Redirect URI registered for the authorization-code flow
    pub fn redirect_uri(&self) -> Option<String> {
        match &self.grant {
            GrantMode::AuthorizationCode { redirect_port } => {
                Some(format!("http://localhost:{}/", redirect_port))
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must be provided".to_string()));
        }
        if self.client_secret.expose_secret().trim().is_empty() {
            return Err(Error::Config("client_secret must be provided".to_string()));
        }
        match &self.grant {
            GrantMode::AuthorizationCode { redirect_port } if *redirect_port == 0 => {
                return Err(Error::Config(
                    "redirect_port must be a fixed, registered port".to_string(),
                ));
            }
            GrantMode::RefreshToken(token) if token.expose_secret().trim().is_empty() => {
                return Err(Error::Config("refresh token must not be empty".to_string()));
            }
            _ => {}
        }
        if self.scopes.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::Config("at least one scope is required".to_string()));
        }
        for (name, url) in [
            ("authorize_url", &self.authorize_url),
            ("token_url", &self.token_url),
        ] {
            Url::parse(url).map_err(|e| Error::Config(format!("invalid {}: {}", name, e)))?;
        }
        if self.exchange_timeout.is_zero() || self.authorization_timeout.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Timing and resource limits for a [`StreamSession`](crate::stream::StreamSession)
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Longest silence (no complete frame, heartbeats included) tolerated
    /// before the connection is treated as stalled
    pub heartbeat_timeout: Duration,
    /// Upper bound for establishing a single connection
    pub connect_timeout: Duration,
    /// Backoff and attempt budget for reconnecting
    pub reconnect: ReconnectConfig,
    /// How many times per connect a 401 is answered with a token refresh
    /// before the session gives up
    pub max_auth_retries: u32,
    /// Longest frame accepted; longer frames become `Oversized` error frames
    pub max_frame_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            max_auth_retries: 1,
            max_frame_len: 1024 * 1024,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_timeout.is_zero() {
            return Err(Error::Config("heartbeat_timeout must be non-zero".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("connect_timeout must be non-zero".to_string()));
        }
        if self.max_frame_len == 0 {
            return Err(Error::Config("max_frame_len must be non-zero".to_string()));
        }
        self.reconnect.validate()
    }
}

/// Top-level configuration for [`TradeStationClient`](crate::TradeStationClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub environment: Environment,
    pub auth: AuthConfig,
    pub stream: StreamConfig,
    /// Overrides the environment's base URL (proxies, test servers)
    pub api_base_url: Option<String>,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            environment: Environment::default(),
            auth,
            stream: StreamConfig::default(),
            api_base_url: None,
            user_agent: format!("tradestation-rs/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.api_base_url())
    }

    pub fn validate(&self) -> Result<()> {
        self.auth.validate()?;
        self.stream.validate()?;
        Url::parse(self.base_url())
            .map_err(|e| Error::Config(format!("invalid api base url: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_urls() {
        assert_eq!(Environment::Live.api_base_url(), LIVE_API_URL);
        assert_eq!(Environment::Demo.api_base_url(), DEMO_API_URL);
        assert_eq!(Environment::default(), Environment::Demo);
    }

    #[test]
    fn test_auth_config_defaults() {
        let config = AuthConfig::new("client", "secret");
        assert!(config.validate().is_ok());
        assert_eq!(
            config.scope_string(),
            "openid profile offline_access MarketData ReadAccount Trade"
        );
        assert_eq!(
            config.redirect_uri().as_deref(),
            Some("http://localhost:31022/")
        );
        assert_eq!(config.refresh_margin, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = AuthConfig::new("", "secret").validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = AuthConfig::new("client", "  ").validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_grant_specific_validation() {
        let config = AuthConfig::new("client", "secret")
            .with_grant(GrantMode::AuthorizationCode { redirect_port: 0 });
        assert!(config.validate().is_err());

        let config = AuthConfig::new("client", "secret")
            .with_grant(GrantMode::RefreshToken(SecretString::from(String::new())));
        assert!(config.validate().is_err());

        let config = AuthConfig::new("client", "secret").with_grant(GrantMode::ClientCredentials);
        assert!(config.validate().is_ok());
        assert!(config.redirect_uri().is_none());
    }

    #[test]
    fn test_client_config_base_url_override() {
        let config = ClientConfig::new(AuthConfig::new("client", "secret"))
            .with_environment(Environment::Live);
        assert_eq!(config.base_url(), LIVE_API_URL);

        let config = config.with_api_base_url("http://127.0.0.1:8080/");
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_stream_config_validation() {
        assert!(StreamConfig::default().validate().is_ok());

        let config = StreamConfig {
            heartbeat_timeout: Duration::ZERO,
            ..StreamConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
