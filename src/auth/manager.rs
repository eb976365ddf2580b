use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::authorize::{authorize_url, random_token, AuthorizationPrompt, LoopbackPrompt, Pkce};
use super::endpoint::{Grant, HttpTokenEndpoint, TokenEndpoint, TokenRequest};
use super::token::{Token, TokenStore};
use crate::config::{AuthConfig, GrantMode, DEFAULT_REDIRECT_PORT};
use crate::error::{AuthError, Error, Result};

type AuthResult<T> = std::result::Result<T, AuthError>;

/// A renewal every concurrent caller awaits
type Renewal = Shared<BoxFuture<'static, AuthResult<Token>>>;

struct Inner {
    config: AuthConfig,
    endpoint: Arc<dyn TokenEndpoint>,
    prompt: Arc<dyn AuthorizationPrompt>,
    store: Mutex<TokenStore>,
    in_flight: Mutex<Option<(u64, Renewal)>>,
    renewals: AtomicU64,
    closed: AtomicBool,
}

/// Owns the OAuth token and keeps it valid.
///
/// `TokenManager` is a cheap handle: clones share the same token, so REST
/// callers and any number of [`StreamSession`](crate::stream::StreamSession)s
/// can hold one each. Whenever the held token is inside its safety margin,
/// the first caller starts a renewal and every other caller awaits that same
/// renewal, so concurrent demand results in exactly one request to the token
/// endpoint and all callers see the same outcome.
///
/// Tokens live in memory only and die with the manager (or [`close`](Self::close)).
///
/// # Example
///
/// ```no_run
/// use tradestation_rs::auth::TokenManager;
/// use tradestation_rs::config::{AuthConfig, GrantMode};
///
/// # async fn run() -> tradestation_rs::Result<()> {
/// let config = AuthConfig::new("client-id", "client-secret")
///     .with_grant(GrantMode::ClientCredentials);
/// let tokens = TokenManager::new(config)?;
///
/// let token = tokens.get_valid_token().await?;
/// println!("token valid until {:?}", token.expires_at());
/// tokens.close();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    /// Create a manager that talks to the configured token endpoint over HTTP
    /// and, for the authorization-code grant, listens for the redirect on
    /// localhost.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = crate::http::build_client(crate::http::DEFAULT_USER_AGENT)?;
        Self::with_http_client(config, http)
    }

    /// Like [`new`](Self::new) but reuses an existing HTTP client
    pub fn with_http_client(config: AuthConfig, http: reqwest::Client) -> Result<Self> {
        let endpoint = Arc::new(HttpTokenEndpoint::new(http, config.token_url.clone()));
        Self::with_endpoint(config, endpoint)
    }

    /// Create a manager with a custom token endpoint
    pub fn with_endpoint(config: AuthConfig, endpoint: Arc<dyn TokenEndpoint>) -> Result<Self> {
        let port = match config.grant {
            GrantMode::AuthorizationCode { redirect_port } => redirect_port,
            _ => DEFAULT_REDIRECT_PORT,
        };
        Self::with_parts(config, endpoint, Arc::new(LoopbackPrompt::new(port)))
    }

    /// Create a manager with a custom token endpoint and authorization prompt
    pub fn with_parts(
        config: AuthConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        prompt: Arc<dyn AuthorizationPrompt>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                prompt,
                store: Mutex::new(TokenStore::default()),
                in_flight: Mutex::new(None),
                renewals: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Return a valid token, performing the full OAuth exchange when none is
    /// held yet.
    ///
    /// For the authorization-code grant this waits for the user to approve
    /// access in the browser, bounded by the configured authorization timeout.
    pub async fn acquire(&self) -> Result<Token> {
        self.get_valid_token().await
    }

    /// Return the held token if it is outside the safety margin, otherwise
    /// renew it first.
    ///
    /// Renewal uses the refresh token when one is held and falls back to full
    /// authentication when the server rejects it.
    pub async fn get_valid_token(&self) -> Result<Token> {
        self.ensure_open()?;
        if let Some(token) = self.inner.store.lock().fresh(Instant::now()) {
            return Ok(token);
        }
        self.renewal(false).await
    }

    /// Exchange the refresh token for a new token now, whatever the state of
    /// the held one. Joins a renewal that is already in flight.
    pub async fn refresh(&self) -> Result<Token> {
        self.ensure_open()?;
        self.renewal(true).await
    }

    /// Mark `rejected` as unusable if it is still the held token.
    ///
    /// Used when the API answers 401 to a token that looked valid. Returns
    /// false if a newer token has already replaced it.
    pub fn invalidate(&self, rejected: &Token) -> bool {
        let expired = self
            .inner
            .store
            .lock()
            .expire_if_current(rejected, Instant::now());
        if expired {
            debug!(event = "token_invalidated");
        }
        expired
    }

    /// Snapshot of the held token, without any network activity
    pub fn current(&self) -> Option<Token> {
        self.inner.store.lock().current()
    }

    /// Drop the held token; every later call fails with [`AuthError::Closed`].
    /// Calling it again has no effect.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.store.lock().invalidate();
            self.inner.in_flight.lock().take();
            info!(event = "token_manager_closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Auth(AuthError::Closed));
        }
        Ok(())
    }

    /// Join the in-flight renewal or start one.
    ///
    /// The renewal runs as its own task so that it completes (and clears the
    /// slot) even if the caller that started it is cancelled.
    async fn renewal(&self, force: bool) -> Result<Token> {
        let renewal = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some((_, renewal)) => renewal.clone(),
                None => {
                    let id = self.inner.renewals.fetch_add(1, Ordering::Relaxed);
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move {
                        let outcome = renew(&inner, force).await;
                        inner.finish_renewal(id);
                        outcome
                    });
                    let renewal = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(AuthError::Transport(format!("token renewal aborted: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    *slot = Some((id, renewal.clone()));
                    renewal
                }
            }
        };
        renewal.await.map_err(Error::Auth)
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("client_id", &self.inner.config.client_id)
            .field("token", &self.current())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn renew(inner: &Inner, force: bool) -> AuthResult<Token> {
    let refresh_token = {
        let store = inner.store.lock();
        if !force {
            if let Some(token) = store.fresh(Instant::now()) {
                return Ok(token);
            }
        }
        store.refresh_token()
    };

    if let Some(refresh_token) = refresh_token {
        match inner.exchange(Grant::RefreshToken(refresh_token)).await {
            Ok(token) => {
                info!(event = "token_refreshed", lifetime_secs = token.lifetime().as_secs());
                return Ok(token);
            }
            Err(err) if err.needs_reauthentication() => {
                warn!(event = "refresh_rejected", error = %err, "falling back to full authentication");
            }
            Err(err) => {
                warn!(event = "refresh_failed", error = %err);
                return Err(err);
            }
        }
    }

    match inner.authenticate().await {
        Ok(token) => {
            info!(event = "token_acquired", lifetime_secs = token.lifetime().as_secs());
            Ok(token)
        }
        Err(err) => {
            warn!(event = "authentication_failed", error = %err);
            inner.store.lock().invalidate();
            Err(err)
        }
    }
}

impl Inner {
    async fn authenticate(&self) -> AuthResult<Token> {
        let grant = match &self.config.grant {
            GrantMode::ClientCredentials => Grant::ClientCredentials {
                scope: self.config.scope_string(),
                audience: self.config.audience.clone(),
            },
            GrantMode::RefreshToken(seed) => Grant::RefreshToken(seed.clone()),
            GrantMode::AuthorizationCode { .. } => self.authorize_interactively().await?,
        };
        self.exchange(grant).await
    }

    async fn authorize_interactively(&self) -> AuthResult<Grant> {
        let redirect_uri = self.config.redirect_uri().unwrap_or_default();
        let state = random_token(16);
        let pkce = self.config.use_pkce.then(Pkce::generate);
        let url = authorize_url(&self.config, &redirect_uri, &state, pkce.as_ref())
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let callback = timeout(self.config.authorization_timeout, self.prompt.authorize(&url))
            .await
            .map_err(|_| AuthError::TimedOut)??;
        if callback.state.as_deref() != Some(state.as_str()) {
            return Err(AuthError::StateMismatch);
        }

        Ok(Grant::AuthorizationCode {
            code: callback.code,
            redirect_uri,
            code_verifier: pkce.map(|p| p.verifier().to_string()),
        })
    }

    /// Call the token endpoint and install the resulting token
    async fn exchange(&self, grant: Grant) -> AuthResult<Token> {
        let previous_refresh = match &grant {
            Grant::RefreshToken(token) => Some(token.clone()),
            _ => None,
        };
        let request = TokenRequest {
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            grant,
        };

        let response = timeout(self.config.exchange_timeout, self.endpoint.exchange(&request))
            .await
            .map_err(|_| AuthError::TimedOut)??;

        let now = Instant::now();
        let token = Token::from_response(
            response,
            previous_refresh,
            self.config.refresh_margin,
            now,
        );
        if !token.is_usable_at(now) {
            warn!(
                event = "token_lifetime_within_margin",
                lifetime_secs = token.lifetime().as_secs(),
                margin_secs = self.config.refresh_margin.as_secs(),
            );
        }

        if self.closed.load(Ordering::SeqCst) {
            return Err(AuthError::Closed);
        }
        self.store.lock().install(token.clone());
        Ok(token)
    }

    fn finish_renewal(&self, id: u64) {
        let mut slot = self.in_flight.lock();
        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
            slot.take();
        }
    }
}
