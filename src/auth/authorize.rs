//! Interactive authorization-code flow: authorize URL, PKCE and the local
//! redirect listener.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use reqwest::Url;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use warp::http::StatusCode;
use warp::path::FullPath;
use warp::Filter;

use crate::config::AuthConfig;
use crate::error::{AuthError, Error, Result};

const SUCCESS_PAGE: &str = "<!DOCTYPE html>
<html lang=\"en\">
<head>
<meta charset=\"UTF-8\">
<title>Authentication Successful</title>
<script>setTimeout(() => window.close(), 1000);</script>
</head>
<body style=\"display:flex;justify-content:center;align-items:center;height:100vh;font-family:Arial,sans-serif;font-size:24px;font-weight:bold\">
Authentication successful!
</body>
</html>
";

const MISSING_CODE: &str = "Error: No authorization code received";

/// PKCE verifier and its S256 challenge
#[derive(Clone)]
pub struct Pkce {
    verifier: String,
    challenge: String,
}

impl Pkce {
    /// Generate a fresh 256-bit verifier
    pub fn generate() -> Self {
        Self::from_verifier(random_token(32))
    }

    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }
}

impl fmt::Debug for Pkce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkce")
            .field("challenge", &self.challenge)
            .finish_non_exhaustive()
    }
}

/// URL-safe random string from `bytes` random bytes
pub(crate) fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(buf.as_mut_slice());
    URL_SAFE_NO_PAD.encode(buf)
}

/// Build the URL the user opens to grant access
pub fn authorize_url(
    config: &AuthConfig,
    redirect_uri: &str,
    state: &str,
    pkce: Option<&Pkce>,
) -> Result<Url> {
    let scope = config.scope_string();
    let mut params: Vec<(&str, &str)> = vec![
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("audience", config.audience.as_str()),
        ("redirect_uri", redirect_uri),
        ("scope", scope.as_str()),
        ("state", state),
    ];
    if let Some(pkce) = pkce {
        params.push(("code_challenge", pkce.challenge()));
        params.push(("code_challenge_method", "S256"));
    }
    Url::parse_with_params(&config.authorize_url, &params)
        .map_err(|e| Error::Config(format!("invalid authorize_url: {}", e)))
}

/// What the authorization server handed back through the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCallback {
    pub code: String,
    pub state: Option<String>,
}

/// Presents the authorize URL to the user and waits for the redirect.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    async fn authorize(
        &self,
        authorize_url: &Url,
    ) -> std::result::Result<AuthorizationCallback, AuthError>;
}

type UrlHandler = Arc<dyn Fn(&Url) + Send + Sync>;

/// Receives the redirect on `127.0.0.1:{port}`.
///
/// A warp server is bound for the duration of one authorization and serves
/// requests until one carries either a code or an error, then shuts down
/// gracefully.
#[derive(Clone)]
pub struct LoopbackPrompt {
    port: u16,
    on_url: Option<UrlHandler>,
}

impl LoopbackPrompt {
    pub fn new(port: u16) -> Self {
        Self { port, on_url: None }
    }

    /// Called with the authorize URL, e.g. to open a browser or print it
    pub fn with_url_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Url) + Send + Sync + 'static,
    {
        self.on_url = Some(Arc::new(handler));
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Debug for LoopbackPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackPrompt")
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AuthorizationPrompt for LoopbackPrompt {
    async fn authorize(
        &self,
        authorize_url: &Url,
    ) -> std::result::Result<AuthorizationCallback, AuthError> {
        let (redirect_tx, mut redirect_rx) = mpsc::unbounded_channel::<Redirect>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let route = warp::get()
            .and(warp::path::full())
            .and(warp::query::<HashMap<String, String>>())
            .map(move |path: FullPath, params: HashMap<String, String>| {
                debug!(event = "authorization_redirect", path = path.as_str());
                let redirect = parse_callback(&params);
                let reply = match &redirect {
                    Redirect::Code(_) => warp::reply::with_status(
                        warp::reply::html(SUCCESS_PAGE.to_string()),
                        StatusCode::OK,
                    ),
                    Redirect::Error(reason) => warp::reply::with_status(
                        warp::reply::html(escape_html(reason)),
                        StatusCode::BAD_REQUEST,
                    ),
                    Redirect::Missing => warp::reply::with_status(
                        warp::reply::html(MISSING_CODE.to_string()),
                        StatusCode::BAD_REQUEST,
                    ),
                };
                if redirect != Redirect::Missing {
                    let _ = redirect_tx.send(redirect);
                }
                reply
            });

        let (_addr, server) = warp::serve(route)
            .try_bind_with_graceful_shutdown(([127, 0, 0, 1], self.port), async move {
                let _ = shutdown_rx.await;
            })
            .map_err(|e| {
                AuthError::Transport(format!("cannot listen on port {}: {}", self.port, e))
            })?;

        info!(event = "authorization_required", url = %authorize_url, "open the URL to grant access");
        if let Some(handler) = &self.on_url {
            handler(authorize_url);
        }

        let wait = async move {
            let redirect = redirect_rx.recv().await;
            let _ = shutdown_tx.send(());
            redirect
        };
        let ((), redirect) = tokio::join!(server, wait);

        match redirect {
            Some(Redirect::Code(callback)) => Ok(callback),
            Some(Redirect::Error(reason)) => Err(AuthError::Denied(reason)),
            Some(Redirect::Missing) | None => Err(AuthError::Transport(
                "redirect listener stopped before a code arrived".to_string(),
            )),
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, PartialEq, Eq)]
enum Redirect {
    Code(AuthorizationCallback),
    Error(String),
    Missing,
}

/// Interpret the query parameters of a redirect
fn parse_callback(params: &HashMap<String, String>) -> Redirect {
    if let Some(error) = params.get("error") {
        return Redirect::Error(match params.get("error_description") {
            Some(description) => format!("{}: {}", error, description),
            None => error.clone(),
        });
    }
    match params.get("code") {
        Some(code) if !code.is_empty() => Redirect::Code(AuthorizationCallback {
            code: code.clone(),
            state: params.get("state").cloned(),
        }),
        _ => Redirect::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pkce_challenge_matches_rfc_example() {
        // RFC 7636 appendix B
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(
            pkce.challenge(),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_verifiers_differ() {
        let a = Pkce::generate();
        let b = Pkce::generate();
        assert_ne!(a.verifier(), b.verifier());
        assert_eq!(a.verifier().len(), 43);
    }

    #[test]
    fn test_authorize_url_parameters() {
        let config = AuthConfig::new("my-client", "secret");
        let pkce = Pkce::from_verifier("verifier");
        let url = authorize_url(&config, "http://localhost:31022/", "st4te", Some(&pkce)).unwrap();

        assert!(url.as_str().starts_with("https://signin.tradestation.com/authorize?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(get("response_type").as_deref(), Some("code"));
        assert_eq!(get("client_id").as_deref(), Some("my-client"));
        assert_eq!(get("redirect_uri").as_deref(), Some("http://localhost:31022/"));
        assert_eq!(get("state").as_deref(), Some("st4te"));
        assert_eq!(get("code_challenge").as_deref(), Some(pkce.challenge()));
        assert_eq!(get("code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(
            get("scope").as_deref(),
            Some("openid profile offline_access MarketData ReadAccount Trade")
        );
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_callback() {
        assert_eq!(
            parse_callback(&params(&[("code", "abc"), ("state", "xyz")])),
            Redirect::Code(AuthorizationCallback {
                code: "abc".to_string(),
                state: Some("xyz".to_string()),
            })
        );
        assert_eq!(
            parse_callback(&params(&[
                ("error", "access_denied"),
                ("error_description", "User cancelled"),
            ])),
            Redirect::Error("access_denied: User cancelled".to_string())
        );
        assert_eq!(parse_callback(&params(&[])), Redirect::Missing);
        assert_eq!(parse_callback(&params(&[("code", "")])), Redirect::Missing);
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// GET `target` on the loopback port, retrying until the server is up
    async fn redirect_to(port: u16, target: &str) -> reqwest::Response {
        let url = format!("http://127.0.0.1:{}{}", port, target);
        loop {
            match reqwest::get(&url).await {
                Ok(response) => return response,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    }

    #[tokio::test]
    async fn test_loopback_receives_redirect() {
        let port = free_port();
        let prompt = LoopbackPrompt::new(port);
        let url = Url::parse("https://signin.example.com/authorize").unwrap();
        let waiter = tokio::spawn(async move { prompt.authorize(&url).await });

        let stray = redirect_to(port, "/favicon.ico").await;
        assert_eq!(stray.status(), reqwest::StatusCode::BAD_REQUEST);

        let reply = redirect_to(port, "/?code=the-code&state=s1").await;
        assert_eq!(reply.status(), reqwest::StatusCode::OK);
        assert!(reply.text().await.unwrap().contains("Authentication successful!"));

        let callback = waiter.await.unwrap().unwrap();
        assert_eq!(callback.code, "the-code");
        assert_eq!(callback.state.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_loopback_reports_denied_consent() {
        let port = free_port();
        let prompt = LoopbackPrompt::new(port);
        let url = Url::parse("https://signin.example.com/authorize").unwrap();
        let waiter = tokio::spawn(async move { prompt.authorize(&url).await });

        let reply = redirect_to(port, "/?error=access_denied").await;
        assert_eq!(reply.status(), reqwest::StatusCode::BAD_REQUEST);

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err, AuthError::Denied("access_denied".to_string()));
    }
}
