use std::fmt;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::token::TokenResponse;
use crate::error::AuthError;

/// The grant presented to the token endpoint
#[derive(Clone)]
pub enum Grant {
    AuthorizationCode {
        code: String,
        redirect_uri: String,
        code_verifier: Option<String>,
    },
    RefreshToken(SecretString),
    ClientCredentials {
        scope: String,
        audience: String,
    },
}

impl Grant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken(_) => "refresh_token",
            Grant::ClientCredentials { .. } => "client_credentials",
        }
    }
}

/// One call to the token endpoint
#[derive(Clone)]
pub struct TokenRequest {
    pub client_id: String,
    pub client_secret: SecretString,
    pub grant: Grant,
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::AuthorizationCode {
                redirect_uri,
                code_verifier,
                ..
            } => f
                .debug_struct("AuthorizationCode")
                .field("code", &"[REDACTED]")
                .field("redirect_uri", redirect_uri)
                .field("pkce", &code_verifier.is_some())
                .finish(),
            Grant::RefreshToken(_) => f
                .debug_tuple("RefreshToken")
                .field(&"[REDACTED]")
                .finish(),
            Grant::ClientCredentials { scope, audience } => f
                .debug_struct("ClientCredentials")
                .field("scope", scope)
                .field("audience", audience)
                .finish(),
        }
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("client_id", &self.client_id)
            .field("grant", &self.grant)
            .finish_non_exhaustive()
    }
}

impl TokenRequest {
    /// Form fields for an `application/x-www-form-urlencoded` body
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", self.grant.grant_type().to_string()),
            ("client_id", self.client_id.clone()),
            (
                "client_secret",
                self.client_secret.expose_secret().to_string(),
            ),
        ];
        match &self.grant {
            Grant::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                form.push(("code", code.clone()));
                form.push(("redirect_uri", redirect_uri.clone()));
                if let Some(verifier) = code_verifier {
                    form.push(("code_verifier", verifier.clone()));
                }
            }
            Grant::RefreshToken(token) => {
                form.push(("refresh_token", token.expose_secret().to_string()));
            }
            Grant::ClientCredentials { scope, audience } => {
                form.push(("scope", scope.clone()));
                form.push(("audience", audience.clone()));
            }
        }
        form
    }
}

/// The authorization server's token endpoint.
///
/// The token manager talks to the server only through this trait, which
/// keeps the lifecycle logic testable without a network.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange(&self, request: &TokenRequest) -> Result<TokenResponse, AuthError>;
}

/// OAuth error body, `{"error": "...", "error_description": "..."}`
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`TokenEndpoint`] backed by an HTTP form post
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
    token_url: String,
}

impl HttpTokenEndpoint {
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange(&self, request: &TokenRequest) -> Result<TokenResponse, AuthError> {
        debug!(
            event = "token_exchange",
            grant_type = request.grant.grant_type(),
            url = %self.token_url
        );
        let response = self
            .http
            .post(&self.token_url)
            .form(&request.form())
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| AuthError::Transport(format!("invalid token response: {}", e)));
        }
        Err(rejection(status.as_u16(), &body))
    }
}

/// Interpret a non-2xx token endpoint response.
///
/// Throttling, request timeouts and server errors are transport failures;
/// only a real rejection of the grant is `Rejected`.
fn rejection(status: u16, body: &str) -> AuthError {
    if status == 408 || status == 429 || status >= 500 {
        return AuthError::Transport(format!("token endpoint returned {}", status));
    }
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(parsed) => AuthError::Rejected {
            status,
            error: parsed.error,
            description: parsed.error_description,
        },
        Err(_) => AuthError::Rejected {
            status,
            error: "unknown_error".to_string(),
            description: (!body.trim().is_empty()).then(|| body.trim().to_string()),
        },
    }
}
