use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::Instant;

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN: u64 = 1200;

/// Body of a successful token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// An OAuth access token together with its refresh token and expiry.
///
/// `expires_at` already has the refresh safety margin subtracted: a token is
/// usable strictly before it and must be refreshed from then on.
#[derive(Clone)]
pub struct Token {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    issued_at: DateTime<Utc>,
    lifetime: Duration,
    expires_at: Instant,
    scope: BTreeSet<String>,
}

impl Token {
    /// Build a token from an endpoint response received at `now`.
    ///
    /// When the response carries no refresh token the previous one is kept,
    /// since refresh tokens are not rotated on every exchange.
    pub(crate) fn from_response(
        response: TokenResponse,
        previous_refresh: Option<SecretString>,
        margin: Duration,
        now: Instant,
    ) -> Self {
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));
        let scope = response
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Self {
            access_token: SecretString::from(response.access_token),
            refresh_token: response
                .refresh_token
                .map(SecretString::from)
                .or(previous_refresh),
            issued_at: Utc::now(),
            lifetime,
            expires_at: now + lifetime.saturating_sub(margin),
            scope,
        }
    }

    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&SecretString> {
        self.refresh_token.as_ref()
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }

    /// Wall-clock time the token was issued
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Lifetime reported by the server, before the safety margin
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Instant from which the token must no longer be handed out
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn scope(&self) -> &BTreeSet<String> {
        &self.scope
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.contains(scope)
    }

    pub fn is_usable_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Two tokens are the same grant when their access tokens match
    pub fn same_access_token(&self, other: &Token) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("issued_at", &self.issued_at)
            .field("lifetime", &self.lifetime)
            .field("scope", &self.scope)
            .finish()
    }
}

/// The single token slot owned by a token manager.
#[derive(Debug, Default)]
pub(crate) struct TokenStore {
    current: Option<Token>,
}

impl TokenStore {
    pub(crate) fn current(&self) -> Option<Token> {
        self.current.clone()
    }

    /// The held token, if it is still outside the safety margin at `now`
    pub(crate) fn fresh(&self, now: Instant) -> Option<Token> {
        self.current
            .as_ref()
            .filter(|token| token.is_usable_at(now))
            .cloned()
    }

    pub(crate) fn refresh_token(&self) -> Option<SecretString> {
        self.current
            .as_ref()
            .and_then(|token| token.refresh_token.clone())
    }

    pub(crate) fn install(&mut self, token: Token) {
        self.current = Some(token);
    }

    /// Force the held token into the refresh window if it is `rejected`.
    ///
    /// Returns false when a different token has been installed meanwhile.
    pub(crate) fn expire_if_current(&mut self, rejected: &Token, now: Instant) -> bool {
        match self.current.as_mut() {
            Some(token) if token.same_access_token(rejected) => {
                token.expires_at = token.expires_at.min(now);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access: &str, refresh: Option<&str>, expires_in: Option<u64>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in,
            scope: Some("openid MarketData  Trade".to_string()),
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_expiry_includes_margin() {
        let now = Instant::now();
        let token = Token::from_response(
            response("a", Some("r"), Some(1800)),
            None,
            Duration::from_secs(60),
            now,
        );

        assert_eq!(token.expires_at(), now + Duration::from_secs(1740));
        assert!(token.is_usable_at(now + Duration::from_secs(1739)));
        assert!(!token.is_usable_at(now + Duration::from_secs(1740)));
        assert!(!token.is_usable_at(now + Duration::from_secs(1750)));
    }

    #[test]
    fn test_defaults_and_scope_parsing() {
        let now = Instant::now();
        let token = Token::from_response(response("a", None, None), None, Duration::ZERO, now);

        assert_eq!(token.lifetime(), Duration::from_secs(DEFAULT_EXPIRES_IN));
        assert!(token.has_scope("MarketData"));
        assert!(token.has_scope("Trade"));
        assert_eq!(token.scope().len(), 3);
        assert!(token.refresh_token().is_none());
    }

    #[test]
    fn test_margin_longer_than_lifetime_is_immediately_stale() {
        let now = Instant::now();
        let token = Token::from_response(
            response("a", None, Some(30)),
            None,
            Duration::from_secs(60),
            now,
        );
        assert!(!token.is_usable_at(now));
    }

    #[test]
    fn test_previous_refresh_token_is_kept() {
        let now = Instant::now();
        let token = Token::from_response(
            response("b", None, Some(1200)),
            Some(SecretString::from("old-refresh".to_string())),
            Duration::from_secs(60),
            now,
        );
        assert_eq!(
            token.refresh_token().map(|t| t.expose_secret().to_string()),
            Some("old-refresh".to_string())
        );
    }

    #[test]
    fn test_store_expire_only_matching_token() {
        let now = Instant::now();
        let first = Token::from_response(response("a", None, Some(1200)), None, Duration::ZERO, now);
        let second =
            Token::from_response(response("b", None, Some(1200)), None, Duration::ZERO, now);

        let mut store = TokenStore::default();
        store.install(second.clone());
        assert!(!store.expire_if_current(&first, now));
        assert!(store.fresh(now).is_some());

        assert!(store.expire_if_current(&second, now));
        assert!(store.fresh(now).is_none());
        assert!(store.current().is_some());

        store.invalidate();
        assert!(store.current().is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = Token::from_response(
            response("super-secret", Some("r"), Some(10)),
            None,
            Duration::ZERO,
            Instant::now(),
        );
        let rendered = format!("{:?}", token);
        assert!(!rendered.contains("super-secret"));
        assert_eq!(token.bearer(), "Bearer super-secret");
    }
}
