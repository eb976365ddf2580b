#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use secrecy::ExposeSecret;

use tradestation_rs::auth::{
    AuthorizationCallback, AuthorizationPrompt, TokenEndpoint, TokenManager, TokenRequest,
    TokenResponse,
};
use tradestation_rs::config::{AuthConfig, GrantMode, StreamConfig};
use tradestation_rs::stream::{Connection, Connector, ReconnectConfig, Subscription};
use tradestation_rs::{AuthError, Error, Result, Token};

pub const BAR: &str = r#"{"TimeStamp":"2024-03-01T14:31:00Z","Open":"10","High":"11","Low":"9","Close":"10.5","TotalVolume":"1200","BarStatus":"Open"}"#;
pub const BAR_2: &str = r#"{"TimeStamp":"2024-03-01T14:32:00Z","Open":"10.5","High":"12","Low":"10","Close":"11","TotalVolume":"900","BarStatus":"Closed"}"#;

pub fn line(frame: &str) -> String {
    format!("{}\n", frame)
}

/// Token endpoint double: records every grant and answers from a script,
/// issuing `access-N`/`refresh-N` once the script is empty
pub struct FakeEndpoint {
    calls: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<std::result::Result<TokenResponse, AuthError>>>,
    issued: AtomicUsize,
    expires_in: u64,
    delay: Duration,
}

impl FakeEndpoint {
    pub fn new(expires_in: u64) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
            issued: AtomicUsize::new(0),
            expires_in,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, outcome: std::result::Result<TokenResponse, AuthError>) {
        self.scripted.lock().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, grant_type: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == grant_type).count()
    }
}

#[async_trait]
impl TokenEndpoint for FakeEndpoint {
    async fn exchange(
        &self,
        request: &TokenRequest,
    ) -> std::result::Result<TokenResponse, AuthError> {
        self.calls.lock().push(request.grant.grant_type().to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(outcome) = self.scripted.lock().pop_front() {
            return outcome;
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(response(&format!("access-{}", n), Some(&format!("refresh-{}", n)), self.expires_in))
    }
}

pub fn response(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenResponse {
    TokenResponse {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_in: Some(expires_in),
        scope: Some("MarketData ReadAccount".to_string()),
        token_type: Some("Bearer".to_string()),
    }
}

pub fn rejected() -> AuthError {
    AuthError::Rejected {
        status: 403,
        error: "invalid_grant".to_string(),
        description: None,
    }
}

pub fn access(token: &Token) -> String {
    token.access_token().expose_secret().to_string()
}

pub fn client_credentials() -> AuthConfig {
    AuthConfig::new("client", "secret").with_grant(GrantMode::ClientCredentials)
}

pub fn manager(endpoint: &Arc<FakeEndpoint>) -> TokenManager {
    TokenManager::with_endpoint(client_credentials(), endpoint.clone()).expect("valid config")
}

/// Prompt double that answers the authorize URL with a fixed code, echoing
/// the request state unless told to tamper with it
pub struct FakePrompt {
    pub code: String,
    pub tamper_state: bool,
    pub seen_urls: Mutex<Vec<String>>,
}

impl FakePrompt {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            tamper_state: false,
            seen_urls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AuthorizationPrompt for FakePrompt {
    async fn authorize(
        &self,
        authorize_url: &reqwest::Url,
    ) -> std::result::Result<AuthorizationCallback, AuthError> {
        self.seen_urls.lock().push(authorize_url.to_string());
        let state = authorize_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned());
        Ok(AuthorizationCallback {
            code: self.code.clone(),
            state: if self.tamper_state {
                Some("forged".to_string())
            } else {
                state
            },
        })
    }
}

/// What one read of a scripted connection does
#[derive(Debug, Clone)]
pub enum Step {
    Chunk(String),
    Bytes(Vec<u8>),
    /// A chunk delivered after a pause
    After(Duration, String),
    /// Never completes; the session's heartbeat timeout must fire
    Stall,
    Eof,
    Fail,
}

pub fn chunk(text: impl Into<String>) -> Step {
    Step::Chunk(text.into())
}

/// Outcome of one connect call
#[derive(Debug, Clone)]
pub enum Attempt {
    Open(Vec<Step>),
    Unreachable,
    Unauthorized,
    NotFound,
}

#[derive(Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
}

/// Connector double replaying a script of attempts; once the script is
/// exhausted every connect opens a connection that stalls
pub struct ScriptedConnector {
    attempts: Mutex<VecDeque<Attempt>>,
    pub counters: Arc<Counters>,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Attempt>) -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(attempts.into()),
            counters: Arc::new(Counters::default()),
            tokens_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _subscription: &Subscription,
        token: &Token,
    ) -> Result<Box<dyn Connection>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().push(access(token));

        let attempt = self
            .attempts
            .lock()
            .pop_front()
            .unwrap_or(Attempt::Open(vec![Step::Stall]));
        match attempt {
            Attempt::Open(steps) => Ok(Box::new(ScriptedConnection {
                steps: steps.into(),
                counters: self.counters.clone(),
                closed: false,
            })),
            Attempt::Unreachable => Err(Error::Connection("connection refused".to_string())),
            Attempt::Unauthorized => Err(Error::Auth(AuthError::Rejected {
                status: 401,
                error: "unauthorized".to_string(),
                description: None,
            })),
            Attempt::NotFound => Err(Error::Api {
                status: 404,
                message: "no such symbol".to_string(),
            }),
        }
    }
}

pub struct ScriptedConnection {
    steps: VecDeque<Step>,
    counters: Arc<Counters>,
    closed: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front().unwrap_or(Step::Stall) {
            Step::Chunk(text) => Ok(Some(Bytes::from(text))),
            Step::Bytes(bytes) => Ok(Some(Bytes::from(bytes))),
            Step::After(pause, text) => {
                tokio::time::sleep(pause).await;
                Ok(Some(Bytes::from(text)))
            }
            Step::Eof => Ok(None),
            Step::Fail => Err(Error::Connection("connection reset by peer".to_string())),
            Step::Stall => std::future::pending().await,
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn stream_config(max_attempts: u32) -> StreamConfig {
    StreamConfig {
        heartbeat_timeout: Duration::from_secs(20),
        connect_timeout: Duration::from_secs(10),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        },
        max_auth_retries: 1,
        max_frame_len: 4096,
    }
}
