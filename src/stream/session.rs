use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::Stream;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::dispatch::EventDispatcher;
use super::event::{ErrorFrame, EventKind, StreamEvent};
use super::frame::{Frame, FrameDecoder};
use super::reconnect::ExponentialBackoff;
use super::subscription::Subscription;
use super::transport::{Connection, Connector};
use crate::auth::{Token, TokenManager};
use crate::config::StreamConfig;
use crate::error::{AuthError, Error, Result};

/// Lifecycle of a [`StreamSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    /// Terminal
    Closed,
}

/// One subscription over one connection, reconnected as needed.
///
/// Events are pulled with [`next`](Self::next). The session reads from the
/// connection only when asked for an event, so a slow consumer slows the
/// read loop instead of growing a queue. Disconnects and stalls are
/// recovered transparently; the sequence ends with a single `Err` when
/// recovery is exhausted or impossible, and yields `None` afterwards.
///
/// Dropping the session (or the stream from [`into_stream`](Self::into_stream))
/// closes the connection.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tradestation_rs::auth::TokenManager;
/// use tradestation_rs::config::{AuthConfig, StreamConfig, DEMO_API_URL};
/// use tradestation_rs::stream::{BarUnit, HttpConnector, StreamSession, Subscription};
///
/// # async fn run() -> tradestation_rs::Result<()> {
/// let tokens = TokenManager::new(AuthConfig::new("client-id", "client-secret"))?;
/// let connector = Arc::new(HttpConnector::new(reqwest::Client::new(), DEMO_API_URL));
///
/// let mut session = StreamSession::open(
///     Subscription::bars("MSFT", 1, BarUnit::Minute),
///     tokens,
///     connector,
///     StreamConfig::default(),
/// )
/// .await?;
///
/// while let Some(event) = session.next().await {
///     println!("{:?}", event?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamSession {
    subscription: Subscription,
    tokens: TokenManager,
    connector: Arc<dyn Connector>,
    config: StreamConfig,
    state: ConnectionState,
    connection: Option<Box<dyn Connection>>,
    decoder: FrameDecoder,
    dispatcher: EventDispatcher,
    backoff: ExponentialBackoff,
    last_frame_at: Instant,
    reconnects: u64,
    go_away: bool,
    skip_next_delay: bool,
    disconnect_reason: Option<String>,
}

impl StreamSession {
    /// Validate the subscription and open the first connection.
    ///
    /// Fails with [`Error::Connection`] when no connection could be made
    /// within the reconnect budget, with [`Error::Auth`] when the token is
    /// rejected even after a refresh, and with the server's error for other
    /// non-retryable responses.
    pub async fn open(
        subscription: Subscription,
        tokens: TokenManager,
        connector: Arc<dyn Connector>,
        config: StreamConfig,
    ) -> Result<Self> {
        subscription.validate()?;
        config.validate()?;

        let mut session = Self {
            dispatcher: EventDispatcher::new(subscription.kind()),
            decoder: FrameDecoder::new(config.max_frame_len),
            backoff: ExponentialBackoff::new(&config.reconnect),
            subscription,
            tokens,
            connector,
            config,
            state: ConnectionState::Connecting,
            connection: None,
            last_frame_at: Instant::now(),
            reconnects: 0,
            go_away: false,
            skip_next_delay: true,
            disconnect_reason: None,
        };

        match session.connect().await {
            Ok(()) => Ok(session),
            Err(Error::ReconnectFailed {
                attempts,
                last_error,
            }) => Err(Error::Connection(format!(
                "could not open {} after {} attempts: {}",
                session.subscription, attempts, last_error
            ))),
            Err(e) => Err(e),
        }
    }

    /// Next event of the stream.
    ///
    /// `Some(Err(_))` is terminal: the session is closed and every later
    /// call returns `None`.
    pub async fn next(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            match self.state {
                ConnectionState::Closed => return None,
                ConnectionState::Connecting | ConnectionState::Reconnecting => {
                    if let Err(e) = self.connect().await {
                        warn!(
                            event = "stream_failed",
                            subscription = %self.subscription,
                            error = %e
                        );
                        self.close();
                        return Some(Err(e));
                    }
                    continue;
                }
                ConnectionState::Open => {}
            }

            if let Some(frame) = self.decoder.next_frame() {
                self.last_frame_at = Instant::now();
                let event = self.classify(frame);
                if event.is_go_away() {
                    info!(event = "stream_go_away", subscription = %self.subscription);
                    self.go_away = true;
                }
                return Some(Ok(event));
            }

            if self.go_away {
                self.skip_next_delay = true;
                self.disconnect("server sent GoAway");
                continue;
            }

            let Some(connection) = self.connection.as_mut() else {
                self.disconnect("connection missing");
                continue;
            };
            let deadline = self.last_frame_at + self.config.heartbeat_timeout;
            let read = timeout_at(deadline, connection.read_chunk()).await;
            match read {
                Ok(Ok(Some(chunk))) => self.decoder.push(&chunk),
                Ok(Ok(None)) => self.disconnect("stream ended by server"),
                Ok(Err(e)) => self.disconnect(&e.to_string()),
                Err(_) => {
                    warn!(
                        event = "stream_stalled",
                        subscription = %self.subscription,
                        timeout_secs = self.config.heartbeat_timeout.as_secs_f64(),
                    );
                    self.disconnect("no frame within heartbeat timeout");
                }
            }
        }
    }

    /// Release the connection and end the sequence. Safe to call any number
    /// of times.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.decoder.clear();
        self.state = ConnectionState::Closed;
        info!(
            event = "stream_closed",
            subscription = %self.subscription,
            reconnects = self.reconnects
        );
    }

    /// Adapt the session into a [`Stream`]; dropping the stream closes it
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent>> + Send {
        futures_util::stream::unfold(self, |mut session| async move {
            session.next().await.map(|item| (item, session))
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Successful reconnects since the session was opened
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    fn classify(&self, frame: Frame) -> StreamEvent {
        match frame {
            Frame::Text(text) => self.dispatcher.classify_frame(&text, Utc::now()),
            Frame::Oversized { len, head } => StreamEvent::new(
                EventKind::Error(ErrorFrame::oversized(len, self.config.max_frame_len, head)),
                Utc::now(),
            ),
            Frame::Undecodable { raw, reason } => StreamEvent::new(
                EventKind::Error(ErrorFrame::parse_failure(raw, reason)),
                Utc::now(),
            ),
        }
    }

    /// Drop the current connection and schedule a reconnect
    fn disconnect(&mut self, reason: &str) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.decoder.clear();
        self.go_away = false;
        self.state = ConnectionState::Reconnecting;
        self.disconnect_reason = Some(reason.to_string());
        info!(
            event = "stream_disconnected",
            subscription = %self.subscription,
            reason
        );
    }

    /// Connect, retrying transient failures with backoff until the attempt
    /// budget is spent
    async fn connect(&mut self) -> Result<()> {
        let max_attempts = self.config.reconnect.max_attempts;
        let mut attempts = 0u32;
        let mut auth_retries = 0u32;
        let mut delay = !std::mem::take(&mut self.skip_next_delay);
        let mut last_error = self.disconnect_reason.take().unwrap_or_default();

        loop {
            if delay {
                let wait = self.backoff.next_delay();
                info!(
                    event = "stream_reconnect_wait",
                    subscription = %self.subscription,
                    attempt = attempts + 1,
                    delay_ms = wait.as_millis() as u64,
                    last_error = %last_error
                );
                sleep(wait).await;
            }
            delay = true;

            let token = match self.tokens.get_valid_token().await {
                Ok(token) => token,
                Err(Error::Auth(AuthError::Transport(msg))) => {
                    attempts += 1;
                    last_error = format!("token endpoint unreachable: {}", msg);
                    self.check_budget(attempts, max_attempts, &last_error)?;
                    continue;
                }
                Err(Error::Auth(AuthError::TimedOut)) => {
                    attempts += 1;
                    last_error = AuthError::TimedOut.to_string();
                    self.check_budget(attempts, max_attempts, &last_error)?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let opened = open_connection(
                self.connector.as_ref(),
                &self.subscription,
                self.config.connect_timeout,
                &token,
            )
            .await;
            match opened {
                Ok(connection) => {
                    self.install(connection);
                    return Ok(());
                }
                Err(Error::Auth(AuthError::Rejected { status: 401, .. }))
                    if auth_retries < self.config.max_auth_retries =>
                {
                    auth_retries += 1;
                    debug!(event = "stream_token_rejected", subscription = %self.subscription);
                    self.tokens.invalidate(&token);
                    delay = false;
                }
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    warn!(
                        event = "stream_connect_failed",
                        subscription = %self.subscription,
                        attempt = attempts,
                        error = %e
                    );
                    last_error = e.to_string();
                    self.check_budget(attempts, max_attempts, &last_error)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn check_budget(&self, attempts: u32, max_attempts: u32, last_error: &str) -> Result<()> {
        if attempts >= max_attempts {
            warn!(
                event = "stream_reconnect_exhausted",
                subscription = %self.subscription,
                attempts
            );
            return Err(Error::ReconnectFailed {
                attempts,
                last_error: last_error.to_string(),
            });
        }
        Ok(())
    }

    fn install(&mut self, connection: Box<dyn Connection>) {
        if self.state == ConnectionState::Reconnecting {
            self.reconnects += 1;
        }
        self.connection = Some(connection);
        self.decoder.clear();
        self.backoff.reset();
        self.last_frame_at = Instant::now();
        self.state = ConnectionState::Open;
        info!(
            event = "stream_open",
            subscription = %self.subscription,
            reconnects = self.reconnects
        );
    }
}

/// One connect attempt bounded by `connect_timeout`. Borrows only the
/// `Sync` parts of a session; `Connection` is not `Sync`.
async fn open_connection(
    connector: &dyn Connector,
    subscription: &Subscription,
    connect_timeout: Duration,
    token: &Token,
) -> Result<Box<dyn Connection>> {
    timeout(connect_timeout, connector.connect(subscription, token))
        .await
        .map_err(|_| {
            Error::Connection(format!("connect timed out after {:?}", connect_timeout))
        })?
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("subscription", &self.subscription)
            .field("state", &self.state)
            .field("reconnects", &self.reconnects)
            .finish()
    }
}
