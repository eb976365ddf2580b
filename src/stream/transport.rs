use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use tracing::debug;

use super::subscription::Subscription;
use crate::auth::Token;
use crate::error::{AuthError, Error, Result};
use crate::http::{bearer_headers, HttpClient};

/// Media type the streaming endpoints answer with
pub const STREAM_MEDIA_TYPE: &str = "application/vnd.tradestation.streams.v2+json";

/// One open streaming response
#[async_trait]
pub trait Connection: Send {
    /// Next chunk of the body; `Ok(None)` once the server has finished it
    async fn read_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Release the underlying connection. Must be safe to call repeatedly.
    fn close(&mut self);
}

/// Opens connections for a subscription.
///
/// A rejected token is reported as `Error::Auth(AuthError::Rejected { status: 401, .. })`
/// so the session can refresh and retry.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        subscription: &Subscription,
        token: &Token,
    ) -> Result<Box<dyn Connection>>;
}

/// [`Connector`] issuing one long-lived HTTP GET per connection
#[derive(Debug, Clone)]
pub struct HttpConnector {
    http: HttpClient,
    connect_timeout: Duration,
}

impl HttpConnector {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(http, base_url),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Bound for receiving the response headers
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        subscription: &Subscription,
        token: &Token,
    ) -> Result<Box<dyn Connection>> {
        let url = self.http.url(&subscription.path());
        debug!(event = "stream_connect", url = %url, subscription = %subscription);

        let request = self
            .http
            .inner()
            .get(&url)
            .query(&subscription.query())
            .headers(bearer_headers(&token.bearer(), STREAM_MEDIA_TYPE)?)
            .send();
        let response = tokio::time::timeout(self.connect_timeout, request)
            .await
            .map_err(|_| Error::Connection(format!("connect to {} timed out", url)))?
            .map_err(|e| Error::Connection(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(AuthError::Rejected {
                status: status.as_u16(),
                error: "unauthorized".to_string(),
                description: (!body.trim().is_empty()).then(|| body.trim().to_string()),
            }));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Box::new(HttpConnection {
            response: Some(response),
        }))
    }
}

/// Body of a streaming response; dropping the response closes the socket
#[derive(Debug)]
pub struct HttpConnection {
    response: Option<reqwest::Response>,
}

#[async_trait]
impl Connection for HttpConnection {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.response.as_mut() {
            Some(response) => response
                .chunk()
                .await
                .map_err(|e| Error::Connection(e.to_string())),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.response.take();
    }
}
