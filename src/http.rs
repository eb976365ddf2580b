use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("tradestation-rs/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client.
///
/// Only connecting is bounded here. A whole-request timeout would cut
/// long-lived streaming responses, so streams rely on heartbeats instead.
pub(crate) fn build_client(user_agent: &str) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .map_err(Error::Http)
}

/// Thin wrapper around reqwest for JSON requests against one API host
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub(crate) fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn inner(&self) -> &Client {
        &self.client
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `path` with a bearer header and decode the JSON body
    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str, bearer: &str) -> Result<T> {
        let request = self
            .client
            .get(self.url(path))
            .headers(bearer_headers(bearer, "application/json")?);
        self.send(request).await
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

pub(crate) fn bearer_headers(bearer: &str, accept: &'static str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut value = HeaderValue::from_str(bearer)
        .map_err(|_| Error::Config("access token is not a valid header value".to_string()))?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    Ok(headers)
}

/// Turn a non-2xx response into [`Error::Api`]
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}
