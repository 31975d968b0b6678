//! HTTP client utilities.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::sources::SourceError;

/// Shared HTTP client with a per-provider request budget
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpClient {
    /// Create a client with the crate user agent
    pub fn new(timeout: Duration, requests_per_second: u32) -> Result<Self, SourceError> {
        Self::with_user_agent(
            concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            timeout,
            requests_per_second,
        )
    }

    /// Create a client with a custom user agent
    pub fn with_user_agent(
        user_agent: &str,
        timeout: Duration,
        requests_per_second: u32,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(nonzero!(1u32));

        Ok(Self {
            client: Arc::new(client),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        })
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Wait for a request token, send, classify the status and decode the JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, SourceError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse JSON: {}", e)))
    }

    /// Wait for a request token, send, and turn non-success statuses into errors
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, SourceError> {
        self.limiter.until_ready().await;

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, retry_after, &body))
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> SourceError {
    let message = summarize(status, body);

    if status == StatusCode::TOO_MANY_REQUESTS {
        SourceError::RateLimited { retry_after }
    } else if status == StatusCode::NOT_FOUND {
        SourceError::NotFound(message)
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        SourceError::Timeout
    } else if status.is_server_error() {
        SourceError::ServerError {
            status: status.as_u16(),
            message,
        }
    } else {
        SourceError::BadRequest(message)
    }
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn summarize(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status.to_string();
    }
    let snippet: String = body.chars().take(200).collect();
    format!("{}: {}", status, snippet)
}
