//! How requests reach the server.
//!
//! A [`Transport`] posts a [`WireRequest`] to `{route}/{alias}/{target}` and
//! returns the decoded [`WireResponse`]. Any response that decodes is a
//! success at this layer, including ones that carry validation errors or
//! exceptions; those are interpreted by the proxy.

use async_trait::async_trait;
use wired_common::{WireRequest, WireResponse};

use crate::error::ClientError;

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request` to `path` (already joined with the route).
    async fn send(&self, path: &str, request: &WireRequest) -> Result<WireResponse, ClientError>;
}

/// Transport backed by a plain function, for in-process servers and tests.
pub struct FnTransport<F> {
    handler: F,
}

impl<F> FnTransport<F>
where
    F: Fn(&str, &WireRequest) -> Result<WireResponse, ClientError> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(&str, &WireRequest) -> Result<WireResponse, ClientError> + Send + Sync + 'static,
{
    async fn send(&self, path: &str, request: &WireRequest) -> Result<WireResponse, ClientError> {
        (self.handler)(path, request)
    }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use super::*;

    /// JSON over HTTP POST.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        base_url: String,
    }

    impl HttpTransport {
        /// `base_url` is the origin the route is relative to, e.g. `http://localhost:3000`.
        ///
        /// Requests time out after 30 seconds. If that client cannot be built,
        /// a default client without the timeout is used instead.
        pub fn new(base_url: impl Into<String>) -> Self {
            let base_url = base_url.into();
            Self::with_timeout(base_url.clone(), Duration::from_secs(30)).unwrap_or_else(|err| {
                log::warn!("Falling back to a default HTTP client for {}: {}", base_url, err);
                Self::from_client(reqwest::Client::new(), base_url)
            })
        }

        pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ClientError::Transport(e.to_string()))?;

            Ok(Self::from_client(client, base_url))
        }

        /// Use a preconfigured client.
        pub fn from_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
            Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }
        }
    }

    #[async_trait]
    impl Transport for HttpTransport {
        async fn send(&self, path: &str, request: &WireRequest) -> Result<WireResponse, ClientError> {
            let url = format!("{}{}", self.base_url, path);

            let response = self
                .client
                .post(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .json(request)
                .send()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;

            response
                .json::<WireResponse>()
                .await
                .map_err(|e| ClientError::Decode(e.to_string()))
        }
    }

}
