//! Where each connection attempt gets its URL, headers and cookies from.
//!
//! Invites are single-use, so a worker that must be re-admitted after a
//! disconnect needs fresh credentials per attempt. A [`ConnectSource`] is
//! asked for a new [`ConnectTarget`] before every attempt; a plain
//! [`ClientConfig`] is the static source that always answers the same.

use crate::config::ClientConfig;
use crate::error::ClientError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header, HeaderName, HeaderValue};

/// URL, headers and cookies for one connection attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectTarget {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl ConnectTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Builds the upgrade request, folding cookies into one sorted
    /// `Cookie` header.
    pub fn to_request(&self) -> Result<Request, ClientError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidRequest(format!("header {name}: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        if !self.cookies.is_empty() {
            let mut pairs: Vec<String> = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            pairs.sort();
            let cookie = HeaderValue::from_str(&pairs.join("; "))
                .map_err(|e| ClientError::InvalidRequest(format!("cookie: {e}")))?;
            request.headers_mut().insert(header::COOKIE, cookie);
        }
        Ok(request)
    }
}

impl From<&ClientConfig> for ConnectTarget {
    fn from(config: &ClientConfig) -> Self {
        Self {
            url: config.url.clone(),
            headers: config.headers.clone(),
            cookies: config.cookies.clone(),
        }
    }
}

/// Supplies the target of every connection attempt.
///
/// An error skips the attempt; the worker waits its reconnect delay and
/// asks again.
#[async_trait]
pub trait ConnectSource: Send + Sync + 'static {
    async fn next_target(&self) -> Result<ConnectTarget, ClientError>;
}

#[async_trait]
impl ConnectSource for ClientConfig {
    async fn next_target(&self) -> Result<ConnectTarget, ClientError> {
        Ok(ConnectTarget::from(self))
    }
}

/// A [`ConnectSource`] backed by an async closure.
pub struct SourceFn<F>(F);

/// Wraps `f` so it is called once per connection attempt.
pub fn source_fn<F, Fut>(f: F) -> SourceFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ConnectTarget, ClientError>> + Send + 'static,
{
    SourceFn(f)
}

#[async_trait]
impl<F, Fut> ConnectSource for SourceFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ConnectTarget, ClientError>> + Send + 'static,
{
    async fn next_target(&self) -> Result<ConnectTarget, ClientError> {
        (self.0)().await
    }
}
