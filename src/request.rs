use std::{collections::BTreeMap, time::Duration};

use reqwest::Method;
use serde::Serialize;

use crate::{ApiError, CancelToken, Result};

/// Per-call overrides accepted by the convenience verbs.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    /// Sent as `Authorization: Bearer <token>`, taking precedence over defaults.
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel(mut self, cancel: &CancelToken) -> Self {
        self.cancel = Some(cancel.clone());
        self
    }
}

/// A single outbound call: method, path, optional JSON body and overrides.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) options: RequestOptions,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serializes `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::Encode(format!("invalid request body: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.header(name, value);
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.options = self.options.token(token);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.timeout(timeout);
        self
    }

    pub fn cancel(mut self, cancel: &CancelToken) -> Self {
        self.options = self.options.cancel(cancel);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }
}

/// Joins a base address and a request path.
///
/// Absolute `http(s)://` paths are returned unchanged.
pub(crate) fn join_url(base_url: Option<&str>, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    match base_url {
        Some(base) if !base.is_empty() => {
            let base = base.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            if path.is_empty() {
                base.to_owned()
            } else {
                format!("{base}/{path}")
            }
        }
        _ => path.to_owned(),
    }
}
