use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};

use crate::{ApiError, Result};

/// Fully resolved request handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

/// Successful (2xx) response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Executes one HTTP exchange.
///
/// Implementations report non-2xx statuses as [`ApiError::Http`], timeouts as
/// [`ApiError::Timeout`] and any other no-response failure as
/// [`ApiError::Transport`]. Dropping the returned future must abort the call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: TransportRequest) -> Result<Response> {
        (**self).send(request).await
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response> {
        let headers = to_header_map(&request.headers)?;
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(headers)
            .timeout(request.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = response.text().await.map_err(map_reqwest_error);

        into_response(status.as_u16(), headers, body)
    }
}

/// A non-2xx status is an [`ApiError::Http`] even when its body could not be read.
fn into_response(
    status: u16,
    headers: BTreeMap<String, String>,
    body: Result<String>,
) -> Result<Response> {
    if !(200..300).contains(&status) {
        return Err(ApiError::Http {
            status,
            body: body.unwrap_or_default(),
        });
    }

    Ok(Response {
        status,
        headers,
        body: body?,
    })
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Transport(Box::new(err))
    }
}

fn to_header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ApiError::Config(format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ApiError::Config(format!("invalid value for header '{name}'")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{into_response, to_header_map};
    use crate::{ApiError, ErrorKind};

    #[test]
    fn header_map_accepts_valid_pairs() {
        let headers = BTreeMap::from([
            ("Content-Type".to_owned(), "application/json".to_owned()),
            ("Authorization".to_owned(), "Bearer tok".to_owned()),
        ]);
        let map = to_header_map(&headers).expect("headers must convert");
        assert_eq!(map.get("authorization").unwrap(), "Bearer tok");
    }

    #[test]
    fn header_map_rejects_invalid_name() {
        let headers = BTreeMap::from([("bad header".to_owned(), "x".to_owned())]);
        assert!(matches!(to_header_map(&headers), Err(ApiError::Config(_))));
    }

    #[test]
    fn unreadable_error_body_keeps_status() {
        let err = into_response(404, BTreeMap::new(), Err(ApiError::Transport("reset".into())))
            .expect_err("404 must be an error");

        match &err {
            ApiError::Http { status, body } => {
                assert_eq!(*status, 404);
                assert!(body.is_empty());
            }
            other => panic!("expected http error, got {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Client);
    }

    #[test]
    fn unreadable_success_body_is_transport_error() {
        let err = into_response(200, BTreeMap::new(), Err(ApiError::Transport("reset".into())))
            .expect_err("body read failure must surface");
        assert!(matches!(err, ApiError::Transport(_)));
    }
}
