//! `storefront-http` is a resilient async HTTP client for the storefront's
//! product and user services.
//!
//! [`ApiClient`] wraps a [`Transport`] and adds:
//! - default base address, headers and timeout
//! - exponential backoff retries for network failures and 5xx responses
//! - a single credential refresh after HTTP 401 ([`RefreshAuth`])
//! - request/response interceptors
//! - cooperative cancellation ([`CancelToken`])
//!
//! [`CatalogClient`] specializes it with `FASTAPI_*` environment settings and
//! named operations.

mod auth;
mod cancel;
mod catalog;
mod client;
mod error;
mod interceptor;
mod options;
mod request;
mod transport;
mod types;

pub use auth::{OnAuthFailure, RefreshAuth};
pub use cancel::CancelToken;
pub use catalog::{CatalogClient, CatalogConfig};
pub use client::ApiClient;
pub use error::{ApiError, BoxError, ErrorKind};
pub use interceptor::{InterceptorId, RequestInterceptor, ResponseInterceptor};
pub use options::{ClientOptions, MIN_RETRY_BACKOFF};
pub use request::{ApiRequest, RequestOptions};
pub use reqwest::Method;
pub use transport::{ReqwestTransport, Response, Transport, TransportRequest};
pub use types::{LoginResponse, Product, User};

pub type Result<T> = std::result::Result<T, ApiError>;
