use std::{str::FromStr, time::Duration};

use crate::{
    types::LoginRequest, ApiClient, ApiError, ApiRequest, ClientOptions, LoginResponse, Product,
    Result, User,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 300;

/// Connection settings for the product/user service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_backoff: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl CatalogConfig {
    /// Reads configuration from the process environment.
    ///
    /// Reads:
    /// - `FASTAPI_BASE_URL` — service address (default `http://localhost:8000`)
    /// - `FASTAPI_TIMEOUT` — request timeout in milliseconds (default 5000)
    /// - `FASTAPI_MAX_RETRIES` — retries for network and 5xx failures (default 3)
    /// - `FASTAPI_BACKOFF` — base backoff in milliseconds (default 300)
    ///
    /// Unset or blank variables fall back to the defaults; values that do not
    /// parse are a [`ApiError::Config`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            base_url: read("FASTAPI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            timeout: Duration::from_millis(parse_or(
                "FASTAPI_TIMEOUT",
                read("FASTAPI_TIMEOUT"),
                DEFAULT_TIMEOUT_MS,
            )?),
            max_retries: parse_or(
                "FASTAPI_MAX_RETRIES",
                read("FASTAPI_MAX_RETRIES"),
                DEFAULT_MAX_RETRIES,
            )?,
            retry_backoff: Duration::from_millis(parse_or(
                "FASTAPI_BACKOFF",
                read("FASTAPI_BACKOFF"),
                DEFAULT_BACKOFF_MS,
            )?),
        })
    }

    pub fn to_client_options(&self) -> ClientOptions {
        ClientOptions::new()
            .with_base_url(self.base_url.clone())
            .with_timeout(self.timeout)
            .with_max_retries(self.max_retries)
            .with_retry_backoff(self.retry_backoff)
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ApiError::Config(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
    }
}

/// Named operations against the product/user service.
///
/// All retry, backoff and refresh behavior comes from the wrapped [`ApiClient`].
#[derive(Clone, Debug)]
pub struct CatalogClient {
    api: ApiClient,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Self {
        Self {
            api: ApiClient::new(config.to_client_options()),
        }
    }

    /// Creates a client configured from `FASTAPI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(&CatalogConfig::from_env()?))
    }

    /// Wraps an existing client, e.g. one with refresh hooks or a custom transport.
    pub fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub async fn get_product(&self, product_id: i64, token: Option<&str>) -> Result<Product> {
        self.api
            .request(with_token(
                ApiRequest::get(format!("/products/{product_id}")),
                token,
            ))
            .await
    }

    pub async fn get_user(&self, user_id: i64, token: Option<&str>) -> Result<User> {
        self.api
            .request(with_token(ApiRequest::get(format!("/users/{user_id}")), token))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let request = ApiRequest::post("/users/login").json(&LoginRequest { email, password })?;
        self.api.request(request).await
    }

    /// Logs in and installs the returned token as the default bearer credential.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let login = self.login(email, password).await?;
        self.api.set_auth_token(Some(login.access_token.as_str()));

        #[cfg(feature = "tracing")]
        tracing::debug!("catalog client authenticated");

        Ok(login)
    }
}

fn with_token(request: ApiRequest, token: Option<&str>) -> ApiRequest {
    match token {
        Some(token) => request.token(token),
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::CatalogConfig;
    use crate::ApiError;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn missing_variables_use_defaults() {
        let config = CatalogConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CatalogConfig::default());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.timeout, Duration::from_millis(5_000));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(300));
    }

    #[test]
    fn variables_override_defaults() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("FASTAPI_BASE_URL", "http://users:8001"),
            ("FASTAPI_TIMEOUT", "1500"),
            ("FASTAPI_MAX_RETRIES", " 1 "),
            ("FASTAPI_BACKOFF", ""),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://users:8001");
        assert_eq!(config.timeout, Duration::from_millis(1_500));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_backoff, Duration::from_millis(300));
    }

    #[test]
    fn unparsable_number_is_config_error() {
        let err = CatalogConfig::from_lookup(lookup(&[("FASTAPI_MAX_RETRIES", "-2")]))
            .expect_err("negative retries must be rejected");
        match err {
            ApiError::Config(message) => assert!(message.contains("FASTAPI_MAX_RETRIES")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn options_carry_retry_settings() {
        let opts = CatalogConfig::default().to_client_options();
        assert_eq!(opts.base_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(opts.max_retries, 3);
        assert_eq!(opts.retry_backoff, Duration::from_millis(300));
    }
}
