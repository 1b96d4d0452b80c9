use std::{collections::BTreeMap, fmt, future::Future, sync::Arc, time::Duration};

use crate::{
    auth::{OnAuthFailure, RefreshFn},
    ApiError, BoxError, RefreshAuth,
};

/// Lower bound applied to the base retry backoff.
pub const MIN_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Configures base address, default headers, timeout, retry and auth-refresh behavior.
#[derive(Clone)]
pub struct ClientOptions {
    /// Base address prepended to relative request paths.
    pub base_url: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Headers sent with every request. `None` means `Content-Type: application/json`.
    pub headers: Option<BTreeMap<String, String>>,
    /// Maximum number of retries after the initial attempt for network and 5xx failures.
    pub max_retries: usize,
    /// Base retry backoff (exponential strategy).
    pub retry_backoff: Duration,
    /// Invoked once per request when the server answers 401.
    pub refresh_auth: Option<Arc<dyn RefreshAuth>>,
    /// Invoked when the credential refresh yields nothing or fails.
    pub on_auth_failure: Option<OnAuthFailure>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            headers: None,
            max_retries: 0,
            retry_backoff: Duration::from_millis(300),
            refresh_auth: None,
            on_auth_failure: None,
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .field("refresh_auth", &self.refresh_auth.is_some())
            .field("on_auth_failure", &self.on_auth_failure.is_some())
            .finish()
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the default header set.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = Some(
            headers
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Registers an async closure used to obtain a new token after a 401.
    ///
    /// # Example
    ///
    /// ```
    /// use storefront_http::{ApiError, ClientOptions};
    ///
    /// let opts = ClientOptions::new().with_refresh_auth(|_err: &ApiError| async {
    ///     Ok(Some("fresh-token".to_owned()))
    /// });
    /// assert!(opts.refresh_auth.is_some());
    /// ```
    pub fn with_refresh_auth<F, Fut>(mut self, refresh: F) -> Self
    where
        F: Fn(&ApiError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>, BoxError>> + Send + 'static,
    {
        self.refresh_auth = Some(Arc::new(RefreshFn(refresh)));
        self
    }

    /// Registers a [`RefreshAuth`] implementation.
    pub fn with_refresh_handler(mut self, refresh: impl RefreshAuth + 'static) -> Self {
        self.refresh_auth = Some(Arc::new(refresh));
        self
    }

    pub fn with_on_auth_failure(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_auth_failure = Some(Arc::new(hook));
        self
    }

    /// Base backoff after applying [`MIN_RETRY_BACKOFF`].
    pub(crate) fn effective_backoff(&self) -> Duration {
        self.retry_backoff.max(MIN_RETRY_BACKOFF)
    }

    /// Default headers, falling back to a JSON content type.
    pub(crate) fn effective_headers(&self) -> BTreeMap<String, String> {
        self.headers.clone().unwrap_or_else(|| {
            BTreeMap::from([("Content-Type".to_owned(), "application/json".to_owned())])
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ClientOptions;

    #[test]
    fn defaults_match_documented_values() {
        let opts = ClientOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(30));
        assert_eq!(opts.max_retries, 0);
        assert_eq!(opts.retry_backoff, Duration::from_millis(300));
        assert_eq!(
            opts.effective_headers().get("Content-Type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn backoff_is_clamped_to_floor() {
        let opts = ClientOptions::new().with_retry_backoff(Duration::from_millis(5));
        assert_eq!(opts.effective_backoff(), Duration::from_millis(100));

        let opts = ClientOptions::new().with_retry_backoff(Duration::from_millis(450));
        assert_eq!(opts.effective_backoff(), Duration::from_millis(450));
    }

    #[test]
    fn explicit_headers_replace_json_default() {
        let opts = ClientOptions::new().with_headers([("Accept", "text/plain")]);
        let headers = opts.effective_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Accept").map(String::as_str), Some("text/plain"));
    }

    #[test]
    fn debug_hides_callbacks() {
        let opts = ClientOptions::new().with_on_auth_failure(|| {});
        let debug = format!("{opts:?}");
        assert!(debug.contains("on_auth_failure: true"));
        assert!(debug.contains("refresh_auth: false"));
    }
}
