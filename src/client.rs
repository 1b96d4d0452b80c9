use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;

use crate::{
    auth::{bearer_authorization, OnAuthFailure},
    interceptor::Chain,
    request::join_url,
    ApiError, ApiRequest, CancelToken, ClientOptions, ErrorKind, InterceptorId, RefreshAuth,
    ReqwestTransport, RequestInterceptor, RequestOptions, Response, ResponseInterceptor, Result,
    Transport, TransportRequest,
};

const AUTHORIZATION: &str = "Authorization";

/// Mutable defaults, replaced wholesale on every change.
#[derive(Clone, Debug, Default)]
struct Defaults {
    base_url: Option<String>,
    headers: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
struct Interceptors {
    request: Chain<RequestInterceptor>,
    response: Chain<ResponseInterceptor>,
}

/// Fixed at construction.
struct Settings {
    timeout: Duration,
    max_retries: usize,
    retry_backoff: Duration,
    refresh_auth: Option<Arc<dyn RefreshAuth>>,
    on_auth_failure: Option<OnAuthFailure>,
}

#[derive(Clone)]
/// Resilient JSON-over-HTTP client.
///
/// Network failures and 5xx responses are retried with exponential backoff,
/// a 401 may trigger a single credential refresh, and requests can be
/// canceled cooperatively. Clones share defaults and interceptors.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    defaults: Arc<RwLock<Arc<Defaults>>>,
    interceptors: Arc<RwLock<Arc<Interceptors>>>,
    settings: Arc<Settings>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let defaults = self.defaults_snapshot();
        let headers: BTreeMap<&str, &str> = defaults
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(AUTHORIZATION) {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();
        let interceptors = self.interceptors_snapshot();
        f.debug_struct("ApiClient")
            .field("base_url", &defaults.base_url)
            .field("headers", &headers)
            .field("timeout", &self.settings.timeout)
            .field("max_retries", &self.settings.max_retries)
            .field("retry_backoff", &self.settings.retry_backoff)
            .field("request_interceptors", &interceptors.request.len())
            .field("response_interceptors", &interceptors.response.len())
            .finish()
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl ApiClient {
    /// Creates a client sending requests through `reqwest`.
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(options, ReqwestTransport::new())
    }

    /// Creates a client over a custom [`Transport`].
    pub fn with_transport(options: ClientOptions, transport: impl Transport + 'static) -> Self {
        let defaults = Defaults {
            headers: options.effective_headers(),
            base_url: options.base_url.clone(),
        };
        let settings = Settings {
            timeout: options.timeout,
            max_retries: options.max_retries,
            retry_backoff: options.effective_backoff(),
            refresh_auth: options.refresh_auth,
            on_auth_failure: options.on_auth_failure,
        };

        Self {
            transport: Arc::new(transport),
            defaults: Arc::new(RwLock::new(Arc::new(defaults))),
            interceptors: Arc::new(RwLock::new(Arc::new(Interceptors::default()))),
            settings: Arc::new(settings),
        }
    }

    /// Changes where future requests are sent.
    pub fn set_base_url(&self, base_url: Option<&str>) {
        self.update_defaults(|defaults| defaults.base_url = base_url.map(str::to_owned));
    }

    /// Merges `headers` into the defaults, overwriting on (case-insensitive) collision.
    pub fn set_default_headers<I, K, V>(&self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let headers: Vec<(K, V)> = headers.into_iter().collect();
        self.update_defaults(|defaults| {
            for (name, value) in &headers {
                insert_header(&mut defaults.headers, name.as_ref(), value.as_ref());
            }
        });
    }

    /// Sets or clears the default `Authorization: Bearer <token>` header.
    pub fn set_auth_token(&self, token: Option<&str>) {
        self.update_defaults(|defaults| match token {
            Some(token) => insert_header(
                &mut defaults.headers,
                AUTHORIZATION,
                &bearer_authorization(token),
            ),
            None => defaults
                .headers
                .retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION)),
        });
    }

    pub fn base_url(&self) -> Option<String> {
        self.defaults_snapshot().base_url.clone()
    }

    pub fn default_headers(&self) -> BTreeMap<String, String> {
        self.defaults_snapshot().headers.clone()
    }

    /// Registers a transformer applied to every outgoing attempt.
    pub fn add_request_interceptor(
        &self,
        interceptor: impl Fn(&mut TransportRequest) + Send + Sync + 'static,
    ) -> InterceptorId {
        self.update_interceptors(|chains| chains.request.push(Arc::new(interceptor)))
    }

    /// Returns `false` if `id` was not registered.
    pub fn eject_request_interceptor(&self, id: InterceptorId) -> bool {
        self.update_interceptors(|chains| chains.request.remove(id))
    }

    /// Registers a transformer applied to every successful response before decoding.
    pub fn add_response_interceptor(
        &self,
        interceptor: impl Fn(&mut Response) + Send + Sync + 'static,
    ) -> InterceptorId {
        self.update_interceptors(|chains| chains.response.push(Arc::new(interceptor)))
    }

    pub fn eject_response_interceptor(&self, id: InterceptorId) -> bool {
        self.update_interceptors(|chains| chains.response.remove(id))
    }

    pub fn create_cancel_token(&self) -> CancelToken {
        CancelToken::new()
    }

    /// Cancels every request carrying `token`. `reason` defaults to `"canceled"`.
    pub fn cancel_request(&self, token: &CancelToken, reason: Option<&str>) {
        token.cancel(reason);
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, options: RequestOptions) -> Result<T> {
        self.request(ApiRequest::get(path).with_options(options))
            .await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::post(path).json(body)?.with_options(options))
            .await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::put(path).json(body)?.with_options(options))
            .await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B, options: RequestOptions) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::patch(path).json(body)?.with_options(options))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.request(ApiRequest::delete(path).with_options(options))
            .await
    }

    /// Executes `request` and decodes the JSON body into `T`.
    ///
    /// An empty body decodes as JSON `null`, so `()` and `Option<_>` work for
    /// endpoints without content.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        decode_body(&response.body)
    }

    /// Executes `request` with retries, backoff and credential refresh, returning
    /// the raw response.
    pub async fn send(&self, request: ApiRequest) -> Result<Response> {
        let ApiRequest {
            method,
            path,
            body,
            options,
        } = request;

        // One snapshot per call; only a refreshed token changes it mid-flight.
        let defaults = self.defaults_snapshot();
        let interceptors = self.interceptors_snapshot();
        let url = join_url(defaults.base_url.as_deref(), &path);
        let mut headers = defaults.headers.clone();
        for (name, value) in &options.headers {
            insert_header(&mut headers, name, value);
        }
        if let Some(token) = &options.token {
            insert_header(&mut headers, AUTHORIZATION, &bearer_authorization(token));
        }
        let timeout = options.timeout.unwrap_or(self.settings.timeout);
        let cancel = options.cancel;

        let mut retries = 0usize;
        let mut refreshed = false;

        loop {
            if let Some(cancel) = &cancel {
                if cancel.is_canceled() {
                    return Err(cancel.error());
                }
            }

            let mut outgoing = TransportRequest {
                method: method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                body: body.clone(),
                timeout,
            };
            for interceptor in interceptors.request.iter() {
                interceptor(&mut outgoing);
            }
            if !interceptors.request.is_empty() {
                outgoing.headers = merge_header_case(&headers, outgoing.headers);
            }

            let err = match self.attempt(outgoing, cancel.as_ref()).await {
                Ok(mut response) => {
                    for interceptor in interceptors.response.iter() {
                        interceptor(&mut response);
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if kind == ErrorKind::Unauthorized && !refreshed {
                if let Some(refresh) = &self.settings.refresh_auth {
                    let refreshed_token = self
                        .refresh_token(refresh.as_ref(), &err, cancel.as_ref())
                        .await?;
                    let Some(token) = refreshed_token else {
                        if let Some(hook) = &self.settings.on_auth_failure {
                            hook();
                        }
                        return Err(err);
                    };
                    self.set_auth_token(Some(token.as_str()));
                    insert_header(&mut headers, AUTHORIZATION, &bearer_authorization(&token));
                    refreshed = true;

                    #[cfg(feature = "tracing")]
                    tracing::debug!(%url, "credential refreshed, reissuing request");
                    continue;
                }
            }

            if kind == ErrorKind::Retriable && retries < self.settings.max_retries {
                retries += 1;
                let delay = backoff_delay(self.settings.retry_backoff, retries);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    %url,
                    retry = retries,
                    max_retries = self.settings.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying request"
                );

                self.wait(delay, cancel.as_ref()).await?;
                continue;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(%url, retries, error = %err, "request failed");
            return Err(err);
        }
    }

    async fn attempt(
        &self,
        request: TransportRequest,
        cancel: Option<&CancelToken>,
    ) -> Result<Response> {
        match cancel {
            // Dropping the transport future aborts the in-flight call.
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.canceled() => Err(cancel.error()),
                result = self.transport.send(request) => result,
            },
            None => self.transport.send(request).await,
        }
    }

    async fn wait(&self, delay: Duration, cancel: Option<&CancelToken>) -> Result<()> {
        match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.canceled() => Err(cancel.error()),
                _ = sleep(delay) => Ok(()),
            },
            None => {
                sleep(delay).await;
                Ok(())
            }
        }
    }

    /// `Ok(None)` when the callback yields no token or fails; `Err` only on cancellation.
    async fn refresh_token(
        &self,
        refresh: &dyn RefreshAuth,
        err: &ApiError,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<String>> {
        let outcome = match cancel {
            Some(cancel) => tokio::select! {
                biased;
                _ = cancel.canceled() => return Err(cancel.error()),
                outcome = refresh.refresh(err) => outcome,
            },
            None => refresh.refresh(err).await,
        };

        match outcome {
            Ok(Some(token)) => Ok(Some(token)),
            Ok(None) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("credential refresh returned no token");
                Ok(None)
            }
            Err(_refresh_err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_refresh_err, "credential refresh failed");
                Ok(None)
            }
        }
    }

    fn defaults_snapshot(&self) -> Arc<Defaults> {
        self.defaults
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_defaults(&self, change: impl FnOnce(&mut Defaults)) {
        let mut guard = self.defaults.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Defaults::clone(&guard);
        change(&mut next);
        *guard = Arc::new(next);
    }

    fn interceptors_snapshot(&self) -> Arc<Interceptors> {
        self.interceptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_interceptors<R>(&self, change: impl FnOnce(&mut Interceptors) -> R) -> R {
        let mut guard = self
            .interceptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = Interceptors::clone(&guard);
        let result = change(&mut next);
        *guard = Arc::new(next);
        result
    }
}

/// Delay before the `retry`-th retry (1-based): `base * 2^(retry - 1)`,
/// saturating at [`Duration::MAX`].
pub(crate) fn backoff_delay(base: Duration, retry: usize) -> Duration {
    u32::try_from(retry.saturating_sub(1))
        .ok()
        .and_then(|exp| 2u32.checked_pow(exp))
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

fn insert_header(headers: &mut BTreeMap<String, String>, name: &str, value: &str) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
    headers.insert(name.to_owned(), value.to_owned());
}

/// Collapses header names differing only by case, preferring entries that
/// interceptors added or changed relative to `before`.
fn merge_header_case(
    before: &BTreeMap<String, String>,
    after: BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in after {
        let changed = before.get(&name) != Some(&value);
        let existing = merged
            .keys()
            .find(|key| key.eq_ignore_ascii_case(&name))
            .cloned();
        match existing {
            Some(existing) if changed => {
                merged.remove(&existing);
                merged.insert(name, value);
            }
            Some(_) => {}
            None => {
                merged.insert(name, value);
            }
        }
    }
    merged
}

fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    if body.trim().is_empty() {
        return serde_json::from_value(serde_json::Value::Null)
            .map_err(|err| ApiError::Decode(format!("empty response body: {err}")));
    }
    serde_json::from_str(body)
        .map_err(|err| ApiError::Decode(format!("invalid response JSON: {err}; body: {body}")))
}
