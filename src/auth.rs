use std::{future::Future, sync::Arc};

use async_trait::async_trait;

use crate::{ApiError, BoxError};

/// Obtains a fresh credential after a request was rejected with HTTP 401.
///
/// Returning `Ok(None)` means no credential could be obtained; the client then
/// fires the on-auth-failure hook and surfaces the original 401.
#[async_trait]
pub trait RefreshAuth: Send + Sync {
    async fn refresh(&self, error: &ApiError) -> Result<Option<String>, BoxError>;
}

/// Adapts an async closure into a [`RefreshAuth`].
pub(crate) struct RefreshFn<F>(pub(crate) F);

#[async_trait]
impl<F, Fut> RefreshAuth for RefreshFn<F>
where
    F: Fn(&ApiError) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Option<String>, BoxError>> + Send + 'static,
{
    async fn refresh(&self, error: &ApiError) -> Result<Option<String>, BoxError> {
        (self.0)(error).await
    }
}

/// Fire-and-forget notification raised when a credential refresh fails.
pub type OnAuthFailure = Arc<dyn Fn() + Send + Sync>;

/// Builds an `Authorization` header value from a token.
///
/// If the token is missing the `Bearer ` prefix, it is added.
pub(crate) fn bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::{bearer_authorization, RefreshAuth, RefreshFn};
    use crate::{ApiError, BoxError};

    #[test]
    fn bearer_adds_prefix_when_missing() {
        assert_eq!(bearer_authorization(" tok1 "), "Bearer tok1");
    }

    #[test]
    fn bearer_keeps_existing_prefix() {
        assert_eq!(bearer_authorization("bEaReR tok1"), "bEaReR tok1");
    }

    #[tokio::test]
    async fn closure_adapter_sees_triggering_error() {
        let refresh = RefreshFn(|err: &ApiError| {
            let status = err.status();
            async move { Ok::<_, BoxError>(status.map(|code| format!("tok-{code}"))) }
        });
        let err = ApiError::Http {
            status: 401,
            body: String::new(),
        };

        let token = refresh.refresh(&err).await.expect("refresh must succeed");
        assert_eq!(token.as_deref(), Some("tok-401"));
    }
}
