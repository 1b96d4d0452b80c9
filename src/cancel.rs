use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

const DEFAULT_REASON: &str = "canceled";

/// Cooperative cancellation handle shared between a caller and its requests.
///
/// Cloning yields a handle to the same cancellation state.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every request observing this token. The first reason wins.
    pub fn cancel(&self, reason: Option<&str>) {
        let _ = self
            .reason
            .set(reason.unwrap_or(DEFAULT_REASON).to_owned());
        self.token.cancel();
    }

    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn canceled(&self) {
        self.token.cancelled().await;
    }

    pub(crate) fn error(&self) -> crate::ApiError {
        crate::ApiError::Canceled {
            reason: self.reason().unwrap_or(DEFAULT_REASON).to_owned(),
        }
    }
}
