/// Boxed error used for transport sources and refresh callback failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was canceled through its [`CancelToken`](crate::CancelToken).
    #[error("request canceled: {reason}")]
    Canceled { reason: String },
    /// The transport gave up waiting for a response.
    #[error("request timed out")]
    Timeout,
    /// No response was received (connection refused, reset, DNS failure...).
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Request body could not be serialized to JSON.
    #[error("encode error: {0}")]
    Encode(String),
    /// Response body could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
    /// Invalid client configuration or header value.
    #[error("config error: {0}")]
    Config(String),
}

/// Classification driving the retry loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Never retried.
    Canceled,
    /// HTTP 401; eligible for one credential refresh.
    Unauthorized,
    /// No response at all, or a 5xx status.
    Retriable,
    /// 4xx other than 401.
    Client,
    /// Decode or configuration failure, or an unexpected status.
    Fatal,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Canceled { .. } => ErrorKind::Canceled,
            Self::Timeout | Self::Transport(_) => ErrorKind::Retriable,
            Self::Http { status: 401, .. } => ErrorKind::Unauthorized,
            Self::Http { status, .. } if (500..600).contains(status) => ErrorKind::Retriable,
            Self::Http { status, .. } if (400..500).contains(status) => ErrorKind::Client,
            Self::Http { .. } | Self::Encode(_) | Self::Decode(_) | Self::Config(_) => {
                ErrorKind::Fatal
            }
        }
    }

    /// Status code of the response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the failure carried an HTTP response.
    pub fn has_response(&self) -> bool {
        self.status().is_some()
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }
}
