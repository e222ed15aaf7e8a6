use snafu::Snafu;

use crate::ErrorKind;

/// Errors returned by the remote surfaces of the ingestion service.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum BackendError {
    #[snafu(display("{operation} timed out"))]
    Timeout { operation: &'static str },
    #[snafu(display("transport error: {message}"))]
    Transport { message: String },
    #[snafu(display("request throttled: {message}"))]
    Throttled { message: String },
    #[snafu(display("http status {status}: {message}"))]
    Http { status: u16, message: String },
    #[snafu(display("unauthorized: {message}"))]
    Unauthorized { message: String },
    #[snafu(display("{resource} not found: {message}"))]
    NotFound {
        resource: &'static str,
        message: String,
    },
    #[snafu(display("streaming ingestion rejected: {message}"))]
    StreamingRejected { message: String },
    #[snafu(display("invalid request: {message}"))]
    InvalidRequest { message: String },
    #[snafu(display("internal error: {message}"))]
    Internal { message: String },
}

pub type Result<T, E = BackendError> = ::std::result::Result<T, E>;

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } | Self::Throttled { .. } => {
                ErrorKind::Temporary
            }
            Self::Http { status, .. } => match status {
                401 | 403 => ErrorKind::Authentication,
                404 => ErrorKind::NotFound,
                408 | 429 | 500..=599 => ErrorKind::Temporary,
                _ => ErrorKind::Rejected,
            },
            Self::Unauthorized { .. } => ErrorKind::Authentication,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::StreamingRejected { .. } => ErrorKind::Rejected,
            Self::InvalidRequest { .. } => ErrorKind::Validation,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Http { status: 429, .. })
    }

    /// The streaming endpoint refused this payload; it may still be ingested queued.
    pub fn is_streaming_rejection(&self) -> bool {
        matches!(self, Self::StreamingRejected { .. })
    }

    /// The resource that produced this error should not be used again until rediscovered.
    pub fn invalidates_resource(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Authentication | ErrorKind::NotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        let err = |status| BackendError::Http {
            status,
            message: String::new(),
        };

        assert_eq!(err(503).kind(), ErrorKind::Temporary);
        assert_eq!(err(429).kind(), ErrorKind::Temporary);
        assert!(err(429).is_throttled());
        assert_eq!(err(403).kind(), ErrorKind::Authentication);
        assert!(err(404).invalidates_resource());
        assert_eq!(err(400).kind(), ErrorKind::Rejected);
        assert!(!err(400).is_retryable());
    }

    #[test]
    fn test_streaming_rejection_is_permanent() {
        let err = BackendError::StreamingRejected {
            message: "too large".into(),
        };
        assert!(!err.is_retryable());
        assert!(err.is_streaming_rejection());
    }
}
