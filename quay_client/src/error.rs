use quay_control_plane::{BackendError, ErrorKind, ResourceManagerError, TokenError};
use quay_resources::{DescriptorError, IngestionStatus, OperationId};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    #[snafu(display("invalid ingestion request"))]
    Validation { source: DescriptorError },
    #[snafu(display("streaming ingestion is not possible: {reason}"))]
    StreamingNotSupported { reason: String },
    #[snafu(display("failed to obtain ingestion resources"))]
    ResourceDiscovery { source: ResourceManagerError },
    #[snafu(display("failed to authenticate"))]
    Authentication { source: TokenError },
    #[snafu(display("{operation} failed after retries"))]
    TransientTransport {
        operation: &'static str,
        source: BackendError,
    },
    #[snafu(display("{operation} failed"))]
    Backend {
        operation: &'static str,
        source: BackendError,
    },
    #[snafu(display("failed to read source data"))]
    ReadSource { source: std::io::Error },
    #[snafu(display("failed to serialize ingestion message"))]
    Serialization { source: serde_json::Error },
    #[snafu(display("ingestion {operation_id} failed: {:?}", status.state))]
    IngestionFailed {
        operation_id: OperationId,
        status: Box<IngestionStatus>,
    },
    #[snafu(display("ingestion operation {operation_id} failed"))]
    OperationFailed {
        operation_id: OperationId,
        source: Box<IngestError>,
    },
    #[snafu(display("internal error: {message}"))]
    Internal { message: String },
}

pub type Result<T, E = IngestError> = ::std::result::Result<T, E>;

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::StreamingNotSupported { .. } => ErrorKind::Validation,
            Self::ResourceDiscovery { source } => source.kind(),
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::TransientTransport { .. } => ErrorKind::Temporary,
            Self::Backend { source, .. } => source.kind(),
            Self::ReadSource { .. } => ErrorKind::NotFound,
            Self::Serialization { .. } | Self::Internal { .. } => ErrorKind::Internal,
            Self::IngestionFailed { .. } => ErrorKind::Rejected,
            Self::OperationFailed { source, .. } => source.kind(),
        }
    }

    /// The operation this error belongs to, once one was minted.
    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            Self::OperationFailed { operation_id, .. }
            | Self::IngestionFailed { operation_id, .. } => Some(*operation_id),
            _ => None,
        }
    }

    /// Classify a backend error after the retry policy gave up on it.
    pub(crate) fn from_backend(operation: &'static str, source: BackendError) -> Self {
        if source.is_retryable() {
            Self::TransientTransport { operation, source }
        } else {
            Self::Backend { operation, source }
        }
    }

    /// Whether a failed streaming attempt may be retried on the queued path.
    pub(crate) fn allows_queued_fallback(&self) -> bool {
        match self {
            Self::TransientTransport { .. } => true,
            Self::Backend { source, .. } => source.is_streaming_rejection(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_failed_keeps_inner_kind() {
        let id = OperationId::new();
        let err = IngestError::OperationFailed {
            operation_id: id,
            source: Box::new(IngestError::from_backend(
                "enqueue",
                BackendError::Timeout { operation: "enqueue" },
            )),
        };

        assert_eq!(err.kind(), ErrorKind::Temporary);
        assert_eq!(err.operation_id(), Some(id));
    }

    #[test]
    fn test_fallback_classification() {
        let rejected = IngestError::from_backend(
            "streaming",
            BackendError::StreamingRejected {
                message: "payload too large".into(),
            },
        );
        assert!(rejected.allows_queued_fallback());

        let unauthorized = IngestError::from_backend(
            "streaming",
            BackendError::Unauthorized {
                message: "bad token".into(),
            },
        );
        assert!(!unauthorized.allows_queued_fallback());
    }
}
