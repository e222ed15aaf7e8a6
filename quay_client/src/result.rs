use std::fmt;

use quay_resources::{
    IngestionProperties, IngestionStatus, OperationId, ReportLevel, ReportMethod,
    obfuscate_query,
};
use url::Url;

use crate::client::IngestState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionKind {
    /// Staged and enqueued; the service ingests it asynchronously.
    Queued,
    /// Ingested inline by the streaming endpoint.
    Streamed,
}

/// What the client did with an ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionResult {
    pub operation_id: OperationId,
    pub kind: IngestionKind,
    pub database: String,
    pub table: String,
    pub blob_uri: Option<Url>,
    /// Why a streaming ingestion was sent queued instead.
    pub reason: Option<String>,
    pub report_level: ReportLevel,
    pub report_method: ReportMethod,
}

impl IngestionResult {
    pub(crate) fn new(
        operation_id: OperationId,
        kind: IngestionKind,
        properties: &IngestionProperties,
    ) -> Self {
        Self {
            operation_id,
            kind,
            database: properties.database.clone(),
            table: properties.table.clone(),
            blob_uri: None,
            reason: None,
            report_level: properties.report_level,
            report_method: properties.report_method,
        }
    }

    /// Whether the service writes the outcome of this ingestion to the status table.
    ///
    /// Under [`ReportLevel::FailuresOnly`] only failures are written, so a
    /// successful ingestion stays pending in the table forever.
    pub fn is_status_reported(&self) -> bool {
        self.kind == IngestionKind::Queued
            && self.report_level != ReportLevel::DoNotReport
            && self.report_method.uses_table()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Enqueued, the final status is not known yet.
    Accepted(IngestionResult),
    Completed {
        result: IngestionResult,
        status: IngestionStatus,
    },
    /// Enqueued, but the report settings keep the outcome out of the status table.
    NotReported(IngestionResult),
    /// Enqueued, and no terminal status appeared before the poll timeout.
    TimedOut {
        result: IngestionResult,
        last: Option<IngestionStatus>,
    },
    /// The caller cancelled. Remote side effects up to `state` are left in place.
    Cancelled {
        operation_id: OperationId,
        state: IngestState,
    },
}

impl IngestOutcome {
    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Accepted(result)
            | Self::NotReported(result)
            | Self::Completed { result, .. }
            | Self::TimedOut { result, .. } => result.operation_id,
            Self::Cancelled { operation_id, .. } => *operation_id,
        }
    }

    pub fn result(&self) -> Option<&IngestionResult> {
        match self {
            Self::Accepted(result)
            | Self::NotReported(result)
            | Self::Completed { result, .. }
            | Self::TimedOut { result, .. } => Some(result),
            Self::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl fmt::Display for IngestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Streamed => f.write_str("streamed"),
        }
    }
}

impl fmt::Display for IngestionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IngestionResult(kind={}, database={}, table={}, operation_id={}",
            self.kind, self.database, self.table, self.operation_id
        )?;
        if let Some(uri) = &self.blob_uri {
            write!(f, ", blob_uri={}", obfuscate_query(uri))?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_hides_signature() {
        let mut result = IngestionResult::new(
            OperationId::new(),
            IngestionKind::Queued,
            &IngestionProperties::new("db", "t"),
        );
        result.blob_uri = Some(Url::parse("https://a.blob.example.net/c/b?sig=secret").unwrap());

        let text = result.to_string();
        assert!(text.contains("blob_uri=https://a.blob.example.net/c/b?***"));
        assert!(!text.contains("secret"));
    }

    #[test]
    fn test_status_reporting_follows_report_settings() {
        use IngestionKind::*;
        use ReportLevel::*;
        use ReportMethod::*;

        let reported = |level, method, kind| {
            let properties = IngestionProperties::new("db", "t")
                .with_report_level(level)
                .with_report_method(method);
            IngestionResult::new(OperationId::new(), kind, &properties).is_status_reported()
        };

        assert!(reported(FailuresOnly, Table, Queued));
        assert!(reported(FailuresAndSuccesses, QueueAndTable, Queued));
        assert!(!reported(FailuresAndSuccesses, Queue, Queued));
        assert!(!reported(DoNotReport, Table, Queued));
        assert!(!reported(FailuresAndSuccesses, Table, Streamed));
    }
}
