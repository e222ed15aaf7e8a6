use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::OperationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestionState {
    Pending,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Skipped,
}

/// Whether a failed ingestion may succeed if submitted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Permanent,
    Transient,
    Exhausted,
}

/// The status record of one operation, as kept by the status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngestionStatus {
    pub operation_id: OperationId,
    pub state: IngestionState,
    pub database: String,
    pub table: String,
    pub ingestion_source_path: String,
    pub updated_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IngestionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PartiallySucceeded)
    }
}

impl IngestionStatus {
    /// A new pending record, created when a message is enqueued.
    pub fn pending(
        operation_id: OperationId,
        database: impl Into<String>,
        table: impl Into<String>,
        source_path: impl Into<String>,
    ) -> Self {
        Self {
            operation_id,
            state: IngestionState::Pending,
            database: database.into(),
            table: table.into(),
            ingestion_source_path: source_path.into(),
            updated_on: Utc::now(),
            error_code: None,
            failure_kind: None,
            details: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Move the record to `state`. Terminal records are never changed again.
    pub fn transition(&mut self, state: IngestionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = state;
        self.updated_on = Utc::now();
        true
    }

    pub fn with_failure(
        mut self,
        kind: FailureKind,
        error_code: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        self.failure_kind = Some(kind);
        self.error_code = Some(error_code.into());
        self.details = Some(details.into());
        self
    }
}
