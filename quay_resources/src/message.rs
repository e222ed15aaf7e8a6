use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    descriptor::IngestionDescriptor,
    operation::OperationId,
    properties::IngestionMapping,
};

/// The envelope placed on an ingestion queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IngestionMessage {
    pub id: OperationId,
    pub blob_path: String,
    pub raw_data_size: u64,
    pub database_name: String,
    pub table_name: String,
    pub retain_blob_on_success: bool,
    pub flush_immediately: bool,
    pub ignore_size_limit: bool,
    pub report_level: u8,
    pub report_method: u8,
    pub source_message_creation_time: DateTime<Utc>,
    pub additional_properties: AdditionalProperties,
}

/// Free-form properties forwarded to the ingestion service.
///
/// Collections are carried as json encoded strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalProperties {
    pub authorization_context: String,
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest_if_not_exists: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_mapping_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_mapping: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_mapping_type: Option<String>,
    #[serde(
        default,
        rename = "ValidationPolicy",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation_policy: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_first_record: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl IngestionMessage {
    /// Build the queue message for a descriptor whose data lives at `blob_path`.
    pub fn new(
        descriptor: &IngestionDescriptor,
        blob_path: impl Into<String>,
        authorization_context: impl Into<String>,
    ) -> serde_json::Result<Self> {
        let properties = descriptor.properties();
        let format = descriptor.format();

        let tags = properties.all_tags();
        let tags = if tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&tags)?)
        };

        let ingest_if_not_exists = if properties.ingest_if_not_exists.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&properties.ingest_if_not_exists)?)
        };

        let (mapping_reference, mapping) = match &properties.mapping {
            Some(IngestionMapping::Reference(name)) => (Some(name.clone()), None),
            Some(IngestionMapping::Inline(columns)) => {
                (None, Some(serde_json::to_string(columns)?))
            }
            None => (None, None),
        };
        let mapping_type = properties
            .mapping
            .as_ref()
            .map(|_| format.mapping_kind().wire_name().to_string());

        let validation_policy = properties
            .validation_policy
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(Self {
            id: descriptor.operation_id(),
            blob_path: blob_path.into(),
            raw_data_size: descriptor.raw_size().unwrap_or_default(),
            database_name: properties.database.clone(),
            table_name: properties.table.clone(),
            retain_blob_on_success: true,
            flush_immediately: properties.flush_immediately,
            ignore_size_limit: false,
            report_level: properties.report_level.code(),
            report_method: properties.report_method.code(),
            source_message_creation_time: Utc::now(),
            additional_properties: AdditionalProperties {
                authorization_context: authorization_context.into(),
                format: format.wire_name().to_string(),
                tags,
                ingest_if_not_exists,
                ingestion_mapping_reference: mapping_reference,
                ingestion_mapping: mapping,
                ingestion_mapping_type: mapping_type,
                validation_policy,
                ignore_first_record: properties.ignore_first_record,
                extra: properties.additional_properties.clone(),
            },
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::DescriptorBuilder,
        format::DataFormat,
        properties::{ColumnMapping, IngestionProperties, ReportLevel},
        source::IngestionSource,
    };

    fn descriptor(properties: IngestionProperties) -> IngestionDescriptor {
        DescriptorBuilder::new()
            .build(IngestionSource::from_bytes("a,b\n"), properties)
            .unwrap()
    }

    #[test]
    fn test_wire_keys() {
        let descriptor = descriptor(
            IngestionProperties::new("db1", "t1")
                .with_format(DataFormat::Csv)
                .with_report_level(ReportLevel::FailuresAndSuccesses)
                .with_drop_by_tag("old"),
        );
        let message = IngestionMessage::new(&descriptor, "https://a/c/b", "ctx").unwrap();
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(value["Id"], descriptor.operation_id().to_string());
        assert_eq!(value["DatabaseName"], "db1");
        assert_eq!(value["TableName"], "t1");
        assert_eq!(value["RawDataSize"], 4);
        assert_eq!(value["ReportLevel"], 2);
        assert_eq!(value["RetainBlobOnSuccess"], true);
        assert_eq!(value["AdditionalProperties"]["format"], "csv");
        assert_eq!(value["AdditionalProperties"]["authorizationContext"], "ctx");
        assert_eq!(value["AdditionalProperties"]["tags"], r#"["drop-by:old"]"#);
        assert!(value["AdditionalProperties"].get("ingestionMapping").is_none());
    }

    #[test]
    fn test_inline_mapping() {
        let descriptor = descriptor(
            IngestionProperties::new("db1", "t1")
                .with_format(DataFormat::Json)
                .with_inline_mapping(vec![ColumnMapping::new("a").with_path("$.a")]),
        );
        let message = IngestionMessage::new(&descriptor, "https://a/c/b", "ctx").unwrap();
        let props = &message.additional_properties;

        assert_eq!(props.ingestion_mapping_type.as_deref(), Some("Json"));
        assert_eq!(
            props.ingestion_mapping.as_deref(),
            Some(r#"[{"Column":"a","Properties":{"Path":"$.a"}}]"#)
        );
        assert_eq!(props.ingestion_mapping_reference, None);
    }

    #[test]
    fn test_extra_properties_are_flattened() {
        let descriptor = descriptor(
            IngestionProperties::new("db1", "t1")
                .with_format(DataFormat::Csv)
                .with_additional_property("creationTime", "2024-01-01"),
        );
        let message = IngestionMessage::new(&descriptor, "https://a/c/b", "ctx").unwrap();
        let json = message.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["AdditionalProperties"]["creationTime"], "2024-01-01");

        let back = IngestionMessage::from_json(&json).unwrap();
        assert_eq!(back, message);
    }
}
