use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::format::DataFormat;

/// Which outcomes the service reports back on the status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportLevel {
    #[default]
    FailuresOnly,
    DoNotReport,
    FailuresAndSuccesses,
}

/// Where the service reports ingestion outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportMethod {
    #[default]
    Queue,
    Table,
    QueueAndTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidationOptions {
    #[default]
    DoNotValidate,
    ValidateCsvInputConstantColumns,
    ValidateCsvInputColumnLevelOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidationImplications {
    Fail,
    #[default]
    BestEffort,
}

/// Server side validation applied to the ingested data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidationPolicy {
    #[serde(with = "validation_options_code")]
    pub validation_options: ValidationOptions,
    #[serde(with = "validation_implications_code")]
    pub validation_implications: ValidationImplications,
}

/// A single column of an inline ingestion mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnMapping {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// Column mapping for an ingestion, either a pre-created one or inline columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionMapping {
    Reference(String),
    Inline(Vec<ColumnMapping>),
}

/// Caller supplied properties of an ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionProperties {
    pub database: String,
    pub table: String,
    pub format: Option<DataFormat>,
    pub mapping: Option<IngestionMapping>,
    pub ignore_first_record: bool,
    pub tags: BTreeSet<String>,
    pub ingest_by_tags: BTreeSet<String>,
    pub drop_by_tags: BTreeSet<String>,
    pub ingest_if_not_exists: BTreeSet<String>,
    pub report_level: ReportLevel,
    pub report_method: ReportMethod,
    pub flush_immediately: bool,
    pub validation_policy: Option<ValidationPolicy>,
    pub additional_properties: BTreeMap<String, String>,
}

impl ReportLevel {
    pub fn code(&self) -> u8 {
        match self {
            Self::FailuresOnly => 0,
            Self::DoNotReport => 1,
            Self::FailuresAndSuccesses => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::FailuresOnly),
            1 => Some(Self::DoNotReport),
            2 => Some(Self::FailuresAndSuccesses),
            _ => None,
        }
    }
}

impl ReportMethod {
    pub fn code(&self) -> u8 {
        match self {
            Self::Queue => 0,
            Self::Table => 1,
            Self::QueueAndTable => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Queue),
            1 => Some(Self::Table),
            2 => Some(Self::QueueAndTable),
            _ => None,
        }
    }

    pub fn uses_table(&self) -> bool {
        matches!(self, Self::Table | Self::QueueAndTable)
    }
}

impl ValidationOptions {
    pub fn code(&self) -> u8 {
        match self {
            Self::DoNotValidate => 0,
            Self::ValidateCsvInputConstantColumns => 1,
            Self::ValidateCsvInputColumnLevelOnly => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::DoNotValidate),
            1 => Some(Self::ValidateCsvInputConstantColumns),
            2 => Some(Self::ValidateCsvInputColumnLevelOnly),
            _ => None,
        }
    }
}

impl ValidationImplications {
    pub fn code(&self) -> u8 {
        match self {
            Self::Fail => 0,
            Self::BestEffort => 1,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Fail),
            1 => Some(Self::BestEffort),
            _ => None,
        }
    }
}

impl ColumnMapping {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            data_type: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Json path of the column, for json and avro mappings.
    pub fn with_path(self, path: impl Into<String>) -> Self {
        self.with_property("Path", path)
    }

    /// Ordinal of the column, for csv mappings.
    pub fn with_ordinal(self, ordinal: usize) -> Self {
        self.with_property("Ordinal", ordinal.to_string())
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl IngestionProperties {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            format: None,
            mapping: None,
            ignore_first_record: false,
            tags: BTreeSet::new(),
            ingest_by_tags: BTreeSet::new(),
            drop_by_tags: BTreeSet::new(),
            ingest_if_not_exists: BTreeSet::new(),
            report_level: ReportLevel::default(),
            report_method: ReportMethod::default(),
            flush_immediately: false,
            validation_policy: None,
            additional_properties: BTreeMap::new(),
        }
    }

    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_mapping_reference(mut self, name: impl Into<String>) -> Self {
        self.mapping = Some(IngestionMapping::Reference(name.into()));
        self
    }

    pub fn with_inline_mapping(mut self, columns: Vec<ColumnMapping>) -> Self {
        self.mapping = Some(IngestionMapping::Inline(columns));
        self
    }

    pub fn with_ignore_first_record(mut self, ignore: bool) -> Self {
        self.ignore_first_record = ignore;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_ingest_by_tag(mut self, tag: impl Into<String>) -> Self {
        self.ingest_by_tags.insert(tag.into());
        self
    }

    pub fn with_drop_by_tag(mut self, tag: impl Into<String>) -> Self {
        self.drop_by_tags.insert(tag.into());
        self
    }

    pub fn with_ingest_if_not_exists(mut self, tag: impl Into<String>) -> Self {
        self.ingest_if_not_exists.insert(tag.into());
        self
    }

    pub fn with_report_level(mut self, report_level: ReportLevel) -> Self {
        self.report_level = report_level;
        self
    }

    pub fn with_report_method(mut self, report_method: ReportMethod) -> Self {
        self.report_method = report_method;
        self
    }

    pub fn with_flush_immediately(mut self, flush: bool) -> Self {
        self.flush_immediately = flush;
        self
    }

    pub fn with_validation_policy(mut self, policy: ValidationPolicy) -> Self {
        self.validation_policy = Some(policy);
        self
    }

    pub fn with_additional_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.additional_properties.insert(key.into(), value.into());
        self
    }

    /// All tags sent to the service, including the ingest-by and drop-by prefixed ones.
    pub fn all_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .cloned()
            .chain(self.ingest_by_tags.iter().map(|t| format!("ingest-by:{t}")))
            .chain(self.drop_by_tags.iter().map(|t| format!("drop-by:{t}")))
            .collect()
    }
}

mod validation_options_code {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use super::ValidationOptions;

    pub fn serialize<S: Serializer>(value: &ValidationOptions, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(value.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ValidationOptions, D::Error> {
        let code = u8::deserialize(d)?;
        ValidationOptions::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid validation options {code}")))
    }
}

mod validation_implications_code {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use super::ValidationImplications;

    pub fn serialize<S: Serializer>(
        value: &ValidationImplications,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.serialize_u8(value.code())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<ValidationImplications, D::Error> {
        let code = u8::deserialize(d)?;
        ValidationImplications::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid validation implications {code}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tags_are_prefixed() {
        let props = IngestionProperties::new("db", "t")
            .with_tag("plain")
            .with_ingest_by_tag("batch-1")
            .with_drop_by_tag("old");

        assert_eq!(
            props.all_tags(),
            vec!["plain", "ingest-by:batch-1", "drop-by:old"]
        );
    }

    #[test]
    fn test_mapping_is_replaced_not_duplicated() {
        let props = IngestionProperties::new("db", "t")
            .with_mapping_reference("m1")
            .with_inline_mapping(vec![ColumnMapping::new("a").with_ordinal(0)]);

        assert!(matches!(props.mapping, Some(IngestionMapping::Inline(_))));
    }

    #[test]
    fn test_validation_policy_serializes_codes() {
        let policy = ValidationPolicy {
            validation_options: ValidationOptions::ValidateCsvInputConstantColumns,
            validation_implications: ValidationImplications::Fail,
        };
        let json = serde_json::to_string(&policy).unwrap();
        assert_eq!(json, r#"{"ValidationOptions":1,"ValidationImplications":0}"#);

        let back: ValidationPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn test_codes() {
        assert_eq!(ReportLevel::FailuresAndSuccesses.code(), 2);
        assert_eq!(ReportMethod::from_code(1), Some(ReportMethod::Table));
        assert_eq!(ReportMethod::from_code(7), None);
    }
}
