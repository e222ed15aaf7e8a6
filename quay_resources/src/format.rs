use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Data formats accepted by the ingestion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Csv,
    Tsv,
    Scsv,
    Sohsv,
    Psv,
    Txt,
    Raw,
    Tsve,
    Json,
    SingleJson,
    MultiJson,
    Avro,
    ApacheAvro,
    Parquet,
    Orc,
    W3cLogFile,
}

/// The kind of column mapping a format expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestionMappingKind {
    Csv,
    Json,
    Avro,
    ApacheAvro,
    Parquet,
    Orc,
    W3CLogFile,
}

/// Compression applied to the source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Zip,
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("unknown data format '{value}'"))]
pub struct ParseDataFormatError {
    value: String,
}

const ALL_FORMATS: [DataFormat; 16] = [
    DataFormat::Csv,
    DataFormat::Tsv,
    DataFormat::Scsv,
    DataFormat::Sohsv,
    DataFormat::Psv,
    DataFormat::Txt,
    DataFormat::Raw,
    DataFormat::Tsve,
    DataFormat::Json,
    DataFormat::SingleJson,
    DataFormat::MultiJson,
    DataFormat::Avro,
    DataFormat::ApacheAvro,
    DataFormat::Parquet,
    DataFormat::Orc,
    DataFormat::W3cLogFile,
];

impl DataFormat {
    /// The name used on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Scsv => "scsv",
            Self::Sohsv => "sohsv",
            Self::Psv => "psv",
            Self::Txt => "txt",
            Self::Raw => "raw",
            Self::Tsve => "tsve",
            Self::Json => "json",
            Self::SingleJson => "singlejson",
            Self::MultiJson => "multijson",
            Self::Avro => "avro",
            Self::ApacheAvro => "apacheavro",
            Self::Parquet => "parquet",
            Self::Orc => "orc",
            Self::W3cLogFile => "w3clogfile",
        }
    }

    pub fn mapping_kind(&self) -> IngestionMappingKind {
        match self {
            Self::Json | Self::SingleJson | Self::MultiJson => IngestionMappingKind::Json,
            Self::Avro => IngestionMappingKind::Avro,
            Self::ApacheAvro => IngestionMappingKind::ApacheAvro,
            Self::Parquet => IngestionMappingKind::Parquet,
            Self::Orc => IngestionMappingKind::Orc,
            Self::W3cLogFile => IngestionMappingKind::W3CLogFile,
            _ => IngestionMappingKind::Csv,
        }
    }

    /// Binary columnar formats are already compressed internally.
    pub fn is_compressible(&self) -> bool {
        !matches!(
            self,
            Self::Avro | Self::ApacheAvro | Self::Parquet | Self::Orc
        )
    }

    /// Formats that cannot be streamed without a mapping.
    pub fn requires_mapping_for_streaming(&self) -> bool {
        matches!(
            self,
            Self::Json | Self::SingleJson | Self::MultiJson | Self::Avro
        )
    }

    /// Infer the format from a file extension, without the leading dot.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        match extension.as_str() {
            "log" => Some(Self::W3cLogFile),
            "jsonl" | "ndjson" => Some(Self::MultiJson),
            other => other.parse().ok(),
        }
    }
}

impl IngestionMappingKind {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Csv => "Csv",
            Self::Json => "Json",
            Self::Avro => "Avro",
            Self::ApacheAvro => "ApacheAvro",
            Self::Parquet => "Parquet",
            Self::Orc => "Orc",
            Self::W3CLogFile => "W3CLogFile",
        }
    }
}

impl CompressionType {
    /// Detect compression from a file or blob name suffix.
    pub fn from_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.ends_with(".gz") {
            Self::Gzip
        } else if name.ends_with(".zip") {
            Self::Zip
        } else {
            Self::None
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("gz"),
            Self::Zip => Some("zip"),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for DataFormat {
    type Err = ParseDataFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_FORMATS
            .iter()
            .find(|format| format.wire_name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ParseDataFormatError {
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("CSV".parse::<DataFormat>().unwrap(), DataFormat::Csv);
        assert_eq!(
            "SingleJson".parse::<DataFormat>().unwrap(),
            DataFormat::SingleJson
        );
        assert!("xlsx".parse::<DataFormat>().is_err());
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(DataFormat::from_extension("parquet"), Some(DataFormat::Parquet));
        assert_eq!(DataFormat::from_extension("log"), Some(DataFormat::W3cLogFile));
        assert_eq!(DataFormat::from_extension("ndjson"), Some(DataFormat::MultiJson));
        assert_eq!(DataFormat::from_extension("bin"), None);
    }

    #[test]
    fn test_compressible_formats() {
        assert!(DataFormat::Csv.is_compressible());
        assert!(DataFormat::Json.is_compressible());
        assert!(!DataFormat::Parquet.is_compressible());
        assert!(!DataFormat::Orc.is_compressible());
    }

    #[test]
    fn test_mapping_kind() {
        assert_eq!(DataFormat::Tsv.mapping_kind(), IngestionMappingKind::Csv);
        assert_eq!(DataFormat::MultiJson.mapping_kind(), IngestionMappingKind::Json);
        assert_eq!(DataFormat::Parquet.mapping_kind(), IngestionMappingKind::Parquet);
    }

    #[test]
    fn test_compression_from_name() {
        assert_eq!(CompressionType::from_name("data.csv.GZ"), CompressionType::Gzip);
        assert_eq!(CompressionType::from_name("data.zip"), CompressionType::Zip);
        assert_eq!(CompressionType::from_name("data.csv"), CompressionType::None);
    }
}
