//! Normalization of an ingestion source and its properties into a descriptor.
//!
//! A descriptor is immutable once built. Building it performs no network I/O;
//! the only file system access is a read-only `metadata` call on file sources.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use snafu::{ResultExt, Snafu, ensure};
use url::Url;

use crate::{
    format::{CompressionType, DataFormat},
    operation::OperationId,
    properties::IngestionProperties,
    source::{IngestionSource, SourceKind, SourceReader},
};

/// Compressed files are assumed to inflate by this factor.
const COMPRESSED_SIZE_FACTOR: u64 = 11;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DescriptorError {
    #[snafu(display("missing required ingestion property '{field}'"))]
    MissingField { field: &'static str },
    #[snafu(display("source file {} not found", path.display()))]
    SourceNotFound {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("source {} is not a regular file", path.display()))]
    NotAFile { path: PathBuf },
    #[snafu(display("invalid blob uri '{uri}'"))]
    InvalidBlobUri {
        uri: String,
        source: url::ParseError,
    },
    #[snafu(display("blob uri '{uri}' has no object path"))]
    EmptyBlobPath { uri: String },
    #[snafu(display("cannot infer the data format of '{source_name}'"))]
    FormatInference { source_name: String },
    #[snafu(display("failed to read source stream"))]
    ReadStream { source: std::io::Error },
}

pub type DescriptorResult<T, E = DescriptorError> = ::std::result::Result<T, E>;

/// The payload of a descriptor.
#[derive(Debug)]
pub enum DescriptorPayload {
    File(PathBuf),
    Blob(Url),
    Buffer(Bytes),
    Reader(SourceReader),
}

/// A normalized, immutable description of one ingestion.
#[derive(Debug)]
pub struct IngestionDescriptor {
    operation_id: OperationId,
    payload: DescriptorPayload,
    source_name: String,
    raw_size: Option<u64>,
    format: DataFormat,
    compression: CompressionType,
    properties: IngestionProperties,
}

/// Builds [`IngestionDescriptor`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorBuilder;

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(
        &self,
        source: IngestionSource,
        properties: IngestionProperties,
    ) -> DescriptorResult<IngestionDescriptor> {
        ensure!(
            !properties.database.trim().is_empty(),
            MissingFieldSnafu { field: "database" }
        );
        ensure!(
            !properties.table.trim().is_empty(),
            MissingFieldSnafu { field: "table" }
        );

        let operation_id = source.source_id.unwrap_or_default();
        let explicit_compression = source.compression;

        let (payload, source_name, raw_size, detected_compression) = match source.kind {
            SourceKind::File(path) => {
                let metadata =
                    std::fs::metadata(&path).context(SourceNotFoundSnafu { path: &path })?;
                ensure!(metadata.is_file(), NotAFileSnafu { path: &path });
                let name = file_name(&path);
                let compression = CompressionType::from_name(&name);
                (
                    DescriptorPayload::File(path),
                    name,
                    Some(metadata.len()),
                    compression,
                )
            }
            SourceKind::Blob { uri, raw_size } => {
                let url = Url::parse(&uri).context(InvalidBlobUriSnafu { uri: &uri })?;
                let name = url
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|name| !name.is_empty())
                    .map(ToString::to_string)
                    .ok_or_else(|| EmptyBlobPathSnafu { uri: &uri }.build())?;
                let compression = CompressionType::from_name(&name);
                (DescriptorPayload::Blob(url), name, raw_size, compression)
            }
            SourceKind::Buffer(data) => {
                let len = data.len() as u64;
                (
                    DescriptorPayload::Buffer(data),
                    "buffer".to_string(),
                    Some(len),
                    CompressionType::None,
                )
            }
            SourceKind::Reader { reader, size_hint } => (
                DescriptorPayload::Reader(reader),
                "stream".to_string(),
                size_hint,
                CompressionType::None,
            ),
        };

        let compression = explicit_compression.unwrap_or(detected_compression);

        let raw_size = match (&payload, compression.is_compressed()) {
            (DescriptorPayload::File(_), true) => {
                raw_size.map(|size| size.saturating_mul(COMPRESSED_SIZE_FACTOR))
            }
            _ => raw_size,
        };

        let format = match properties.format {
            Some(format) => format,
            None => infer_format(&source_name)
                .ok_or_else(|| FormatInferenceSnafu { source_name: &source_name }.build())?,
        };

        Ok(IngestionDescriptor {
            operation_id,
            payload,
            source_name,
            raw_size,
            format,
            compression,
            properties,
        })
    }
}

impl DescriptorError {
    pub fn is_format_inference(&self) -> bool {
        matches!(self, Self::FormatInference { .. })
    }

    pub fn is_source_not_found(&self) -> bool {
        matches!(self, Self::SourceNotFound { .. } | Self::NotAFile { .. })
    }
}

impl IngestionDescriptor {
    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn payload(&self) -> &DescriptorPayload {
        &self.payload
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn raw_size(&self) -> Option<u64> {
        self.raw_size
    }

    /// Size is unknown for streams without a size hint and blobs without a declared size.
    pub fn size_unknown(&self) -> bool {
        self.raw_size.is_none()
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    pub fn properties(&self) -> &IngestionProperties {
        &self.properties
    }

    pub fn database(&self) -> &str {
        &self.properties.database
    }

    pub fn table(&self) -> &str {
        &self.properties.table
    }

    pub fn is_blob(&self) -> bool {
        matches!(self.payload, DescriptorPayload::Blob(_))
    }

    /// Whether the payload should be gzip compressed before staging.
    pub fn should_compress(&self) -> bool {
        self.format.is_compressible() && !self.compression.is_compressed()
    }

    /// Whether this descriptor can be sent on the streaming path at all.
    pub fn has_required_mapping(&self) -> bool {
        !self.format.requires_mapping_for_streaming() || self.properties.mapping.is_some()
    }

    /// Read a stream payload into memory, leaving other payloads untouched.
    ///
    /// A declared size hint is replaced by the number of bytes actually read.
    /// An undeclared size stays unknown.
    pub async fn buffered(self) -> DescriptorResult<Self> {
        let (payload, raw_size) = match self.payload {
            DescriptorPayload::Reader(reader) => {
                let data = reader.read_to_end().await.context(ReadStreamSnafu)?;
                let raw_size = self.raw_size.map(|_| data.len() as u64);
                (DescriptorPayload::Buffer(data), raw_size)
            }
            other => (other, self.raw_size),
        };
        Ok(Self {
            payload,
            raw_size,
            ..self
        })
    }

    /// The payload bytes, `None` for blob references.
    pub async fn read_payload(&self) -> std::io::Result<Option<Bytes>> {
        match &self.payload {
            DescriptorPayload::File(path) => tokio::fs::read(path).await.map(|d| Some(d.into())),
            DescriptorPayload::Buffer(data) => Ok(Some(data.clone())),
            DescriptorPayload::Blob(_) => Ok(None),
            DescriptorPayload::Reader(_) => Err(std::io::Error::other(
                "stream payload must be buffered before it is read",
            )),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn infer_format(name: &str) -> Option<DataFormat> {
    let lower = name.to_ascii_lowercase();
    let stem = lower
        .strip_suffix(".gz")
        .or_else(|| lower.strip_suffix(".zip"))
        .unwrap_or(&lower);
    let (_, extension) = stem.rsplit_once('.')?;
    DataFormat::from_extension(extension)
}
