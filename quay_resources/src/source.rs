use std::{fmt, path::PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{format::CompressionType, operation::OperationId};

/// An async byte stream supplied by the caller.
pub struct SourceReader(Box<dyn AsyncRead + Send + Sync + Unpin>);

/// Where the data of an ingestion comes from.
#[derive(Debug)]
pub enum SourceKind {
    /// A file on the local file system.
    File(PathBuf),
    /// A blob that already lives in storage, referenced by uri.
    Blob { uri: String, raw_size: Option<u64> },
    /// An in-memory buffer.
    Buffer(Bytes),
    /// A stream. Without a size hint its size is unknown.
    Reader {
        reader: SourceReader,
        size_hint: Option<u64>,
    },
}

#[derive(Debug)]
pub struct IngestionSource {
    pub kind: SourceKind,
    pub compression: Option<CompressionType>,
    pub source_id: Option<OperationId>,
}

impl SourceReader {
    pub fn new(reader: impl AsyncRead + Send + Sync + Unpin + 'static) -> Self {
        Self(Box::new(reader))
    }

    /// Read the stream to its end.
    pub async fn read_to_end(mut self) -> std::io::Result<Bytes> {
        let mut buf = Vec::new();
        self.0.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for SourceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SourceReader(..)")
    }
}

impl IngestionSource {
    fn with_kind(kind: SourceKind) -> Self {
        Self {
            kind,
            compression: None,
            source_id: None,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::with_kind(SourceKind::File(path.into()))
    }

    pub fn from_blob(uri: impl Into<String>, raw_size: Option<u64>) -> Self {
        Self::with_kind(SourceKind::Blob {
            uri: uri.into(),
            raw_size,
        })
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::with_kind(SourceKind::Buffer(data.into()))
    }

    pub fn from_reader(
        reader: impl AsyncRead + Send + Sync + Unpin + 'static,
        size_hint: Option<u64>,
    ) -> Self {
        Self::with_kind(SourceKind::Reader {
            reader: SourceReader::new(reader),
            size_hint,
        })
    }

    /// Declare the compression of the source bytes, overriding suffix detection.
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Use a caller supplied operation id instead of minting one.
    pub fn with_source_id(mut self, source_id: OperationId) -> Self {
        self.source_id = Some(source_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_reads_to_end() {
        let source = IngestionSource::from_reader(&b"a,b\n1,2\n"[..], None);
        let SourceKind::Reader { reader, size_hint } = source.kind else {
            panic!("expected reader source");
        };
        assert_eq!(size_hint, None);
        let data = reader.read_to_end().await.unwrap();
        assert_eq!(&data[..], b"a,b\n1,2\n");
    }
}
