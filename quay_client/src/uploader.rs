//! Staging of payloads into containers.
//!
//! Blobs are named `<database>__<table>__<operation id>__<source name>`, with
//! `.gz` appended when the client compressed the payload. Each upload attempt
//! goes to the next container in rank order.

use std::{io::Write, sync::Arc};

use bytes::Bytes;
use flate2::{Compression, write::GzEncoder};
use object_store::{PutPayload, path::Path as ObjectPath};
use quay_control_plane::BackendError;
use quay_resources::{IngestionDescriptor, StagedResource};
use snafu::ResultExt;
use tracing::{debug, warn};
use url::Url;

use crate::{
    client::ClientCore,
    error::{IngestError, ResourceDiscoverySnafu, Result},
};

/// A blob this client uploaded.
#[derive(Debug, Clone)]
pub(crate) struct StagedBlob {
    pub container: Arc<StagedResource>,
    pub path: ObjectPath,
    pub uri: Url,
}

pub(crate) fn blob_name(descriptor: &IngestionDescriptor) -> String {
    let mut name = format!(
        "{}__{}__{}__{}",
        descriptor.database(),
        descriptor.table(),
        descriptor.operation_id(),
        descriptor.source_name()
    );
    if descriptor.should_compress() {
        name.push_str(".gz");
    }
    name
}

pub(crate) async fn gzip(payload: Bytes) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || {
        let buf = Vec::with_capacity(payload.len() / 4);
        let mut encoder = GzEncoder::new(buf, Compression::default());
        encoder.write_all(&payload)?;
        encoder.finish().map(Bytes::from)
    })
    .await
    .map_err(|err| IngestError::Internal {
        message: format!("compression task failed: {err}"),
    })?
    .map_err(|source| IngestError::ReadSource { source })
}

pub(crate) fn backend_error(err: object_store::Error) -> BackendError {
    match &err {
        object_store::Error::NotFound { path, .. } => BackendError::NotFound {
            resource: "container",
            message: path.clone(),
        },
        object_store::Error::PermissionDenied { .. }
        | object_store::Error::Unauthenticated { .. } => BackendError::Unauthorized {
            message: err.to_string(),
        },
        object_store::Error::NotSupported { .. } | object_store::Error::NotImplemented => {
            BackendError::Internal {
                message: err.to_string(),
            }
        }
        _ => BackendError::Transport {
            message: err.to_string(),
        },
    }
}

impl ClientCore {
    /// Upload `payload` for `descriptor`, compressing it when its format allows.
    pub(crate) async fn stage(
        &self,
        descriptor: &IngestionDescriptor,
        payload: Bytes,
    ) -> Result<StagedBlob> {
        let data = if descriptor.should_compress() {
            gzip(payload).await?
        } else {
            payload
        };
        let name = blob_name(descriptor);

        let containers = self
            .backend
            .resources
            .containers()
            .await
            .context(ResourceDiscoverySnafu)?;
        if containers.is_empty() {
            return Err(IngestError::Internal {
                message: "no staging container available".to_string(),
            });
        }

        let (containers, name, data) = (&containers, &name, &data);
        let staged = self
            .options
            .transport_retry
            .run(
                "upload_blob",
                |attempt| async move {
                    if attempt > 0 {
                        self.count_retry("upload_blob");
                    }
                    let container = &containers[attempt % containers.len()];
                    let result = self.upload_to(container, name, data.clone()).await;
                    self.backend
                        .resources
                        .report_result(container, result.as_ref().map(|_| ()))
                        .await;
                    result
                },
                BackendError::is_retryable,
            )
            .await
            .map_err(|err| IngestError::from_backend("upload_blob", err))?;

        self.metrics.staged_bytes.record(data.len() as u64, &[]);
        debug!(blob = %staged.container, path = %staged.path, size = data.len(), "staged blob");

        Ok(staged)
    }

    async fn upload_to(
        &self,
        container: &Arc<StagedResource>,
        name: &str,
        data: Bytes,
    ) -> std::result::Result<StagedBlob, BackendError> {
        let store = self
            .backend
            .object_stores
            .create_object_store(container)
            .await
            .map_err(backend_error)?;

        let path = ObjectPath::from(name);
        store
            .put(&path, PutPayload::from(data))
            .await
            .map_err(backend_error)?;

        Ok(StagedBlob {
            container: container.clone(),
            path,
            uri: container.blob_uri(name),
        })
    }

    /// Remove a blob staged by a failed operation. Errors are only logged.
    pub(crate) async fn delete_staged(&self, blob: &StagedBlob) {
        let deleted = match self
            .backend
            .object_stores
            .create_object_store(&blob.container)
            .await
        {
            Ok(store) => store.delete(&blob.path).await,
            Err(err) => Err(err),
        };

        match deleted {
            Ok(()) => debug!(path = %blob.path, "deleted staged blob"),
            Err(err) => warn!(path = %blob.path, error = %err, "failed to delete staged blob"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use quay_resources::{DataFormat, DescriptorBuilder, IngestionProperties, IngestionSource};

    use super::*;

    #[tokio::test]
    async fn test_gzip_round_trip() {
        let compressed = gzip(Bytes::from_static(b"a,b\n1,2\n")).await.unwrap();
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "a,b\n1,2\n");
    }

    #[test]
    fn test_blob_name() {
        let descriptor = DescriptorBuilder::new()
            .build(
                IngestionSource::from_bytes("a"),
                IngestionProperties::new("db1", "t1").with_format(DataFormat::Csv),
            )
            .unwrap();
        assert_eq!(
            blob_name(&descriptor),
            format!("db1__t1__{}__buffer.gz", descriptor.operation_id())
        );

        let descriptor = DescriptorBuilder::new()
            .build(
                IngestionSource::from_bytes("a"),
                IngestionProperties::new("db1", "t1").with_format(DataFormat::Parquet),
            )
            .unwrap();
        assert!(!blob_name(&descriptor).ends_with(".gz"));
    }

    #[test]
    fn test_object_store_error_classification() {
        let err = backend_error(object_store::Error::NotFound {
            path: "x".into(),
            source: "missing".into(),
        });
        assert!(err.invalidates_resource());

        let err = backend_error(object_store::Error::Generic {
            store: "test",
            source: "connection reset".into(),
        });
        assert!(err.is_retryable());
    }
}
