use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use snafu::{OptionExt, ResultExt, Snafu};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Queue,
    Container,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StagedResourceError {
    #[snafu(display("invalid resource uri '{uri}'"))]
    InvalidUri {
        uri: String,
        source: url::ParseError,
    },
    #[snafu(display("resource uri '{uri}' has no host"))]
    MissingHost { uri: String },
    #[snafu(display("resource uri '{uri}' has no object name"))]
    MissingObjectName { uri: String },
}

/// A queue or container handed out by the discovery service.
///
/// The uri carries a signature in its query string, which is never displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedResource {
    uri: Url,
    kind: ResourceKind,
    account: String,
    object_name: String,
    lease_expiry: Option<DateTime<Utc>>,
}

/// The staging resources returned by one discovery call.
#[derive(Debug, Clone, Default)]
pub struct IngestionResources {
    pub queues: Vec<Arc<StagedResource>>,
    pub containers: Vec<Arc<StagedResource>>,
}

impl StagedResource {
    /// Parse a resource uri of the form `https://<account>.<service>.<domain>/<object>?<signature>`.
    pub fn parse(uri: &str, kind: ResourceKind) -> Result<Self, StagedResourceError> {
        let url = Url::parse(uri).context(InvalidUriSnafu { uri })?;
        let host = url.host_str().context(MissingHostSnafu { uri })?;
        let account = host.split('.').next().unwrap_or(host).to_string();
        let object_name = url
            .path_segments()
            .and_then(|mut segments| segments.find(|s| !s.is_empty()))
            .map(ToString::to_string)
            .context(MissingObjectNameSnafu { uri })?;

        Ok(Self {
            uri: url,
            kind,
            account,
            object_name,
            lease_expiry: None,
        })
    }

    pub fn with_lease_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.lease_expiry = Some(expiry);
        self
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// The storage account the resource belongs to.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Queue or container name.
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn lease_expiry(&self) -> Option<DateTime<Utc>> {
        self.lease_expiry
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.lease_expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Full uri of a blob inside this container, keeping the container signature.
    pub fn blob_uri(&self, blob_name: &str) -> Url {
        let mut uri = self.uri.clone();
        if let Ok(mut segments) = uri.path_segments_mut() {
            segments.pop_if_empty().push(blob_name);
        }
        uri
    }
}

impl fmt::Display for StagedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", obfuscate_query(&self.uri))
    }
}

impl IngestionResources {
    pub fn new(queues: Vec<StagedResource>, containers: Vec<StagedResource>) -> Self {
        Self {
            queues: queues.into_iter().map(Arc::new).collect(),
            containers: containers.into_iter().map(Arc::new).collect(),
        }
    }

    /// Resources can only be used when there is somewhere to stage and somewhere to enqueue.
    pub fn is_applicable(&self) -> bool {
        !self.queues.is_empty() && !self.containers.is_empty()
    }
}

/// Render a uri with its query string masked.
pub fn obfuscate_query(uri: &Url) -> String {
    let mut masked = uri.clone();
    if masked.query().is_some() {
        masked.set_query(Some("***"));
    }
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container() {
        let res = StagedResource::parse(
            "https://acct1.blob.example.net/staging?sv=1&sig=abc",
            ResourceKind::Container,
        )
        .unwrap();

        assert_eq!(res.account(), "acct1");
        assert_eq!(res.object_name(), "staging");
        assert_eq!(
            res.to_string(),
            "https://acct1.blob.example.net/staging?***"
        );
    }

    #[test]
    fn test_blob_uri_keeps_signature() {
        let res = StagedResource::parse(
            "https://acct1.blob.example.net/staging?sig=abc",
            ResourceKind::Container,
        )
        .unwrap();

        let blob = res.blob_uri("db__t__id__data.csv.gz");
        assert_eq!(
            blob.as_str(),
            "https://acct1.blob.example.net/staging/db__t__id__data.csv.gz?sig=abc"
        );
    }

    #[test]
    fn test_missing_object_name() {
        let err =
            StagedResource::parse("https://acct1.queue.example.net/", ResourceKind::Queue)
                .unwrap_err();
        assert!(matches!(err, StagedResourceError::MissingObjectName { .. }));
    }

    #[test]
    fn test_applicable() {
        let queue =
            StagedResource::parse("https://a.queue.example.net/q", ResourceKind::Queue).unwrap();
        let container =
            StagedResource::parse("https://a.blob.example.net/c", ResourceKind::Container)
                .unwrap();

        assert!(!IngestionResources::new(vec![queue.clone()], vec![]).is_applicable());
        assert!(IngestionResources::new(vec![queue], vec![container]).is_applicable());
    }
}
