mod descriptor;
mod format;
mod message;
mod operation;
mod properties;
mod source;
mod staged;
mod status;

pub use self::{
    descriptor::{
        DescriptorBuilder, DescriptorError, DescriptorPayload, DescriptorResult,
        IngestionDescriptor,
    },
    format::{CompressionType, DataFormat, IngestionMappingKind, ParseDataFormatError},
    message::{AdditionalProperties, IngestionMessage},
    operation::OperationId,
    properties::{
        ColumnMapping, IngestionMapping, IngestionProperties, ReportLevel, ReportMethod,
        ValidationImplications, ValidationOptions, ValidationPolicy,
    },
    source::{IngestionSource, SourceKind, SourceReader},
    staged::{
        IngestionResources, ResourceKind, StagedResource, StagedResourceError, obfuscate_query,
    },
    status::{FailureKind, IngestionState, IngestionStatus},
};
