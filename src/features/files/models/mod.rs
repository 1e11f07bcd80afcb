mod file;

pub use file::{
    normalize_tags, validate_metadata, FileChanges, FileMetadata, FileRecord, MetadataValue,
};
