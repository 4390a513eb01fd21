use thiserror::Error;

use crate::types::ElementType;

#[derive(Error, Debug)]
pub enum CumulusError {
    // Storage errors
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("storage path error: {0}")]
    StoragePath(#[from] object_store::path::Error),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // Schema / shape errors
    #[error("schema mismatch: expected element type {expected}, got {actual}")]
    SchemaMismatch {
        expected: ElementType,
        actual: ElementType,
    },

    #[error("malformed array schema: {0}")]
    MalformedSchema(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    // Index errors
    #[error("invalid partitioning: {0}")]
    InvalidPartitioning(String),

    #[error(
        "partition {partition} spans {columns} columns, exceeding the \
         {upper_bound}-column window"
    )]
    PartitionTooLarge {
        partition: usize,
        columns: usize,
        upper_bound: usize,
    },

    #[error("empty input: {0}")]
    EmptyInput(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CumulusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formatting() {
        let err = CumulusError::NotFound {
            key: "group/centroids".into(),
        };
        assert!(err.to_string().contains("group/centroids"));

        let err = CumulusError::ShapeMismatch {
            expected: 128,
            actual: 64,
        };
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("64"));

        let err = CumulusError::PartitionTooLarge {
            partition: 3,
            columns: 900,
            upper_bound: 512,
        };
        let msg = err.to_string();
        assert!(msg.contains('3'));
        assert!(msg.contains("900"));
        assert!(msg.contains("512"));
    }

    #[test]
    fn test_schema_mismatch_names_both_types() {
        let err = CumulusError::SchemaMismatch {
            expected: ElementType::Float32,
            actual: ElementType::Uint8,
        };
        let msg = err.to_string();
        assert!(msg.contains("float32"));
        assert!(msg.contains("uint8"));
    }
}
