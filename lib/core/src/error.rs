use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Entity already indexed: {0}")]
    DuplicateEntity(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Invalid signature length: expected {expected}, got {actual}")]
    SignatureLength { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Build cancelled after {processed} entities")]
    Cancelled { processed: usize },
}

/// Lifecycle violations of the similarity index.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    #[error("index is frozen, no further inserts are accepted")]
    Frozen,

    #[error("index has not been frozen yet")]
    NotFrozen,
}

/// Malformed schema or feature records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema declares no features")]
    EmptySchema,

    #[error("feature '{0}' is declared more than once")]
    DuplicateFeature(String),

    #[error("feature '{0}' collides with the id column")]
    IdColumnIsFeature(String),

    #[error("row {row}: missing id column '{column}'")]
    MissingId { row: usize, column: String },

    #[error("row {row}: id column '{column}' must be a string or unsigned integer")]
    InvalidId { row: usize, column: String },

    #[error("duplicate entity id: {0}")]
    DuplicateId(String),

    #[error("row {row}: expected a JSON object")]
    NotAnObject { row: usize },

    #[error("entity {entity}: expected {expected} feature values, got {actual}")]
    Arity {
        entity: String,
        expected: usize,
        actual: usize,
    },

    #[error("entity {entity}: missing feature '{feature}'")]
    MissingFeature { entity: String, feature: String },

    #[error("entity {entity}: feature '{feature}' is declared {expected} but holds another kind")]
    KindMismatch {
        entity: String,
        feature: String,
        expected: &'static str,
    },

    #[error("entity {entity}: feature '{feature}' holds a nested or unsupported value")]
    UnsupportedValue { entity: String, feature: String },
}
