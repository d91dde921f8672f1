//! Domain error taxonomy.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed submission, rejected before any Job row exists.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A batch could not be split into tasks; job-level failure.
    #[error("Decomposition failed: {0}")]
    Decomposition(String),

    #[error("Entity not found: {entity} {id}")]
    NotFound {
        entity: &'static str,
        id: uuid::Uuid,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
