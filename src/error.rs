//! Error types shared by the generation, progress and stats layers

use thiserror::Error;

/// Errors surfaced by the core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("module {module_id} has {found} words, at least {required} are needed to generate exercises")]
    InsufficientVocabulary {
        module_id: i64,
        found: usize,
        required: usize,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("module {module_id} has exercises with recorded attempts, refusing to replace them")]
    ExercisesInUse { module_id: i64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }
}

#[cfg(feature = "python")]
impl From<CoreError> for pyo3::PyErr {
    fn from(err: CoreError) -> Self {
        use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
        match err {
            CoreError::NotFound(_) => PyKeyError::new_err(err.to_string()),
            CoreError::InsufficientVocabulary { .. }
            | CoreError::ExercisesInUse { .. }
            | CoreError::Config(_) => PyValueError::new_err(err.to_string()),
            CoreError::Database(_) | CoreError::Serialization(_) => PyRuntimeError::new_err(err.to_string()),
        }
    }
}
