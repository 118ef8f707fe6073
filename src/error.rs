//! Error types for the embedding pipeline.

use thiserror::Error;

/// Invalid or missing configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("input should be a path to json file only")]
    Usage,

    #[error("{key} was not supplied through json")]
    MissingKey { key: &'static str },

    #[error("given {key} is not {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("dictionary is empty")]
    EmptyDictionary,

    /// The highest vocabulary id plus the reserved range does not fit a token id.
    #[error("vocabulary id {max_id} does not fit above {reserved} reserved tokens")]
    VocabularyOverflow { max_id: u16, reserved: u16 },
}

impl ConfigError {
    pub fn invalid_value(key: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenizeError {
    #[error("max token length must be at least 1, got {0}")]
    MaxTokenLenOutOfRange(usize),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("tokenizer error: {0}")]
    Tokenize(#[from] TokenizeError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("could not write npy output: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),
}

pub type Result<T> = std::result::Result<T, Error>;
