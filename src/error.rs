use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid URL {input:?}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("link {0:?} not found")]
    NotFound(String),

    #[error("no free short code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl RegistryError {
    pub(crate) fn invalid_url(input: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidUrl {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;
