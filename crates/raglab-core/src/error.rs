use thiserror::Error;

/// Typed failure surfaced by the engine.
///
/// Every variant carries a short user-facing message; the embedding and
/// store variants also keep the underlying technical detail, unmasked.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding failed: {message}")]
    EmbeddingFailure { message: String, detail: Option<String> },

    #[error("Store operation failed: {message}")]
    StoreFailure { message: String, detail: Option<String> },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn embedding(msg: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::EmbeddingFailure { message: msg.into(), detail: Some(detail.to_string()) }
    }

    pub fn store(msg: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::StoreFailure { message: msg.into(), detail: Some(detail.to_string()) }
    }

    /// The short message meant for the person at the keyboard.
    pub fn user_message(&self) -> &str {
        match self {
            Self::InvalidInput(m) | Self::InvalidConfig(m) => m,
            Self::EmbeddingFailure { message, .. } | Self::StoreFailure { message, .. } => message,
        }
    }

    /// Diagnostic detail from the failing collaborator, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::EmbeddingFailure { detail, .. } | Self::StoreFailure { detail, .. } => detail.as_deref(),
            Self::InvalidInput(_) | Self::InvalidConfig(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
