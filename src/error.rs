use crate::auth::AuthError;
use crate::store::StoreError;

const GENERIC_MESSAGE: &str = "Something went wrong. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Rejected input. Nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("You are already a member of that group.")]
    AlreadyMember,

    #[error("{0}")]
    Unauthorized(String),

    #[error("Identity error: {0}")]
    Auth(#[from] AuthError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// True when the failure came from a collaborator rather than the user.
    pub fn is_collaborator_failure(&self) -> bool {
        match self {
            AppError::Store(_) => true,
            AppError::Auth(e) => !e.is_user_error(),
            _ => false,
        }
    }

    /// Message shown to the person who triggered the operation. Collaborator
    /// failures are logged here and replaced with a generic message.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Unauthorized(msg) => {
                msg.clone()
            }
            AppError::AlreadyMember => self.to_string(),
            AppError::Auth(e) if e.is_user_error() => e.to_string(),
            AppError::Auth(e) => {
                tracing::error!("Identity provider error: {}", e);
                GENERIC_MESSAGE.to_string()
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                GENERIC_MESSAGE.to_string()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
