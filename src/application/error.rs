use thiserror::Error;

use crate::{
    application::repos::RepoError, cache::StoreError, domain::error::DomainError,
    infra::error::InfraError, ranking::VoteError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("voting window for this post has closed")]
    VoteWindowExpired,
    #[error("vote already recorded in this direction")]
    DuplicateVote,
    #[error("only the author may modify this post")]
    Unauthorized,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store temporarily unavailable: {0}")]
    TransientStore(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "not_found",
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "validation"
            }
            AppError::VoteWindowExpired => "vote_window_expired",
            AppError::DuplicateVote => "duplicate_vote",
            AppError::Unauthorized => "unauthorized",
            AppError::TransientStore(_) | AppError::Infra(InfraError::Database { .. }) => {
                "transient_store"
            }
            AppError::Infra(_) => "infrastructure",
            AppError::Domain(DomainError::Invariant { .. }) | AppError::Unexpected(_) => {
                "unexpected"
            }
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == "transient_store"
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::TransientStore(err.to_string())
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found("record"),
            RepoError::InvalidInput { message } => Self::Validation(message),
            RepoError::Duplicate { constraint } => {
                Self::Validation(format!("duplicate record violates `{constraint}`"))
            }
            other => Self::TransientStore(other.to_string()),
        }
    }
}

impl From<VoteError> for AppError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::PostNotFound => Self::not_found("post"),
            VoteError::WindowExpired => Self::VoteWindowExpired,
            VoteError::Duplicate => Self::DuplicateVote,
            VoteError::Store(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_and_timeout_failures_are_transient() {
        assert!(AppError::from(StoreError::Timeout).is_transient());
        assert!(AppError::from(RepoError::Timeout).is_transient());
        assert!(!AppError::from(RepoError::NotFound).is_transient());
    }

    #[test]
    fn vote_errors_map_to_user_facing_variants() {
        assert!(matches!(
            AppError::from(VoteError::Duplicate),
            AppError::DuplicateVote
        ));
        assert!(matches!(
            AppError::from(VoteError::WindowExpired),
            AppError::VoteWindowExpired
        ));
        assert_eq!(AppError::from(VoteError::PostNotFound).kind(), "not_found");
    }
}
