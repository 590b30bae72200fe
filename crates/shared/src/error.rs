//! Application-wide error types.

use thiserror::Error;

/// Result type alias using `AppError`.
pub type AppResult<T> = Result<T, AppError>;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller lacks the role required for the taxpayer.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Duplicate checksum, invalid state transition, or mutation of an
    /// immutable declaration.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Precondition for an operation does not hold.
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// A source payload was rejected by its parser.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Forbidden(_) => 403,
            Self::Conflict(_) => 409,
            Self::Unprocessable(_) => 422,
            Self::Parse(_) => 400,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Unprocessable(_) => "UNPROCESSABLE",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status_code(), 404);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(AppError::Conflict("x".into()).status_code(), 409);
        assert_eq!(AppError::Unprocessable("x".into()).status_code(), 422);
        assert_eq!(AppError::Parse("x".into()).status_code(), 400);
        assert_eq!(AppError::Database("x".into()).status_code(), 500);
        assert_eq!(AppError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NotFound("x".into()).error_code(), "NOT_FOUND");
        assert_eq!(AppError::Conflict("x".into()).error_code(), "CONFLICT");
        assert_eq!(AppError::Parse("x".into()).error_code(), "PARSE_ERROR");
    }

    #[test]
    fn test_display_includes_message() {
        let err = AppError::Conflict("duplicate checksum".into());
        assert_eq!(err.to_string(), "Conflict: duplicate checksum");
    }
}
