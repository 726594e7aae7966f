//! The gateway's stable error taxonomy.
//!
//! Every variant maps to an HTTP status and a stable string code via
//! [`CfkError::http_status`]/[`CfkError::code`], and carries an `expose`
//! flag saying whether its message is safe to return to a caller.

use thiserror::Error;

pub type CfkResult<T> = Result<T, CfkError>;

#[derive(Error, Debug)]
pub enum CfkError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Locked: {0}")]
    Locked(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Driver error ({subcode}): {message}")]
    Driver { subcode: String, message: String, details: Option<String> },

    #[error("Upload session not found: {0}")]
    UploadSessionNotFound(String),

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CfkError {
    pub fn not_implemented(op: impl Into<String>) -> Self {
        CfkError::NotImplemented(op.into())
    }

    pub fn driver(subcode: impl Into<String>, message: impl Into<String>) -> Self {
        CfkError::Driver { subcode: subcode.into(), message: message.into(), details: None }
    }

    pub fn driver_with_details(
        subcode: impl Into<String>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        CfkError::Driver { subcode: subcode.into(), message: message.into(), details: Some(details.into()) }
    }

    /// Stable string code used in the JSON error envelope and in logs.
    pub fn code(&self) -> &'static str {
        match self {
            CfkError::Validation(_) => "VALIDATION_ERROR",
            CfkError::Unauthorized(_) => "UNAUTHORIZED",
            CfkError::Forbidden(_) => "FORBIDDEN",
            CfkError::NotFound(_) => "NOT_FOUND",
            CfkError::Conflict(_) => "CONFLICT",
            CfkError::PreconditionFailed(_) => "PRECONDITION_FAILED",
            CfkError::Locked(_) => "LOCKED",
            CfkError::NotImplemented(_) => "NOT_IMPLEMENTED",
            CfkError::Driver { .. } => "DRIVER_ERROR",
            CfkError::UploadSessionNotFound(_) => "UPLOAD_SESSION_NOT_FOUND",
            CfkError::Repository(_) => "REPOSITORY_ERROR",
            CfkError::Io(_) => "DRIVER_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            CfkError::Validation(_) => 400,
            CfkError::Unauthorized(_) => 401,
            CfkError::Forbidden(_) => 403,
            CfkError::NotFound(_) | CfkError::UploadSessionNotFound(_) => 404,
            CfkError::Conflict(_) => 409,
            CfkError::PreconditionFailed(_) => 412,
            CfkError::Locked(_) => 423,
            CfkError::NotImplemented(_) => 501,
            CfkError::Driver { .. } | CfkError::Io(_) => 500,
            CfkError::Repository(_) => 500,
        }
    }

    /// Whether the message text may be returned to an end user. Repository
    /// errors and raw IO errors may leak internal paths, so they are not.
    pub fn expose(&self) -> bool {
        !matches!(self, CfkError::Repository(_) | CfkError::Io(_))
    }
}
