use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

/// Failures surfaced by the credential and image layers.
///
/// Handlers map these to responses; infrastructure variants never leak their
/// detail to the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found")]
    NotFound,

    #[error("password reset token expired")]
    Expired,

    #[error("invalid image file: {filename}")]
    InvalidFile { filename: String },

    #[error("email address is already taken")]
    EmailTaken,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("entropy source failure: {0}")]
    Entropy(#[from] rand::Error),

    #[error("password hashing error: {0}")]
    Hashing(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_file(filename: impl Into<String>) -> Self {
        Error::InvalidFile {
            filename: filename.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Expired | Error::InvalidFile { .. } => StatusCode::BAD_REQUEST,
            Error::EmailTaken => StatusCode::CONFLICT,
            Error::Storage(_) | Error::Filesystem(_) | Error::Entropy(_) | Error::Hashing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<Error> for (StatusCode, String) {
    fn from(err: Error) -> Self {
        let status = err.status();
        let body = match &err {
            Error::NotFound => "Not found".to_string(),
            Error::Expired => "Reset link has expired, request a new one".to_string(),
            Error::InvalidFile { filename } => format!("{filename} is not a valid image"),
            Error::EmailTaken => "Email already registered".to_string(),
            _ => {
                error!(error = %err, "internal error");
                "Something went wrong".to_string()
            }
        };
        (status, body)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        <(StatusCode, String)>::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_recoverable_errors_to_client_statuses() {
        assert_eq!(Error::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Expired.status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::invalid_file("a.txt").status(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::EmailTaken.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn infrastructure_errors_are_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        assert_eq!(
            Error::from(io).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Hashing("bad".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "/srv/images/secret path");
        let (status, body) = <(StatusCode, String)>::from(Error::from(io));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.contains("secret"));
    }

    #[test]
    fn invalid_file_names_the_file() {
        let err = Error::invalid_file("notes.txt");
        assert!(err.to_string().contains("notes.txt"));
    }
}
