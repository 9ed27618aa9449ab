//! Error types for the relay server

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use cipherpost_relay::{AuthError, RelayError};
use serde::Serialize;
use std::fmt;

/// Service error types
#[derive(Debug)]
pub enum ServiceError {
    /// Missing token or wrong credentials
    Unauthorized(String),
    /// Token present but invalid or expired
    Forbidden(String),
    /// Identity not found
    NotFound(String),
    /// Invalid request
    BadRequest(String),
    /// Storage error
    Storage(String),
    /// Internal error
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ServiceError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ServiceError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ServiceError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ServiceError::Storage(msg) => write!(f, "Storage error: {}", msg),
            ServiceError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl ServiceError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ServiceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ServiceError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ServiceError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, code) = self.status_and_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        })
    }
}

impl From<RelayError> for ServiceError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Auth(auth) => auth.into(),
            RelayError::IdentityNotFound(name) => ServiceError::NotFound(name),
            RelayError::InvalidEnvelope(_) | RelayError::UnknownIdentity(_) => {
                ServiceError::BadRequest(err.to_string())
            }
            RelayError::Persist(_) | RelayError::Storage(_) => ServiceError::Storage(err.to_string()),
            RelayError::Config(_) | RelayError::Internal(_) => ServiceError::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidCredentials => {
                ServiceError::Unauthorized(err.to_string())
            }
            AuthError::InvalidToken | AuthError::TokenExpired => {
                ServiceError::Forbidden(err.to_string())
            }
            AuthError::DuplicateUsername(_) | AuthError::InvalidInput(_) => {
                ServiceError::BadRequest(err.to_string())
            }
            AuthError::Hashing(_) => ServiceError::Internal(err.to_string()),
        }
    }
}

impl From<actix_web::error::BlockingError> for ServiceError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_status_codes() {
        let cases = [
            (AuthError::MissingToken, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidToken, StatusCode::FORBIDDEN),
            (AuthError::TokenExpired, StatusCode::FORBIDDEN),
            (AuthError::DuplicateUsername("bob".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            let err: ServiceError = RelayError::from(err).into();
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn test_not_found() {
        let err: ServiceError = RelayError::IdentityNotFound("carol".into()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
