//! Pipeline error taxonomy.
//!
//! Soft errors (`bad_csrf_token`, `invalid_grant`, `session_expired`) are
//! rendered back into the same form with an alert so the user can retry.
//! Hard protocol errors keep the grant backend's status. Fatal errors are
//! logged with detail and surface as a generic `server_error`; internal
//! detail never reaches the client.

use axum::http::StatusCode;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    BadCsrfToken,
    InvalidGrant,
    SessionExpired,
    InvalidRequest,
    InvalidClient,
    InvalidToken,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    ServerError,
}

impl ErrorKind {
    /// OAuth2-style error name, part of the wire contract.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BadCsrfToken => "bad_csrf_token",
            Self::InvalidGrant => "invalid_grant",
            Self::SessionExpired => "session_expired",
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidToken => "invalid_token",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::ServerError => "server_error",
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthError {
    pub kind: ErrorKind,
    pub status: StatusCode,
    detail: Option<String>,
}

impl AuthError {
    pub const fn new(kind: ErrorKind, status: StatusCode) -> Self {
        Self {
            kind,
            status,
            detail: None,
        }
    }

    pub fn bad_csrf_token() -> Self {
        Self::new(ErrorKind::BadCsrfToken, StatusCode::BAD_REQUEST)
    }

    pub fn invalid_grant() -> Self {
        Self::new(ErrorKind::InvalidGrant, StatusCode::BAD_REQUEST)
    }

    pub fn session_expired() -> Self {
        Self::new(ErrorKind::SessionExpired, StatusCode::OK)
    }

    pub fn invalid_request() -> Self {
        Self::new(ErrorKind::InvalidRequest, StatusCode::UNAUTHORIZED)
    }

    pub fn invalid_client() -> Self {
        Self::new(ErrorKind::InvalidClient, StatusCode::UNAUTHORIZED)
    }

    pub fn invalid_token() -> Self {
        Self::new(ErrorKind::InvalidToken, StatusCode::UNAUTHORIZED)
    }

    pub fn unauthorized_client() -> Self {
        Self::new(ErrorKind::UnauthorizedClient, StatusCode::UNAUTHORIZED)
    }

    pub fn unsupported_grant_type() -> Self {
        Self::new(ErrorKind::UnsupportedGrantType, StatusCode::BAD_REQUEST)
    }

    pub fn unsupported_response_type() -> Self {
        Self::new(ErrorKind::UnsupportedResponseType, StatusCode::BAD_REQUEST)
    }

    pub fn server_error(detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ServerError,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: Some(detail.into()),
        }
    }

    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Soft errors leave the user on a retryable form rendered at 200.
    pub fn is_soft(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::BadCsrfToken | ErrorKind::InvalidGrant | ErrorKind::SessionExpired
        )
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    /// Internal detail for logs only.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind.as_str()),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::server_error(format!("{err:#}"))
    }
}
