use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;

use super::credentials::FieldErrors;

/// Sign-in or session check failure, carrying a message fit for display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Your session was rejected. Please sign in again.")]
    SessionRejected,

    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    #[error("You are not signed in")]
    NotAuthenticated,

    #[error("Unable to connect to server. Check your internet connection.")]
    Network(String),

    #[error("Connection timed out after {}s. Please try again.", .0.as_secs())]
    Timeout(Duration),

    #[error("Sign-in failed: {0}")]
    Provider(String),

    #[error("Sign-in was cancelled")]
    Cancelled,

    #[error("Sign-in was superseded by a newer request")]
    Superseded,
}

impl AuthError {
    /// Map a provider failure during sign-in.
    pub(crate) fn from_sign_in(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::AccessDenied(_) => AuthError::InvalidCredentials,
            other => Self::from_transport(other),
        }
    }

    /// Map a provider failure while re-validating an existing token.
    pub(crate) fn from_session_check(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::AccessDenied(_) => AuthError::SessionRejected,
            other => Self::from_transport(other),
        }
    }

    fn from_transport(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(e) => AuthError::Network(e.to_string()),
            other => AuthError::Provider(other.to_string()),
        }
    }
}

/// Outcome of a form submission that failed either locally or remotely.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] FieldErrors),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// A persisted session that could not be restored.
#[derive(Error, Debug)]
pub enum SessionRestoreError {
    #[error("Failed to read stored session: {0:#}")]
    Store(anyhow::Error),

    #[error("Failed to parse stored session: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Stored session has expired")]
    Expired,
}
