use thiserror::Error;

/// Reasons a session token is rejected or could not be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Access token not found")]
    Missing,

    #[error("Access token has expired")]
    Expired,

    #[error("Invalid access token")]
    Invalid,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl SessionError {
    /// Same failure, worded for the refresh token.
    pub fn refresh_message(&self) -> &'static str {
        match self {
            SessionError::Missing => "Refresh token not found",
            SessionError::Expired => "Refresh token has expired",
            SessionError::Invalid => "Invalid refresh token",
            SessionError::Signing(_) => "Refresh token verification failed",
        }
    }
}

/// Password hashing failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Password hashing failed: {0}")]
pub struct PasswordError(pub String);
