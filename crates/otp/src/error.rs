//! Error types for TOTP generation

use thiserror::Error;

/// Result type alias using [`OtpError`]
pub type OtpResult<T> = std::result::Result<T, OtpError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    /// The shared secret is not valid Base32 or decodes to nothing.
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    #[error("Invalid TOTP configuration: {0}")]
    InvalidConfig(String),
}
