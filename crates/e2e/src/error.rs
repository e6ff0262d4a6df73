//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Deployment not reachable at {url} after {attempts} attempts")]
    DeploymentUnreachable { url: String, attempts: usize },

    #[error("Playwright not found. Install with: npm i -D @playwright/test && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Driver exited unexpectedly: {0}")]
    DriverExited(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Step failed: {step} - {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Unknown variable: ${{{0}}}")]
    UnknownVariable(String),

    #[error("Fixture failed: {0}")]
    Fixture(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("OTP error: {0}")]
    Otp(#[from] custody_otp::OtpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
