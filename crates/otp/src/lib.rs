//! Custody OTP
//!
//! RFC 6238 one-time passwords for driving two-factor authentication in
//! end-to-end tests. A Base32 secret from the enrollment screen goes in, the
//! same 6-digit code an authenticator app would show comes out.
//!
//! ```
//! let code = custody_otp::generate_code_at("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ", 59).unwrap();
//! assert_eq!(code, "287082");
//! ```

pub mod error;
pub mod secret;
pub mod totp;

pub use error::{OtpError, OtpResult};
pub use secret::SharedSecret;
pub use totp::{
    generate_code, generate_code_at, now_unix, verify_code, verify_code_at, HashAlgorithm,
    TotpGenerator, TotpParams, DEFAULT_DIGITS, DEFAULT_SKEW, DEFAULT_STEP,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
