//! RFC 6238 time-based one-time passwords

use std::time::{SystemTime, UNIX_EPOCH};

use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, TOTP};
use tracing::trace;

use crate::error::{OtpError, OtpResult};
use crate::secret::SharedSecret;

/// Digits in a code, as used by authenticator apps
pub const DEFAULT_DIGITS: usize = 6;

/// Seconds per time step
pub const DEFAULT_STEP: u64 = 30;

/// Adjacent steps accepted on each side by [`TotpGenerator::verify_at`]
pub const DEFAULT_SKEW: u8 = 1;

/// HMAC hash used for the one-time password
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    fn as_totp(self) -> Algorithm {
        match self {
            HashAlgorithm::Sha1 => Algorithm::SHA1,
            HashAlgorithm::Sha256 => Algorithm::SHA256,
            HashAlgorithm::Sha512 => Algorithm::SHA512,
        }
    }
}

/// Parameters of a TOTP generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotpParams {
    pub digits: usize,
    pub step: u64,
    pub skew: u8,
    pub algorithm: HashAlgorithm,
}

impl Default for TotpParams {
    fn default() -> Self {
        Self {
            digits: DEFAULT_DIGITS,
            step: DEFAULT_STEP,
            skew: DEFAULT_SKEW,
            algorithm: HashAlgorithm::Sha1,
        }
    }
}

impl TotpParams {
    fn validate(&self) -> OtpResult<()> {
        if !(6..=8).contains(&self.digits) {
            return Err(OtpError::InvalidConfig(format!(
                "digits must be between 6 and 8, got {}",
                self.digits
            )));
        }
        if self.step == 0 {
            return Err(OtpError::InvalidConfig("step must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Generates and checks codes for one shared secret.
pub struct TotpGenerator {
    totp: TOTP,
    params: TotpParams,
}

impl TotpGenerator {
    /// SHA-1, 6 digits, 30 second steps.
    pub fn new(secret: &SharedSecret) -> Self {
        Self::build(secret, TotpParams::default())
    }

    pub fn with_params(secret: &SharedSecret, params: TotpParams) -> OtpResult<Self> {
        params.validate()?;
        Ok(Self::build(secret, params))
    }

    fn build(secret: &SharedSecret, params: TotpParams) -> Self {
        // accepts enrollment secrets shorter than 128 bits (10-byte keys)
        let totp = TOTP::new_unchecked(
            params.algorithm.as_totp(),
            params.digits,
            params.skew,
            params.step,
            secret.as_bytes().to_vec(),
        );
        Self { totp, params }
    }

    pub fn params(&self) -> &TotpParams {
        &self.params
    }

    /// Time step counter for a Unix timestamp.
    pub fn counter_at(&self, unix_secs: u64) -> u64 {
        unix_secs / self.params.step
    }

    /// Seconds left before the code for `unix_secs` rolls over.
    pub fn seconds_remaining_at(&self, unix_secs: u64) -> u64 {
        self.params.step - unix_secs % self.params.step
    }

    /// Code for a fixed Unix timestamp.
    pub fn generate_at(&self, unix_secs: u64) -> String {
        let code = self.totp.generate(unix_secs);
        trace!(counter = self.counter_at(unix_secs), "generated TOTP code");
        code
    }

    /// Code for the current wall-clock time.
    pub fn generate_now(&self) -> String {
        self.generate_at(now_unix())
    }

    /// Accept `code` if it matches the step of `unix_secs` or one within `skew` steps of it.
    pub fn verify_at(&self, code: &str, unix_secs: u64) -> bool {
        let code = code.trim();
        if code.len() != self.params.digits || !code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }

        let counter = self.counter_at(unix_secs);
        let skew = u64::from(self.params.skew);
        let first = counter.saturating_sub(skew);
        let last = counter.saturating_add(skew);

        (first..=last)
            .filter_map(|c| c.checked_mul(self.params.step))
            .any(|t| bool::from(self.totp.generate(t).as_bytes().ct_eq(code.as_bytes())))
    }

    pub fn verify_now(&self, code: &str) -> bool {
        self.verify_at(code, now_unix())
    }
}

/// Current Unix time in seconds. A clock before the epoch reads as zero.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current 6-digit code for a Base32 secret.
pub fn generate_code(secret: &str) -> OtpResult<String> {
    generate_code_at(secret, now_unix())
}

/// 6-digit code for a Base32 secret at a fixed Unix timestamp.
pub fn generate_code_at(secret: &str, unix_secs: u64) -> OtpResult<String> {
    let secret = SharedSecret::parse(secret)?;
    Ok(TotpGenerator::new(&secret).generate_at(unix_secs))
}

/// Check a 6-digit code against the current, previous and next step.
pub fn verify_code(secret: &str, code: &str) -> OtpResult<bool> {
    verify_code_at(secret, code, now_unix())
}

pub fn verify_code_at(secret: &str, code: &str, unix_secs: u64) -> OtpResult<bool> {
    let secret = SharedSecret::parse(secret)?;
    Ok(TotpGenerator::new(&secret).verify_at(code, unix_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_rfc_vector_six_digits() {
        assert_eq!(generate_code_at(RFC_SECRET, 59).unwrap(), "287082");
    }

    #[test]
    fn test_same_step_same_code() {
        let t = 30 * 55_555_555;
        let a = generate_code_at("JBSWY3DPEHPK3PXP", t).unwrap();
        let b = generate_code_at("JBSWY3DPEHPK3PXP", t + 29).unwrap();
        let c = generate_code_at("JBSWY3DPEHPK3PXP", t + 30).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_counter_and_remaining() {
        let secret = SharedSecret::parse(RFC_SECRET).unwrap();
        let gen = TotpGenerator::new(&secret);
        assert_eq!(gen.counter_at(59), 1);
        assert_eq!(gen.seconds_remaining_at(59), 1);
        assert_eq!(gen.seconds_remaining_at(60), 30);
    }

    #[test]
    fn test_verify_accepts_adjacent_steps_only() {
        let secret = SharedSecret::parse(RFC_SECRET).unwrap();
        let gen = TotpGenerator::new(&secret);
        let t = 1_111_111_109;
        let code = gen.generate_at(t);

        assert!(gen.verify_at(&code, t));
        assert!(gen.verify_at(&code, t + 30));
        assert!(gen.verify_at(&code, t - 30));
        assert!(!gen.verify_at(&code, t + 90));
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let secret = SharedSecret::parse(RFC_SECRET).unwrap();
        let gen = TotpGenerator::new(&secret);
        assert!(!gen.verify_at("", 59));
        assert!(!gen.verify_at("28708", 59));
        assert!(!gen.verify_at("2870821", 59));
        assert!(!gen.verify_at("28708a", 59));
        assert!(gen.verify_at(" 287082 ", 59));
    }

    #[test]
    fn test_verify_near_epoch_does_not_underflow() {
        let secret = SharedSecret::parse(RFC_SECRET).unwrap();
        let gen = TotpGenerator::new(&secret);
        let code = gen.generate_at(0);
        assert!(gen.verify_at(&code, 0));
    }

    #[test]
    fn test_verify_near_end_of_time_does_not_overflow() {
        let secret = SharedSecret::parse(RFC_SECRET).unwrap();
        let gen = TotpGenerator::new(&secret);
        let t = u64::MAX - 5;
        let code = gen.generate_at(gen.counter_at(t) * DEFAULT_STEP);
        assert!(gen.verify_at(&code, t));
    }

    #[test]
    fn test_invalid_params() {
        let secret = SharedSecret::parse(RFC_SECRET).unwrap();
        let bad_digits = TotpParams { digits: 4, ..Default::default() };
        let bad_step = TotpParams { step: 0, ..Default::default() };
        assert!(matches!(
            TotpGenerator::with_params(&secret, bad_digits),
            Err(OtpError::InvalidConfig(_))
        ));
        assert!(matches!(
            TotpGenerator::with_params(&secret, bad_step),
            Err(OtpError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_unix() > 1_577_836_800);
    }
}
