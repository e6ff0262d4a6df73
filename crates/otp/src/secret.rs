//! Base32 shared secrets as issued at 2FA enrollment

use std::fmt;
use std::str::FromStr;

use data_encoding::{Encoding, Specification, BASE32_NOPAD};
use once_cell::sync::Lazy;

use crate::error::{OtpError, OtpResult};

const ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 Base32 without padding that tolerates non-zero trailing bits,
/// so secrets typed by hand decode the same way authenticator apps read them.
static LENIENT_BASE32: Lazy<Encoding> = Lazy::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str(ALPHABET);
    spec.check_trailing_bits = false;
    spec.encoding().expect("static base32 specification is valid")
});

/// A decoded TOTP shared secret.
///
/// Parsing ignores whitespace, strips trailing `=` padding and accepts lower
/// case. Symbols that cannot complete a byte at the end are discarded.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret {
    bytes: Vec<u8>,
}

impl SharedSecret {
    /// Parse a Base32 secret as shown on the enrollment screen.
    pub fn parse(input: &str) -> OtpResult<Self> {
        let mut symbols = normalize(input);

        if let Some((pos, c)) = symbols.char_indices().find(|(_, c)| !ALPHABET.contains(*c)) {
            return Err(OtpError::InvalidSecret(format!(
                "character {:?} at position {} is outside the Base32 alphabet",
                c, pos
            )));
        }

        // 1, 3 and 6 trailing symbols carry fewer bits than the next byte
        // needs; the last one contributes nothing.
        if matches!(symbols.len() % 8, 1 | 3 | 6) {
            symbols.pop();
        }

        let bytes = LENIENT_BASE32
            .decode(symbols.as_bytes())
            .map_err(|e| OtpError::InvalidSecret(e.to_string()))?;

        if bytes.is_empty() {
            return Err(OtpError::InvalidSecret("secret decodes to zero bytes".to_string()));
        }

        Ok(Self { bytes })
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> OtpResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(OtpError::InvalidSecret("secret is empty".to_string()));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Canonical form: upper case, no padding.
    pub fn to_base32(&self) -> String {
        BASE32_NOPAD.encode(&self.bytes)
    }
}

impl FromStr for SharedSecret {
    type Err = OtpError;

    fn from_str(s: &str) -> OtpResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

fn normalize(input: &str) -> String {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    compact.trim_end_matches('=').to_ascii_uppercase()
}
