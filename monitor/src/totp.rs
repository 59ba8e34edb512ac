//! Time-based one-time passwords (RFC 6238).
//!
//! HMAC-SHA1 over a 30-second counter, 6 digits, with a base32 seed as shown
//! by authenticator enrolment screens.

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

/// Length of one TOTP window in seconds.
pub const TIME_STEP_SECS: u64 = 30;

/// Number of digits in a generated code.
pub const DIGITS: u32 = 6;

/// Errors raised while generating a code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TotpError {
    /// The seed is not valid base32.
    #[error("TOTP secret is not valid base32: {0}")]
    InvalidSecret(String),

    /// The seed decoded to zero bytes.
    #[error("TOTP secret is empty")]
    EmptySecret,
}

/// Decodes a user-supplied base32 seed.
///
/// Whitespace and `=` padding are ignored and the seed is upper-cased first.
///
/// # Errors
///
/// Returns [`TotpError`] if the seed is empty or not base32.
pub fn decode_secret(secret: &str) -> Result<Vec<u8>, TotpError> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let key = BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|e| TotpError::InvalidSecret(e.to_string()))?;

    if key.is_empty() {
        return Err(TotpError::EmptySecret);
    }
    Ok(key)
}

/// Generates the code valid at `unix_secs`.
///
/// # Errors
///
/// Returns [`TotpError`] if the seed cannot be decoded.
pub fn generate(secret: &str, unix_secs: u64) -> Result<String, TotpError> {
    let key = decode_secret(secret)?;
    hotp(&key, unix_secs / TIME_STEP_SECS)
}

/// Generates the code valid now.
///
/// # Errors
///
/// Returns [`TotpError`] if the seed cannot be decoded.
pub fn generate_now(secret: &str) -> Result<String, TotpError> {
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
    generate(secret, now)
}

/// HOTP (RFC 4226) with dynamic truncation.
fn hotp(key: &[u8], counter: u64) -> Result<String, TotpError> {
    let mut mac =
        HmacSha1::new_from_slice(key).map_err(|e| TotpError::InvalidSecret(e.to_string()))?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);

    let code = binary % 10u32.pow(DIGITS);
    Ok(format!("{code:0width$}", width = DIGITS as usize))
}
