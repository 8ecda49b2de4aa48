//! Time-based one-time passwords (RFC 6238) for claiming the presenter role.
//!
//! A [`Totp`] derives a short numeric code from a shared secret and the
//! current time window. The code is recomputed on demand and never stored;
//! whoever can present the current code may drive the session.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE32;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};

/// Default number of digits in a code.
pub const DEFAULT_DIGITS: u32 = 6;

/// Default validity window in seconds.
pub const DEFAULT_PERIOD: u64 = 30;

/// Largest supported digit count. The truncated value is a 31-bit integer,
/// so more digits would only add leading zeros.
pub const MAX_DIGITS: u32 = 10;

/// Largest number of neighbouring windows [`Totp::verify`] may accept on
/// each side.
pub const MAX_SKEW: u64 = 10;

/// Errors produced while configuring or computing codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TotpError {
    #[error("no secret key provided")]
    EmptySecret,

    #[error("secret key is not valid base32")]
    BadSecret,

    #[error("invalid algorithm {0:?}, provide one of SHA1/SHA256/SHA512")]
    UnsupportedAlgorithm(String),

    #[error("digit count must be between 1 and 10, got {0}")]
    InvalidDigits(u32),

    #[error("period must be at least one second")]
    InvalidPeriod,

    #[error("skew must be at most 10 windows, got {0}")]
    InvalidSkew(u64),

    #[error("system clock is set before the unix epoch")]
    Clock,
}

/// Keyed hash used to derive codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        })
    }
}

impl FromStr for Algorithm {
    type Err = TotpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(TotpError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Numeric selector: `0` (unspecified) falls back to the default.
impl TryFrom<u8> for Algorithm {
    type Error = TotpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::default()),
            1 => Ok(Self::Sha1),
            2 => Ok(Self::Sha256),
            3 => Ok(Self::Sha512),
            other => Err(TotpError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Code generator bound to one secret.
#[derive(Clone)]
pub struct Totp {
    key: Vec<u8>,
    digits: u32,
    algorithm: Algorithm,
    period: u64,
    skew: u64,
}

impl fmt::Debug for Totp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Totp")
            .field("key", &"<redacted>")
            .field("digits", &self.digits)
            .field("algorithm", &self.algorithm)
            .field("period", &self.period)
            .field("skew", &self.skew)
            .finish()
    }
}

impl Totp {
    /// Creates a generator from a base32-encoded (RFC 4648, padded) secret.
    pub fn new(base32_secret: &str) -> Result<Self, TotpError> {
        if base32_secret.is_empty() {
            return Err(TotpError::EmptySecret);
        }
        let key = BASE32
            .decode(base32_secret.as_bytes())
            .map_err(|_| TotpError::BadSecret)?;
        Ok(Self {
            key,
            digits: DEFAULT_DIGITS,
            algorithm: Algorithm::default(),
            period: DEFAULT_PERIOD,
            skew: 0,
        })
    }

    /// Creates a generator from a raw passphrase, encoding it to base32 first.
    pub fn from_passphrase(passphrase: impl AsRef<[u8]>) -> Result<Self, TotpError> {
        let passphrase = passphrase.as_ref();
        if passphrase.is_empty() {
            return Err(TotpError::EmptySecret);
        }
        Self::new(&BASE32.encode(passphrase))
    }

    pub fn with_digits(mut self, digits: u32) -> Result<Self, TotpError> {
        check_digits(digits)?;
        self.digits = digits;
        Ok(self)
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_period(mut self, period: u64) -> Result<Self, TotpError> {
        if period == 0 {
            return Err(TotpError::InvalidPeriod);
        }
        self.period = period;
        Ok(self)
    }

    /// Number of neighbouring windows (each side) accepted by [`Totp::verify`].
    pub fn with_skew(mut self, skew: u64) -> Result<Self, TotpError> {
        if skew > MAX_SKEW {
            return Err(TotpError::InvalidSkew(skew));
        }
        self.skew = skew;
        Ok(self)
    }

    pub fn digits(&self) -> u32 {
        self.digits
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Computes the code for the current wall-clock time.
    pub fn generate(&self) -> Result<String, TotpError> {
        self.generate_at(unix_now()?)
    }

    /// Computes the code for an explicit unix timestamp.
    pub fn generate_at(&self, unix_secs: u64) -> Result<String, TotpError> {
        hotp(&self.key, unix_secs / self.period, self.digits, self.algorithm)
    }

    /// Seconds left before the code valid at `unix_secs` rotates.
    pub fn seconds_remaining_at(&self, unix_secs: u64) -> u64 {
        self.period - unix_secs % self.period
    }

    /// Checks a claimed code against the current wall-clock window.
    pub fn verify(&self, candidate: &str) -> bool {
        match unix_now() {
            Ok(now) => self.verify_at(candidate, now),
            Err(_) => false,
        }
    }

    /// Checks a claimed code against the window containing `unix_secs`, plus
    /// `skew` windows on either side.
    pub fn verify_at(&self, candidate: &str, unix_secs: u64) -> bool {
        let counter = unix_secs / self.period;
        let first = counter.saturating_sub(self.skew);
        let last = counter.saturating_add(self.skew);
        (first..=last).any(|c| {
            hotp(&self.key, c, self.digits, self.algorithm)
                .map(|code| constant_time_eq(&code, candidate))
                .unwrap_or(false)
        })
    }
}

/// Computes an RFC 4226 HOTP value for `counter`.
pub fn hotp(
    key: &[u8],
    counter: u64,
    digits: u32,
    algorithm: Algorithm,
) -> Result<String, TotpError> {
    check_digits(digits)?;
    let msg = counter.to_be_bytes();
    let digest = match algorithm {
        Algorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| TotpError::BadSecret)?;
            mac.update(&msg);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha256 => {
            let mut mac =
                Hmac::<Sha256>::new_from_slice(key).map_err(|_| TotpError::BadSecret)?;
            mac.update(&msg);
            mac.finalize().into_bytes().to_vec()
        }
        Algorithm::Sha512 => {
            let mut mac =
                Hmac::<Sha512>::new_from_slice(key).map_err(|_| TotpError::BadSecret)?;
            mac.update(&msg);
            mac.finalize().into_bytes().to_vec()
        }
    };
    Ok(truncate(&digest, digits))
}

/// Dynamic truncation (RFC 4226 §5.3). HMAC digests are at least 20 bytes,
/// so `offset + 3` always stays in bounds.
fn truncate(digest: &[u8], digits: u32) -> String {
    let offset = usize::from(digest[digest.len() - 1] & 0x0f);
    let value = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    let code = u64::from(value) % 10u64.pow(digits);
    format!("{code:0width$}", width = digits as usize)
}

fn check_digits(digits: u32) -> Result<(), TotpError> {
    if digits == 0 || digits > MAX_DIGITS {
        return Err(TotpError::InvalidDigits(digits));
    }
    Ok(())
}

/// Current unix time in whole seconds.
pub fn unix_now() -> Result<u64, TotpError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| TotpError::Clock)
}

/// Constant-time comparison so a mismatch position is not observable.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
