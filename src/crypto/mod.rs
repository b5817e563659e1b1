//! Platform-agnostic crypto module wrapper that handles encryption for
//! both crypto providers, ring and aws-lc-rs.
use heliograph_types::SECRET_KEY_LEN;
use std::fmt::{Debug, Display};
use std::str::FromStr;

// We're using ring if both aws-lc-rs and ring are configured.
#[cfg(any(
    all(feature = "ring", not(feature = "aws_lc_rs")),
    all(feature = "aws_lc_rs", feature = "ring")
))]
extern crate ring;

// Since aws-lc-rs claims to be ring-compatible so we don't need to isolate
// each of their implementation in designated modules.
#[cfg(all(feature = "aws_lc_rs", not(feature = "ring")))]
extern crate aws_lc_rs as ring;

pub mod aes256gcm;
pub mod xchacha20poly1305;

pub use self::aes256gcm::Aes256Gcm;
pub use self::xchacha20poly1305::XChaCha20Poly1305;

/// Platform-agnostic trait for encrypting and decrypting audio frames
/// using the `AES-256-GCM` or `XChaCha20-Poly1305` algorithm, independent
/// of any specific crypto provider implementation.
pub trait Aead: Debug + Sync + Send {
    fn mode(&self) -> EncryptMode;
    fn encrypt(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, AeadError>;
    fn decrypt(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, AeadError>;
}

/// Encryption mode negotiated with the voice server in select protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptMode {
    /// AEAD `AES256-GCM` (RTP Size) (Preferred)
    Aes256Gcm,
    /// AEAD `XChaCha20` Poly1305 (RTP Size) (Required)
    XChaCha20Poly1305,
}

impl EncryptMode {
    /// Builds an encryptor of this mode around a session secret key.
    #[must_use]
    pub fn aead(self, key: &[u8; SECRET_KEY_LEN]) -> Box<dyn Aead> {
        match self {
            Self::Aes256Gcm => Box::new(Aes256Gcm::new_sized(key)),
            Self::XChaCha20Poly1305 => Box::new(XChaCha20Poly1305::new_sized(key)),
        }
    }

    /// Gets the required size of a nonce for a particular mode.
    #[must_use]
    pub const fn nonce_size(self) -> usize {
        match self {
            Self::Aes256Gcm => 12,
            Self::XChaCha20Poly1305 => 24,
        }
    }

    /// Returns the best encryption mode among the modes offered by the
    /// voice server in its ready payload.
    #[must_use]
    pub fn negotiate<T: AsRef<str>>(available_modes: &[T]) -> Option<Self> {
        available_modes
            .iter()
            .filter_map(|mode| EncryptMode::from_str(mode.as_ref()).ok())
            .max_by_key(|mode| mode.priority())
    }

    /// Returns the name of a mode as it appears during negotiation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aead_aes256_gcm_rtpsize",
            Self::XChaCha20Poly1305 => "aead_xchacha20_poly1305_rtpsize",
        }
    }

    /// Returns a local priority score for a given mode.
    ///
    /// Higher values are more preferred.
    #[must_use]
    const fn priority(self) -> u64 {
        match self {
            Self::Aes256Gcm => 1,
            Self::XChaCha20Poly1305 => 0,
        }
    }
}

impl FromStr for EncryptMode {
    type Err = UnknownEncryptMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aead_aes256_gcm_rtpsize" => Ok(Self::Aes256Gcm),
            "aead_xchacha20_poly1305_rtpsize" => Ok(Self::XChaCha20Poly1305),
            _ => Err(UnknownEncryptMode {
                mode: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEncryptMode {
    mode: String,
}

impl UnknownEncryptMode {
    #[must_use]
    pub fn mode(&self) -> &str {
        &self.mode
    }
}

impl Display for UnknownEncryptMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unknown encrypt mode: ")?;
        Debug::fmt(&self.mode, f)
    }
}

impl std::error::Error for UnknownEncryptMode {}

pub struct AeadError {
    pub(crate) kind: AeadErrorType,
}

impl AeadError {
    #[must_use]
    pub fn kind(&self) -> &AeadErrorType {
        &self.kind
    }
}

impl Debug for AeadError {
    #[cfg(not(test))]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadError").finish_non_exhaustive()
    }

    #[cfg(test)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Display for AeadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // This is on purpose so the attacker cannot decipher
        // the cause of the error.
        f.write_str("aead error")
    }
}

impl std::error::Error for AeadError {}

#[cfg_attr(test, derive(Debug))]
#[non_exhaustive]
pub enum AeadErrorType {
    /// General AEAD error. Nothing too specific.
    Unspecified,

    /// Invalid nonce length.
    InvalidNonceLength { expected: usize },
}
