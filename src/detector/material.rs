//! # Key Material
//!
//! Captured gossip key bytes and their content fingerprint.

use crate::constants::{FINGERPRINT_DISPLAY_LEN, VALID_GOSSIP_KEY_LENGTHS};
use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Deterministic SHA-256 digest of a gossip key, hex encoded
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a key as Consul sees it (surrounding whitespace removed)
    pub fn of(key: &str) -> Self {
        let digest = Sha256::digest(key.trim().as_bytes());
        Self(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix safe to print in logs
    pub fn short(&self) -> &str {
        &self.0[..FINGERPRINT_DISPLAY_LEN.min(self.0.len())]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short())
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Why a buffer was rejected as key material
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaterialError {
    #[error("key file is empty")]
    Empty,
    #[error("key file is not valid UTF-8")]
    NotUtf8,
    #[error("key is not valid base64: {0}")]
    NotBase64(String),
    #[error("key decodes to {0} bytes, expected 16, 24 or 32")]
    InvalidLength(usize),
}

/// A gossip key read from the watched file
///
/// Immutable once captured. The key bytes are wiped when dropped and never
/// appear in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    key: String,
    #[zeroize(skip)]
    fingerprint: Fingerprint,
}

impl KeyMaterial {
    /// Capture a key from raw file contents
    ///
    /// Rejects anything Consul would refuse to install, so a half-written
    /// file never reaches the keyring.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, MaterialError> {
        let text = std::str::from_utf8(raw).map_err(|_| MaterialError::NotUtf8)?;
        Self::from_key(text)
    }

    pub fn from_key(raw: &str) -> Result<Self, MaterialError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(MaterialError::Empty);
        }
        let mut decoded = STANDARD
            .decode(key)
            .map_err(|e| MaterialError::NotBase64(e.to_string()))?;
        let len = decoded.len();
        decoded.zeroize();
        if !VALID_GOSSIP_KEY_LENGTHS.contains(&len) {
            return Err(MaterialError::InvalidLength(len));
        }
        Ok(Self {
            key: key.to_string(),
            fingerprint: Fingerprint::of(key),
        })
    }

    /// Key string as passed to the keyring API
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "pUqJrVyVRj5jsiYEkM/tFQYfWyJIv4s3XkvDwy7Cu5s=";

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(Fingerprint::of(KEY_A), Fingerprint::of(KEY_A));
        assert_eq!(Fingerprint::of(KEY_A).as_str().len(), 64);
        assert!(Fingerprint::of(KEY_A)
            .as_str()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_ignores_surrounding_whitespace() {
        assert_eq!(
            Fingerprint::of(KEY_A),
            Fingerprint::of(&format!("  {KEY_A}\n"))
        );
    }

    #[test]
    fn test_fingerprint_short_form() {
        let fp = Fingerprint::of(KEY_A);
        assert_eq!(fp.short().len(), FINGERPRINT_DISPLAY_LEN);
        assert_eq!(fp.to_string(), fp.short());
    }

    #[test]
    fn test_material_accepts_trailing_newline() {
        let material = KeyMaterial::from_bytes(format!("{KEY_A}\n").as_bytes()).unwrap();
        assert_eq!(material.key(), KEY_A);
        assert_eq!(material.fingerprint(), &Fingerprint::of(KEY_A));
    }

    #[test]
    fn test_material_rejects_partial_writes() {
        assert_eq!(
            KeyMaterial::from_bytes(b"").err(),
            Some(MaterialError::Empty)
        );
        assert_eq!(
            KeyMaterial::from_bytes(b" \n").err(),
            Some(MaterialError::Empty)
        );
        assert!(matches!(
            KeyMaterial::from_bytes(b"pUqJrVyVRj5jsiYE"),
            Err(MaterialError::InvalidLength(12))
        ));
        assert!(matches!(
            KeyMaterial::from_bytes(b"pUqJrVyVRj5jsiYEkM/tFQ"),
            Err(MaterialError::NotBase64(_))
        ));
        assert_eq!(
            KeyMaterial::from_bytes(&[0xff, 0xfe]).err(),
            Some(MaterialError::NotUtf8)
        );
    }

    #[test]
    fn test_material_accepts_aes128_key() {
        assert!(KeyMaterial::from_key("AAAAAAAAAAAAAAAAAAAAAA==").is_ok());
    }

    #[test]
    fn test_debug_hides_key() {
        let material = KeyMaterial::from_key(KEY_A).unwrap();
        let rendered = format!("{material:?}");
        assert!(!rendered.contains(KEY_A));
        assert!(rendered.contains(material.fingerprint().short()));
    }
}
