//! Authenticated field encryption
//!
//! Uses AES-256-GCM (96-bit nonce).
//! Key: SHA-256 of the operator passphrase.  Nonce: 12 bytes (random).  Tag: 16 bytes.
//!
//! Sealed value wire format (standard base64 of):
//!   [ nonce (12 bytes) | ciphertext + tag ]
//!
//! Empty plaintext seals to the empty string and the empty string opens to
//! empty plaintext; the cipher is not invoked for either.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// AES-256-GCM codec bound to a single key for its whole lifetime.
///
/// Construct once at startup and share it (`Arc<AeadCodec>`); every call is
/// reentrant and nothing inside is mutated after construction.
pub struct AeadCodec {
    cipher: Aes256Gcm,
}

impl AeadCodec {
    /// Derive the 32-byte key from `passphrase` (SHA-256) and set up the cipher.
    pub fn new(passphrase: &str) -> Result<Self, CryptoError> {
        if passphrase.is_empty() {
            return Err(CryptoError::KeyDerivation("encryption passphrase is empty".into()));
        }
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Seal `plaintext` under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| CryptoError::NonceGeneration(e.to_string()))?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::AeadEncrypt)?;

        // Prepend nonce
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    /// Open a sealed value produced by [`AeadCodec::encrypt`].
    ///
    /// The tag is verified before any plaintext is returned.
    pub fn decrypt(&self, sealed: &str) -> Result<String, CryptoError> {
        if sealed.is_empty() {
            return Ok(String::new());
        }

        let data = STANDARD
            .decode(sealed)
            .map_err(|e| CryptoError::Decode(e.to_string()))?;
        if data.len() < NONCE_LEN {
            return Err(CryptoError::Authentication);
        }
        let (nonce, ct) = data.split_at(NONCE_LEN);

        let plaintext = Zeroizing::new(
            self.cipher
                .decrypt(Nonce::from_slice(nonce), ct)
                .map_err(|_| CryptoError::Authentication)?,
        );

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| CryptoError::Decode("plaintext is not valid UTF-8".into()))
    }

    /// Seal every element in order. The first failure aborts the whole call.
    pub fn encrypt_many<S: AsRef<str>>(&self, items: &[S]) -> Result<Vec<String>, CryptoError> {
        FieldCipher::encrypt_many(self, items)
    }

    /// Open every element in order. The first failure aborts the whole call;
    /// no partially decrypted sequence is ever returned.
    pub fn decrypt_many<S: AsRef<str>>(&self, items: &[S]) -> Result<Vec<String>, CryptoError> {
        FieldCipher::decrypt_many(self, items)
    }
}

/// Per-field seal/open, the seam the record repository encrypts through.
pub trait FieldCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;

    fn decrypt(&self, sealed: &str) -> Result<String, CryptoError>;

    /// Element-wise [`FieldCipher::encrypt`]; failures carry the element index.
    fn encrypt_many<S: AsRef<str>>(&self, items: &[S]) -> Result<Vec<String>, CryptoError> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.encrypt(item.as_ref())
                    .map_err(|e| CryptoError::Item { index, source: Box::new(e) })
            })
            .collect()
    }

    /// Element-wise [`FieldCipher::decrypt`]; all-or-nothing.
    fn decrypt_many<S: AsRef<str>>(&self, items: &[S]) -> Result<Vec<String>, CryptoError> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.decrypt(item.as_ref())
                    .map_err(|e| CryptoError::Item { index, source: Box::new(e) })
            })
            .collect()
    }
}

impl FieldCipher for AeadCodec {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        AeadCodec::encrypt(self, plaintext)
    }

    fn decrypt(&self, sealed: &str) -> Result<String, CryptoError> {
        AeadCodec::decrypt(self, sealed)
    }
}

impl fmt::Debug for AeadCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AeadCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> AeadCodec {
        AeadCodec::new("correct horse battery staple").unwrap()
    }

    #[test]
    fn round_trip() {
        let codec = codec();
        let long = "x".repeat(10_000);
        for s in ["a", "hello world", "ünïcødé ✓", long.as_str()] {
            let sealed = codec.encrypt(s).unwrap();
            assert_eq!(codec.decrypt(&sealed).unwrap(), s);
        }
    }

    #[test]
    fn empty_is_identity() {
        let codec = codec();
        assert_eq!(codec.encrypt("").unwrap(), "");
        assert_eq!(codec.decrypt("").unwrap(), "");
    }

    #[test]
    fn sealed_layout_is_nonce_then_ciphertext_and_tag() {
        let codec = codec();
        let sealed = codec.encrypt("abc").unwrap();
        let raw = STANDARD.decode(sealed).unwrap();
        assert_eq!(raw.len(), NONCE_LEN + 3 + TAG_LEN);
    }

    #[test]
    fn fresh_nonce_per_call() {
        let codec = codec();
        let a = codec.encrypt("same").unwrap();
        let b = codec.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(codec.decrypt(&a).unwrap(), codec.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = codec().encrypt("secret").unwrap();
        let other = AeadCodec::new("another passphrase").unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(CryptoError::Authentication)));
    }

    #[test]
    fn malformed_base64_is_decode_error() {
        assert!(matches!(codec().decrypt("not base64!!"), Err(CryptoError::Decode(_))));
    }

    #[test]
    fn shorter_than_nonce_fails_authentication() {
        let short = STANDARD.encode([0u8; NONCE_LEN - 1]);
        assert!(matches!(codec().decrypt(&short), Err(CryptoError::Authentication)));
    }

    #[test]
    fn empty_passphrase_rejected() {
        assert!(matches!(AeadCodec::new(""), Err(CryptoError::KeyDerivation(_))));
    }

    #[test]
    fn debug_does_not_leak_key() {
        assert_eq!(format!("{:?}", codec()), "AeadCodec { .. }");
    }
}
