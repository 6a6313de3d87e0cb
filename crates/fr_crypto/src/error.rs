use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Sealed value is not valid transport encoding: {0}")]
    Decode(String),

    #[error("AEAD decryption failed (authentication tag mismatch, possible tampering)")]
    Authentication,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("Nonce generation failed: {0}")]
    NonceGeneration(String),

    #[error("Salt generation failed: {0}")]
    SaltGeneration(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Item {index} failed: {source}")]
    Item {
        index: usize,
        #[source]
        source: Box<CryptoError>,
    },
}

impl CryptoError {
    /// The underlying failure, looking through any `Item` wrapping.
    pub fn root(&self) -> &CryptoError {
        match self {
            CryptoError::Item { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for tag mismatches anywhere in the chain.
    pub fn is_authentication(&self) -> bool {
        matches!(self.root(), CryptoError::Authentication)
    }
}
