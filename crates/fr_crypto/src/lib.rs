//! fr_crypto — formrelay cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; AES-256-GCM and PBKDF2 come from audited RustCrypto crates.
//! - Key material is zeroized on drop and never logged.
//! - One codec instance per key, constructed at startup and shared.
//!
//! # Module layout
//! - `aead`        — AES-256-GCM codec for sealing individual record fields
//! - `credential`  — PBKDF2-SHA256 API key hashing + constant-time verification
//! - `error`       — unified error type

pub mod aead;
pub mod credential;
pub mod error;

pub use aead::{AeadCodec, FieldCipher};
pub use credential::{ApiKeyVerifier, InitializedApiKey, KdfParams};
pub use error::CryptoError;
