//! API key verification
//!
//! The admin API key is never kept in plaintext.  At startup it is hashed
//! with PBKDF2-HMAC-SHA256 under a random 16-byte salt; only the hash, the
//! salt and the cost parameters are retained.  Candidates are re-derived with
//! the same salt/parameters and compared in constant time.

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

pub const SALT_LEN: usize = 16;
pub const MIN_ITERATIONS: u32 = 100_000;
pub const DEFAULT_OUTPUT_LEN: usize = 32;

/// PBKDF2 cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
    pub output_len: usize,
}

impl KdfParams {
    /// Validated parameters. Iterations below [`MIN_ITERATIONS`] are rejected.
    pub fn new(iterations: u32, output_len: usize) -> Result<Self, CryptoError> {
        if iterations < MIN_ITERATIONS {
            return Err(CryptoError::KeyDerivation(format!(
                "iteration count {iterations} is below the minimum of {MIN_ITERATIONS}"
            )));
        }
        if output_len == 0 {
            return Err(CryptoError::KeyDerivation("output length must be non-zero".into()));
        }
        Ok(Self { iterations, output_len })
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { iterations: MIN_ITERATIONS, output_len: DEFAULT_OUTPUT_LEN }
    }
}

/// Result of [`ApiKeyVerifier::initialize`].
pub struct InitializedApiKey {
    /// The key in effect. Show it to the operator once, then drop it.
    pub key: Zeroizing<String>,
    /// True when no key was supplied and one was generated.
    pub generated: bool,
    pub verifier: ApiKeyVerifier,
}

impl fmt::Debug for InitializedApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitializedApiKey")
            .field("generated", &self.generated)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

/// Salted PBKDF2 hash of the admin API key.  Read-only after construction.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ApiKeyVerifier {
    hash: Vec<u8>,
    salt: [u8; SALT_LEN],
    #[zeroize(skip)]
    params: KdfParams,
}

impl ApiKeyVerifier {
    /// Use `candidate` as the API key, or generate a fresh one (UUID v4) when
    /// it is absent or empty, and hash it with default parameters.
    pub fn initialize(candidate: Option<&str>) -> Result<InitializedApiKey, CryptoError> {
        Self::initialize_with(candidate, KdfParams::default())
    }

    pub fn initialize_with(
        candidate: Option<&str>,
        params: KdfParams,
    ) -> Result<InitializedApiKey, CryptoError> {
        let (key, generated) = match candidate.filter(|k| !k.is_empty()) {
            Some(k) => (Zeroizing::new(k.to_owned()), false),
            None => (Zeroizing::new(uuid::Uuid::new_v4().to_string()), true),
        };
        let verifier = Self::from_key(&key, params)?;
        debug!(generated, iterations = params.iterations, "API key hash derived");
        Ok(InitializedApiKey { key, generated, verifier })
    }

    /// Hash `key` under a fresh random salt.
    pub fn from_key(key: &str, params: KdfParams) -> Result<Self, CryptoError> {
        let params = KdfParams::new(params.iterations, params.output_len)?;
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| CryptoError::SaltGeneration(e.to_string()))?;
        let hash = derive(key.as_bytes(), &salt, &params);
        Ok(Self { hash: hash.to_vec(), salt, params })
    }

    /// Re-derive `candidate` and compare against the stored hash in constant time.
    pub fn verify(&self, candidate: &str) -> bool {
        let derived = derive(candidate.as_bytes(), &self.salt, &self.params);
        constant_time_eq(&derived, &self.hash)
    }
}

impl fmt::Debug for ApiKeyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyVerifier")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

fn derive(secret: &[u8], salt: &[u8], params: &KdfParams) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; params.output_len]);
    pbkdf2_hmac::<Sha256>(secret, salt, params.iterations, &mut out);
    out
}

/// Constant-time comparison to prevent timing side channels.
/// Unequal lengths return false without inspecting contents.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
