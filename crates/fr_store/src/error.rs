use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] fr_crypto::CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("mail not found: {0}")]
    MailNotFound(i64),

    /// `target` is always the redacted DSN, never the raw one.
    #[error("Unable to connect to db {target} after {attempts} attempts")]
    Connection { target: String, attempts: u32 },

    #[error("Failed to roll back transaction on {target}: {source}")]
    Rollback {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid database DSN for {target}")]
    InvalidDsn { target: String },

    #[error("Invalid page: offset {offset}, limit {limit} (both must be non-negative)")]
    InvalidPage { offset: i64, limit: i64 },

    #[error("Failed to render sender as plain text: {0}")]
    Render(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::MailNotFound(_))
    }
}
