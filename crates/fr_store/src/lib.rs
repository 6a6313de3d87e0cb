//! fr_store — encrypted mail audit store for formrelay
//!
//! # Encryption strategy
//! SQLite does NOT encrypt.  We use application-level encryption:
//! - Subject, content, sender and each recipient entry are stored as
//!   AES-256-GCM sealed values (base64), one fresh nonce per field.
//! - The provider name, success flag, timestamps and delivery error detail
//!   are plaintext so they stay queryable.
//! - A single [`fr_crypto::AeadCodec`] is built at startup and injected into
//!   the repository; nothing reads key material from globals.
//!
//! # Connection lifecycle
//! [`Database::connect`] → [`Database::probe`] (bounded retry) →
//! [`Database::migrate`] → repository use → [`Database::shutdown`].

pub mod db;
pub mod error;
pub mod models;
pub mod repository;

pub use db::{redact_dsn, ConnectOptions, Database, RetryPolicy};
pub use error::StoreError;
pub use models::{
    DecryptedMail, DecryptedMailWithContent, MailPage, OutgoingMail, PageRequest, Recipient,
};
pub use repository::{MailRepository, MailStore};
