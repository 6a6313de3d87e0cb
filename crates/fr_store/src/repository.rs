//! Mail audit repository
//!
//! Sensitive fields are sealed before they reach the store and opened after
//! they leave it.  Any crypto failure aborts the whole operation: a store
//! never inserts a partially sealed row, and a read never returns a
//! partially opened record or page.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fr_crypto::{AeadCodec, FieldCipher};
use tracing::{debug, info, instrument};

use crate::db::Database;
use crate::error::StoreError;
use crate::models::{
    sender_plain_text, DecryptedMail, DecryptedMailWithContent, MailPage, MailRow,
    MailSummaryRow, NewMailRow, OutgoingMail,
};

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Parameterized statements against the `mails` table.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Insert one row and return the store-assigned id.
    async fn insert_mail(&self, row: &NewMailRow) -> Result<i64, StoreError>;

    /// One page ordered by id ascending, without body content.
    async fn select_mails(&self, offset: i64, limit: i64) -> Result<Vec<MailSummaryRow>, StoreError>;

    /// Total number of rows, unfiltered.
    async fn count_mails(&self) -> Result<i64, StoreError>;

    /// `None` when no row has this id.
    async fn select_mail_by_id(&self, id: i64) -> Result<Option<MailRow>, StoreError>;
}

// ─── SQLite Implementation ──────────────────────────────────────────────────

const SUMMARY_COLUMNS: &str =
    "id, created_at, provider, success, subject, sender, recipients, error_detail";

#[async_trait]
impl MailStore for Database {
    async fn insert_mail(&self, row: &NewMailRow) -> Result<i64, StoreError> {
        let recipients = serde_json::to_string(&row.recipients)?;
        let mut lease = self.lease().await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO mails (created_at, provider, success, subject, content, sender, recipients, error_detail) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(row.created_at)
        .bind(&row.provider)
        .bind(row.success)
        .bind(&row.subject)
        .bind(&row.content)
        .bind(&row.sender)
        .bind(recipients)
        .bind(&row.error_detail)
        .fetch_one(lease.conn()?)
        .await?;
        Ok(id)
    }

    async fn select_mails(&self, offset: i64, limit: i64) -> Result<Vec<MailSummaryRow>, StoreError> {
        let mut lease = self.lease().await?;
        let rows = sqlx::query_as::<_, MailSummaryRow>(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM mails ORDER BY id ASC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(lease.conn()?)
        .await?;
        Ok(rows)
    }

    async fn count_mails(&self) -> Result<i64, StoreError> {
        let mut lease = self.lease().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mails")
            .fetch_one(lease.conn()?)
            .await?;
        Ok(count)
    }

    async fn select_mail_by_id(&self, id: i64) -> Result<Option<MailRow>, StoreError> {
        let mut lease = self.lease().await?;
        let row = sqlx::query_as::<_, MailRow>(&format!(
            "SELECT {SUMMARY_COLUMNS}, content FROM mails WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(lease.conn()?)
        .await?;
        Ok(row)
    }
}

// ─── Repository ─────────────────────────────────────────────────────────────

/// Encrypting front for a [`MailStore`].  Cheap to clone.
#[derive(Debug)]
pub struct MailRepository<S, C = AeadCodec> {
    store: S,
    cipher: Arc<C>,
}

impl<S: Clone, C> Clone for MailRepository<S, C> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), cipher: Arc::clone(&self.cipher) }
    }
}

impl<S: MailStore, C: FieldCipher> MailRepository<S, C> {
    pub fn new(store: S, cipher: Arc<C>) -> Self {
        Self { store, cipher }
    }

    pub fn store_handle(&self) -> &S {
        &self.store
    }

    /// Record one send attempt.  `error` is the delivery failure, if any; its
    /// message is kept in plaintext as `error_detail`.
    ///
    /// All fields are sealed before the insert is issued.
    #[instrument(skip_all, fields(provider = %mail.provider, success = error.is_none()))]
    pub async fn store(
        &self,
        mail: &OutgoingMail,
        error: Option<&(dyn std::error::Error + Send + Sync)>,
    ) -> Result<i64, StoreError> {
        let subject = self.cipher.encrypt(&mail.subject)?;
        let content = self.cipher.encrypt(&mail.content)?;
        let sender = self.cipher.encrypt(&mail.sender)?;
        let composites: Vec<String> = mail.recipients.iter().map(|r| r.composite()).collect();
        let recipients = self.cipher.encrypt_many(&composites)?;

        let row = NewMailRow {
            created_at: Utc::now(),
            provider: mail.provider.clone(),
            success: error.is_none(),
            subject,
            content,
            sender,
            recipients,
            error_detail: error.map(|e| e.to_string()),
        };

        let id = self.store.insert_mail(&row).await?;
        info!(id, "Mail stored");
        Ok(id)
    }

    /// One page of decrypted summaries (no content) and the total row count.
    ///
    /// Negative bounds are rejected; SQLite would read a negative `LIMIT` as
    /// "no limit".
    #[instrument(skip(self))]
    pub async fn list(&self, offset: i64, limit: i64) -> Result<MailPage, StoreError> {
        if offset < 0 || limit < 0 {
            return Err(StoreError::InvalidPage { offset, limit });
        }
        let rows = self.store.select_mails(offset, limit).await?;
        let items = rows
            .into_iter()
            .map(|row| self.open_summary(row))
            .collect::<Result<Vec<_>, _>>()?;
        let count = self.store.count_mails().await?;
        debug!(returned = items.len(), count, "Mail page fetched");
        Ok(MailPage { items, count })
    }

    /// Full decrypted record including content.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i64) -> Result<DecryptedMailWithContent, StoreError> {
        let row = self
            .store
            .select_mail_by_id(id)
            .await?
            .ok_or(StoreError::MailNotFound(id))?;
        let content = self.cipher.decrypt(&row.content)?;
        let mail = self.open_summary(row.summary)?;
        Ok(DecryptedMailWithContent { mail, content })
    }

    fn open_summary(&self, row: MailSummaryRow) -> Result<DecryptedMail, StoreError> {
        let sealed: Vec<String> = serde_json::from_str(&row.recipients)?;
        let sender = self.cipher.decrypt(&row.sender)?;
        Ok(DecryptedMail {
            id: row.id,
            created_at: row.created_at,
            provider: row.provider,
            success: row.success,
            sender_plain_text: sender_plain_text(&sender)?,
            sender,
            recipients: self.cipher.decrypt_many(&sealed)?,
            subject: self.cipher.decrypt(&row.subject)?,
            error: row.error_detail,
        })
    }
}
