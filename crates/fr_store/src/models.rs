//! Database row models and the decrypted views handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const DEFAULT_PAGE_LEN: i64 = 10;
pub const MAX_PAGE_LEN: i64 = 100;

/// Wrap width for the plain-text sender; wide enough that addresses stay on one line.
const PLAIN_TEXT_WIDTH: usize = 1_000;

/// Render a (possibly HTML) sender field as plain text for the admin view.
pub fn sender_plain_text(html: &str) -> Result<String, StoreError> {
    if html.is_empty() {
        return Ok(String::new());
    }
    let text = html2text::config::plain()
        .string_from_read(html.as_bytes(), PLAIN_TEXT_WIDTH)
        .map_err(|e| StoreError::Render(e.to_string()))?;
    Ok(text.trim().to_owned())
}

/// A mail recipient as configured on a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: String,
}

impl Recipient {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self { email: email.into(), name: name.into() }
    }

    /// Stored form: `"email name"`.
    pub fn composite(&self) -> String {
        format!("{} {}", self.email, self.name)
    }
}

/// One outbound mail attempt, in plaintext, as handed to the repository.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub provider: String,
    pub subject: String,
    pub sender: String,
    pub content: String,
    pub recipients: Vec<Recipient>,
}

/// Row to insert.  Every field except `provider`, `success` and
/// `error_detail` is already sealed.
#[derive(Debug, Clone)]
pub struct NewMailRow {
    pub created_at: DateTime<Utc>,
    pub provider: String,
    pub success: bool,
    pub subject: String,
    pub content: String,
    pub sender: String,
    /// Individually sealed `"email name"` entries, in order.
    pub recipients: Vec<String>,
    pub error_detail: Option<String>,
}

/// List-view row: no body content.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MailSummaryRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub provider: String,
    pub success: bool,
    pub subject: String,
    pub sender: String,
    /// JSON array of sealed entries
    pub recipients: String,
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MailRow {
    #[sqlx(flatten)]
    pub summary: MailSummaryRow,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecryptedMail {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub provider: String,
    pub success: bool,
    pub sender: String,
    /// `sender` with markup stripped
    pub sender_plain_text: String,
    /// `"email name"` composites
    pub recipients: Vec<String>,
    pub subject: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecryptedMailWithContent {
    #[serde(flatten)]
    pub mail: DecryptedMail,
    pub content: String,
}

/// One page of the admin listing plus the unfiltered total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailPage {
    pub items: Vec<DecryptedMail>,
    pub count: i64,
}

/// Offset/limit derived from 1-based admin paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: i64,
    pub limit: i64,
}

impl PageRequest {
    /// `page` defaults to 1 and must be positive; `page_len` defaults to
    /// [`DEFAULT_PAGE_LEN`] and must be in `1..=MAX_PAGE_LEN`.  Out-of-range
    /// values fall back to the defaults.
    pub fn from_query(page: Option<i64>, page_len: Option<i64>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = page_len
            .filter(|l| (1..=MAX_PAGE_LEN).contains(l))
            .unwrap_or(DEFAULT_PAGE_LEN);
        Self { offset: (page - 1).saturating_mul(limit), limit }
    }
}
