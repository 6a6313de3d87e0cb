//! Database connection management over SQLite via sqlx.
//!
//! The pool is created lazily; [`Database::probe`] performs the first real
//! round-trip with a bounded, fixed-delay retry.  Every log line and error
//! carries the redacted DSN only.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Sqlite, SqliteConnection, Transaction,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::error::StoreError;

pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Upper bound on a single connection acquisition.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed attempt count with a fixed pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_CONNECT_ATTEMPTS, delay: DEFAULT_RETRY_DELAY }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    /// Run every statement inside one transaction that shutdown rolls back.
    pub with_transaction: bool,
    pub retry: RetryPolicy,
}

/// Keys kept when redacting a keyword/value DSN; everything else is dropped.
const KEYWORD_DSN_SAFE_KEYS: &[&str] = &["host", "hostaddr", "port", "dbname"];

/// Placeholder for a DSN with nothing safe left to show.
pub const UNPARSED_DSN: &str = "<unparsed dsn>";

/// Strip credentials (userinfo) and query parameters from a DSN.
///
/// `postgres://user:pw@db:5432/app?sslmode=require` becomes `postgres://db:5432/app`.
/// Keyword/value DSNs (`host=db user=u password=pw`) keep only host, port and
/// database name.
pub fn redact_dsn(dsn: &str) -> String {
    let without_query = dsn.split_once('?').map_or(dsn, |(head, _)| head);
    if let Some((scheme, rest)) = without_query.split_once("://") {
        let host = rest.rsplit_once('@').map_or(rest, |(_, host)| host);
        return format!("{scheme}://{host}");
    }
    if without_query.contains('=') {
        return redact_keyword_dsn(without_query);
    }
    without_query
        .rsplit_once('@')
        .map_or(without_query, |(_, host)| host)
        .to_owned()
}

fn redact_keyword_dsn(dsn: &str) -> String {
    let kept: Vec<&str> = dsn
        .split_whitespace()
        .filter(|pair| {
            pair.split_once('=')
                .is_some_and(|(key, _)| KEYWORD_DSN_SAFE_KEYS.contains(&key.trim()))
        })
        .collect();
    if kept.is_empty() {
        UNPARSED_DSN.to_owned()
    } else {
        kept.join(" ")
    }
}

/// Run `op` up to `policy.attempts` times, sleeping `policy.delay` between
/// failures.  Exhaustion yields [`StoreError::Connection`] with `target`.
pub async fn retry_fixed<T, E, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, attempts, db = %target, error = %e, "Unable to connect to db");
                if attempt < attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
    Err(StoreError::Connection { target: target.to_owned(), attempts })
}

/// Central store handle.  Cheap to clone (Arc internally).
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    tx: Option<Arc<Mutex<Option<Transaction<'static, Sqlite>>>>>,
    redacted: Arc<str>,
    retry: RetryPolicy,
}

impl Database {
    /// Create the pool for `dsn` and, when requested, open the bootstrap
    /// transaction that all repository statements will run in.
    ///
    /// WAL journal mode and foreign-key enforcement are configured at
    /// connection time, not inside a migration.
    #[instrument(skip_all, fields(db = %redact_dsn(dsn), with_transaction = options.with_transaction))]
    pub async fn connect(dsn: &str, options: ConnectOptions) -> Result<Self, StoreError> {
        let redacted = redact_dsn(dsn);
        if !dsn.starts_with("sqlite:") {
            return Err(StoreError::InvalidDsn { target: redacted });
        }
        let opts = SqliteConnectOptions::from_str(dsn)
            .map_err(|_| StoreError::InvalidDsn { target: redacted.clone() })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(opts);

        let tx = if options.with_transaction {
            let tx = pool.begin().await?;
            debug!("Transaction opened");
            Some(Arc::new(Mutex::new(Some(tx))))
        } else {
            None
        };

        Ok(Self { pool, tx, redacted: redacted.into(), retry: options.retry })
    }

    /// Round-trip a trivial query, retrying per the configured policy.
    #[instrument(skip(self), fields(db = %self.redacted))]
    pub async fn probe(&self) -> Result<(), StoreError> {
        let pool = &self.pool;
        retry_fixed(&self.retry, &self.redacted, || async move {
            sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
        })
        .await?;
        info!(db = %self.redacted, "[DB] connected");
        Ok(())
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Applying migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        info!("Migrations applied!");
        Ok(())
    }

    /// Roll back the bootstrap transaction (if any), then close the pool.
    ///
    /// The pool is closed even when the rollback fails; the rollback error is
    /// still returned so the caller can treat it as fatal.
    #[instrument(skip(self), fields(db = %self.redacted))]
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        let mut result = Ok(());
        if let Some(slot) = &self.tx {
            if let Some(tx) = slot.lock().await.take() {
                match tx.rollback().await {
                    Ok(()) => debug!("Transaction rolled back"),
                    Err(source) => {
                        error!(error = %source, "Failed to rollback DB transaction");
                        result = Err(StoreError::Rollback {
                            target: self.redacted.to_string(),
                            source,
                        });
                    }
                }
            }
        }
        self.pool.close().await;
        info!("[DB] connection closed");
        result
    }

    pub fn redacted_target(&self) -> &str {
        &self.redacted
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A connection to run one statement on: the bootstrap transaction when
    /// one is open, otherwise a pooled connection.
    pub(crate) async fn lease(&self) -> Result<Lease<'_>, StoreError> {
        match &self.tx {
            Some(slot) => Ok(Lease::Transaction(slot.lock().await)),
            None => Ok(Lease::Pooled(self.pool.acquire().await?)),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("target", &self.redacted)
            .field("in_transaction", &self.tx.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

pub(crate) enum Lease<'a> {
    Pooled(PoolConnection<Sqlite>),
    Transaction(MutexGuard<'a, Option<Transaction<'static, Sqlite>>>),
}

impl Lease<'_> {
    /// The connection to execute on.  Fails once shutdown has consumed the
    /// transaction.
    pub(crate) fn conn(&mut self) -> Result<&mut SqliteConnection, StoreError> {
        match self {
            Lease::Pooled(conn) => Ok(&mut **conn),
            Lease::Transaction(slot) => (**slot)
                .as_mut()
                .map(|tx| &mut **tx)
                .ok_or(StoreError::Database(sqlx::Error::PoolClosed)),
        }
    }
}
