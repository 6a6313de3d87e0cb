use anyhow::{Context, Result};
use fr_crypto::{AeadCodec, ApiKeyVerifier};
use fr_store::{Database, MailRepository};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::cli::Cli;

/// Returned for a missing or wrong admin key; never says which.
#[derive(Debug, Error)]
#[error("unauthorized")]
pub(crate) struct Unauthorized;

pub(crate) struct ServiceState {
    pub(crate) database: Database,
    pub(crate) repository: MailRepository<Database>,
    verifier: ApiKeyVerifier,
}

impl ServiceState {
    /// Build the codec and verifier, then connect and probe the store.
    /// Any failure here is fatal for the process.
    pub(crate) async fn bootstrap(cli: &Cli) -> Result<Self> {
        let codec = AeadCodec::new(&cli.secret_key).context("SECRET_KEY is unusable")?;

        let api_key = ApiKeyVerifier::initialize(cli.api_key.as_deref())
            .context("failed to derive API key hash")?;
        if api_key.generated {
            // Shown once; stdout is reserved for command output.
            eprintln!("Your API-KEY: {}", api_key.key.as_str());
        }

        let database = Database::connect(&cli.db_dsn, cli.connect_options()).await?;
        database.probe().await?;

        let repository = MailRepository::new(database.clone(), Arc::new(codec));
        info!(api_key_generated = api_key.generated, "service state ready");
        Ok(Self { database, repository, verifier: api_key.verifier })
    }

    pub(crate) fn authorize(&self, candidate: &str) -> Result<(), Unauthorized> {
        if self.verifier.verify(candidate) {
            Ok(())
        } else {
            Err(Unauthorized)
        }
    }

    pub(crate) async fn shutdown(self) -> Result<()> {
        self.database
            .shutdown()
            .await
            .context("Failed to rollback DB transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use fr_store::{OutgoingMail, Recipient, StoreError};

    fn cli(dir: &std::path::Path, extra: &[&str]) -> Cli {
        let dsn = format!("sqlite://{}", dir.join("mails.db").display());
        let mut argv = vec![
            "formrelay".to_owned(),
            "--db-dsn".to_owned(),
            dsn,
            "--secret-key".to_owned(),
            "unit-test-secret".to_owned(),
            "--db-connection-retry-delay-ms".to_owned(),
            "10".to_owned(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        argv.push("serve".to_owned());
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn authorize_accepts_only_the_configured_key() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::bootstrap(&cli(dir.path(), &["--api-key", "admin-key"]))
            .await
            .unwrap();

        assert!(state.authorize("admin-key").is_ok());
        assert!(state.authorize("admin-kez").is_err());
        assert!(state.authorize("").is_err());
        assert_eq!(state.authorize("nope").unwrap_err().to_string(), "unauthorized");
        state.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn generated_key_rejects_guesses() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::bootstrap(&cli(dir.path(), &[])).await.unwrap();
        assert!(state.authorize("").is_err());
        assert!(state.authorize("admin").is_err());
        state.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn bootstrap_fails_for_unreachable_store() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let err = ServiceState::bootstrap(&cli(&missing, &["--db-connection-retries", "2"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Connection { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn transaction_mode_writes_vanish_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let plain = ServiceState::bootstrap(&cli(dir.path(), &[])).await.unwrap();
        plain.database.migrate().await.unwrap();
        plain.shutdown().await.unwrap();

        let state = ServiceState::bootstrap(&cli(dir.path(), &["--run-in-transaction"]))
            .await
            .unwrap();
        let mail = OutgoingMail {
            provider: "fake".into(),
            subject: "hello".into(),
            sender: "me@example.com".into(),
            content: "body".into(),
            recipients: vec![Recipient::new("you@example.com", "You")],
        };
        state.repository.store(&mail, None).await.unwrap();
        assert_eq!(state.repository.list(0, 10).await.unwrap().count, 1);
        state.shutdown().await.unwrap();

        let state = ServiceState::bootstrap(&cli(dir.path(), &[])).await.unwrap();
        assert_eq!(state.repository.list(0, 10).await.unwrap().count, 0);
        state.shutdown().await.unwrap();
    }
}
