use std::time::Duration;

use clap::{Parser, Subcommand};
use fr_store::{ConnectOptions, RetryPolicy};

/// Every setting can come from the environment; flags win over env vars.
///
/// Secrets are never rendered in `--help` (`hide_env_values`), and neither
/// type derives `Debug`.
#[derive(Parser)]
#[command(name = "formrelay", version, about = "Encrypted audit store for outbound form mail", long_about = None)]
pub(crate) struct Cli {
    /// SQLite DSN, e.g. `sqlite://data/mails.db`
    #[arg(long, env = "DB_DSN", hide_env_values = true)]
    pub(crate) db_dsn: String,

    /// Passphrase the field encryption key is derived from
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub(crate) secret_key: String,

    /// Admin API key; a random one is generated and printed when absent
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub(crate) api_key: Option<String>,

    /// Run every statement in one transaction that is rolled back on exit
    #[arg(long, env = "RUN_IN_TRANSACTION")]
    pub(crate) run_in_transaction: bool,

    #[arg(long, env = "DB_CONNECTION_RETRIES", default_value_t = fr_store::db::DEFAULT_CONNECT_ATTEMPTS)]
    pub(crate) db_connection_retries: u32,

    #[arg(long, env = "DB_CONNECTION_RETRY_DELAY_MS", default_value_t = 1000)]
    pub(crate) db_connection_retry_delay_ms: u64,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Connect, hold the store open until Ctrl-C, then shut down
    Serve,
    /// Apply pending schema migrations
    Migrate,
    /// Print one page of stored mails (without content) as JSON
    List {
        /// 1-based page number
        #[arg(long, allow_negative_numbers = true)]
        page: Option<i64>,
        /// Page length, 1 to 100
        #[arg(long, allow_negative_numbers = true)]
        page_len: Option<i64>,
        /// Admin API key presented by the caller
        #[arg(long, env = "FORMRELAY_KEY", hide_env_values = true)]
        key: String,
    },
    /// Print one full mail record as JSON
    Show {
        id: i64,
        /// Admin API key presented by the caller
        #[arg(long, env = "FORMRELAY_KEY", hide_env_values = true)]
        key: String,
    },
}

impl Cli {
    pub(crate) fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            with_transaction: self.run_in_transaction,
            retry: RetryPolicy {
                attempts: self.db_connection_retries,
                delay: Duration::from_millis(self.db_connection_retry_delay_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["formrelay", "--db-dsn", "sqlite://m.db", "--secret-key", "s"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_without_flags() {
        let cli = parse(&["serve"]);
        let opts = cli.connect_options();
        assert!(!opts.with_transaction);
        assert_eq!(opts.retry, RetryPolicy { attempts: 3, delay: Duration::from_secs(1) });
        assert!(cli.api_key.is_none());
        assert!(matches!(cli.command, Commands::Serve));
    }

    #[test]
    fn retry_and_transaction_flags() {
        let cli = parse(&[
            "--run-in-transaction",
            "--db-connection-retries",
            "5",
            "--db-connection-retry-delay-ms",
            "250",
            "migrate",
        ]);
        let opts = cli.connect_options();
        assert!(opts.with_transaction);
        assert_eq!(opts.retry, RetryPolicy { attempts: 5, delay: Duration::from_millis(250) });
    }

    #[test]
    fn list_paging_arguments() {
        let cli = parse(&["list", "--page", "3", "--page-len", "-1", "--key", "k"]);
        match cli.command {
            Commands::List { page, page_len, key } => {
                assert_eq!(page, Some(3));
                assert_eq!(page_len, Some(-1));
                assert_eq!(key, "k");
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn show_takes_positional_id() {
        let cli = parse(&["show", "42", "--key", "k"]);
        assert!(matches!(cli.command, Commands::Show { id: 42, .. }));
    }
}
