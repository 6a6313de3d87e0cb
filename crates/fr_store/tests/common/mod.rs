#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fr_crypto::AeadCodec;
use fr_store::{ConnectOptions, Database, MailRepository, OutgoingMail, Recipient, RetryPolicy};

pub const PASSPHRASE: &str = "test-secret-key";

pub fn dsn(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("mails.db").display())
}

pub fn options(with_transaction: bool) -> ConnectOptions {
    ConnectOptions {
        with_transaction,
        retry: RetryPolicy { attempts: 3, delay: Duration::from_millis(20) },
    }
}

pub async fn open(dir: &Path, with_transaction: bool) -> (Database, MailRepository<Database>) {
    let db = Database::connect(&dsn(dir), options(with_transaction)).await.unwrap();
    db.probe().await.unwrap();
    db.migrate().await.unwrap();
    let codec = Arc::new(AeadCodec::new(PASSPHRASE).unwrap());
    (db.clone(), MailRepository::new(db, codec))
}

pub fn sample_mail(n: usize) -> OutgoingMail {
    OutgoingMail {
        provider: "mailersend".into(),
        subject: format!("Contact form #{n}"),
        sender: format!("<p>Visitor {n} &lt;visitor{n}@example.com&gt;</p>"),
        content: format!("Hello, this is message number {n}."),
        recipients: vec![
            Recipient::new("owner@example.com", "Site Owner"),
            Recipient::new("ops@example.com", "Ops"),
        ],
    }
}
