use anyhow::Result;
use libsql::{Builder, Connection};
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

use crate::constants::DATABASE_FILE_NAME;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                  TEXT    PRIMARY KEY,
    username            TEXT    UNIQUE NOT NULL,
    password_hash       TEXT    NOT NULL,
    marked_for_deletion TEXT
);
"#;

const CREATE_CATEGORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
    id    TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    name  TEXT NOT NULL
);
"#;

const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id              TEXT PRIMARY KEY,
    owner           TEXT NOT NULL,
    category        TEXT,
    payment_method  TEXT NOT NULL DEFAULT '',
    processed_at    TEXT NOT NULL,
    receiver        TEXT NOT NULL DEFAULT '',
    information     TEXT NOT NULL DEFAULT '',
    transfer_amount REAL NOT NULL
);
"#;

const CREATE_SUBSCRIPTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id              TEXT    PRIMARY KEY,
    owner           TEXT    NOT NULL,
    category        TEXT,
    payment_method  TEXT    NOT NULL DEFAULT '',
    receiver        TEXT    NOT NULL DEFAULT '',
    information     TEXT    NOT NULL DEFAULT '',
    transfer_amount REAL    NOT NULL,
    execute_at      INTEGER NOT NULL CHECK (execute_at BETWEEN 1 AND 31),
    paused          INTEGER NOT NULL DEFAULT 0
);
"#;

const CREATE_TRANSACTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_owner_processed_at
    ON transactions(owner, processed_at);
"#;

const CREATE_SUBSCRIPTIONS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_subscriptions_execute_at
    ON subscriptions(paused, execute_at);
"#;

const CREATE_USERS_DELETION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_users_marked_for_deletion
    ON users(marked_for_deletion);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Opens (or creates) the application database inside `data_dir` and makes
/// sure every table the server reads or writes exists.
pub async fn init_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join(DATABASE_FILE_NAME);
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    create_schema(&conn).await?;
    Ok(Arc::new(RwLock::new(conn)))
}

pub async fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_CATEGORIES_TABLE, ()).await?;
    conn.execute(CREATE_TRANSACTIONS_TABLE, ()).await?;
    conn.execute(CREATE_SUBSCRIPTIONS_TABLE, ()).await?;
    conn.execute(CREATE_TRANSACTIONS_INDEX, ()).await?;
    conn.execute(CREATE_SUBSCRIPTIONS_INDEX, ()).await?;
    conn.execute(CREATE_USERS_DELETION_INDEX, ()).await?;
    Ok(())
}
