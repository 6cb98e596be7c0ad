//! Integration tests for birdeval.
//!
//! Shared fixtures for building benchmark-shaped directories on disk.

pub mod evaluate_test;
pub mod loader_test;
pub mod server_test;
pub mod split_test;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};

/// Creates `{root}/{db_id}/{db_id}.sqlite` and runs `setup_sql` in it.
pub async fn create_sqlite_db(root: &Path, db_id: &str, setup_sql: &str) -> PathBuf {
    let dir = root.join(db_id);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{db_id}.sqlite"));

    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    sqlx::raw_sql(setup_sql).execute(&mut conn).await.unwrap();
    conn.close().await.unwrap();
    path
}

/// Writes `contents` to `{dir}/{name}` and returns the path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Formats a raw prediction string the way the generator writes it.
pub fn tabbed(sql: &str, db_id: &str) -> String {
    format!("{sql}\t----- bird -----\t{db_id}")
}
