// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sqlactor backup` command implementation.

use std::path::Path;
use std::time::Duration;

use sqlactor::{BackupOptions, Connection};

use crate::CliError;

/// Copy the open database into `dest` and report the size written.
///
/// Copies 100 pages per step so other work queued on the connection is not
/// starved for long by a large database.
pub async fn run_backup(conn: &Connection, dest: &Path) -> Result<(), CliError> {
    let options = BackupOptions::default()
        .pages(100)
        .sleep(Duration::from_millis(10))
        .progress(|p| {
            tracing::debug!(remaining = p.remaining, pages = p.page_count, "backup step");
        });
    conn.backup_to_path(dest, options).await?;

    let metadata = std::fs::metadata(dest)
        .map_err(CliError::io(format!("reading {}", dest.display())))?;
    let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);
    eprintln!("Backup complete: {size_mb:.1} MB written to {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backup_writes_readable_copy() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("backup.db");

        let conn = sqlactor::connect(":memory:").await.unwrap();
        conn.execute_script(
            "CREATE TABLE test (id INTEGER PRIMARY KEY, value TEXT);
             INSERT INTO test VALUES (1, 'hello');
             INSERT INTO test VALUES (2, 'world');",
        )
        .await
        .unwrap();
        run_backup(&conn, &dest).await.unwrap();

        let copy = sqlactor::connect(&dest).await.unwrap();
        let rows = copy
            .execute_fetchall("SELECT COUNT(*) FROM test", ())
            .await
            .unwrap();
        assert_eq!(rows[0].get::<i64>(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn backup_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("absent").join("backup.db");
        let conn = sqlactor::connect(":memory:").await.unwrap();
        assert!(run_backup(&conn, &dest).await.is_err());
    }
}
