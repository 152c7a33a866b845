// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQL text dump of a database.

use futures::{Stream, StreamExt};
use futures::stream;
use sqlactor_core::Result;

use crate::actor::Worker;
use crate::connection::Connection;

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn strings(conn: &rusqlite::Connection, sql: &str, column: usize) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let values = stmt
        .query_map([], |row| row.get::<_, String>(column))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(values)
}

/// Statements that recreate the schema and contents of `conn`'s main database.
pub(crate) fn dump_lines(conn: &rusqlite::Connection) -> Result<Vec<String>> {
    let mut lines = vec!["BEGIN TRANSACTION;".to_string()];

    let tables: Vec<(String, String)> = {
        let mut stmt = conn.prepare(
            r#"SELECT "name", "sql" FROM "sqlite_master"
               WHERE "sql" NOT NULL AND "type" == 'table'
               ORDER BY "name""#,
        )?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?
    };

    for (name, sql) in tables {
        match name.as_str() {
            "sqlite_sequence" => lines.push(r#"DELETE FROM "sqlite_sequence";"#.to_string()),
            "sqlite_stat1" => lines.push(r#"ANALYZE "sqlite_master";"#.to_string()),
            other if other.starts_with("sqlite_") => continue,
            _ => lines.push(format!("{sql};")),
        }

        let table = quote_ident(&name);
        let columns = strings(conn, &format!("PRAGMA table_info({table})"), 1)?;
        let values = columns
            .iter()
            .map(|col| format!("quote({})", quote_ident(col)))
            .collect::<Vec<_>>()
            .join(" || ',' || ");
        let select = format!(
            "SELECT 'INSERT INTO ' || {literal} || ' VALUES(' || {values} || ')' FROM {table}",
            literal = sql_literal(&table),
        );
        lines.extend(strings(conn, &select, 0)?.into_iter().map(|row| format!("{row};")));
    }

    let others = strings(
        conn,
        r#"SELECT "sql" FROM "sqlite_master"
           WHERE "sql" NOT NULL AND "type" IN ('index', 'trigger', 'view')"#,
        0,
    )?;
    lines.extend(others.into_iter().map(|sql| format!("{sql};")));

    lines.push("COMMIT;".to_string());
    Ok(lines)
}

fn sql_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

impl Connection {
    /// The whole dump, one statement per entry.
    pub async fn dump(&self) -> Result<Vec<String>> {
        self.actor()
            .call("dump", |worker: &mut Worker| dump_lines(worker.conn()?))
            .await
    }

    /// Stream the dump line by line.
    ///
    /// The dump is generated in one operation, so it reflects a single point in time.
    pub fn iterdump(&self) -> impl Stream<Item = Result<String>> + '_ {
        stream::once(self.dump()).flat_map(|outcome| match outcome {
            Ok(lines) => stream::iter(lines.into_iter().map(Ok).collect::<Vec<_>>()),
            Err(err) => stream::iter(vec![Err(err)]),
        })
    }
}
