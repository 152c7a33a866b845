// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `sqlactor query`, `sqlactor script` and `sqlactor dump`.

use std::io::Write;
use std::path::Path;

use futures::TryStreamExt;
use sqlactor::{Connection, Params, Value};

use crate::CliError;

/// Interpret a command-line parameter: integer, then finite real, then `NULL`, else text.
pub(crate) fn parse_param(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Some(r) = raw.parse::<f64>().ok().filter(|r| r.is_finite()) {
        Value::Real(r)
    } else if raw.eq_ignore_ascii_case("null") {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}

fn write_err(err: std::io::Error) -> CliError {
    CliError::io("writing output")(err)
}

/// Execute `sql`, commit, and print its rows as they stream in.
pub async fn run_query<W: Write>(
    conn: &Connection,
    sql: &str,
    params: &[String],
    json: bool,
    out: &mut W,
) -> Result<(), CliError> {
    let params = Params::Positional(params.iter().map(|p| parse_param(p)).collect());
    let cursor = conn.execute(sql, params).await?;

    if !json && let Some(columns) = cursor.description().await? {
        writeln!(out, "{}", columns.join("\t")).map_err(write_err)?;
    }

    let mut rows = std::pin::pin!(cursor.rows());
    while let Some(row) = rows.try_next().await? {
        if json {
            let line = serde_json::to_string(&row)
                .map_err(|e| CliError::io("encoding row")(e.into()))?;
            writeln!(out, "{line}").map_err(write_err)?;
        } else {
            let cells: Vec<String> = row.values().iter().map(ToString::to_string).collect();
            writeln!(out, "{}", cells.join("\t")).map_err(write_err)?;
        }
    }

    let changed = cursor.rowcount().await?;
    conn.commit().await?;
    if changed >= 0 {
        tracing::info!(rows = changed, "statement applied");
    }
    Ok(())
}

/// Run the script in `file`.
pub async fn run_script<W: Write>(conn: &Connection, file: &Path, out: &mut W) -> Result<(), CliError> {
    let script = std::fs::read_to_string(file)
        .map_err(CliError::io(format!("reading {}", file.display())))?;
    conn.execute_script(&script).await?;
    let changes = conn.total_changes().await?;
    writeln!(out, "ok ({changes} rows changed)").map_err(write_err)?;
    Ok(())
}

/// Print every dump statement on its own line.
pub async fn run_dump<W: Write>(conn: &Connection, out: &mut W) -> Result<(), CliError> {
    let mut lines = std::pin::pin!(conn.iterdump());
    while let Some(line) = lines.try_next().await? {
        writeln!(out, "{line}").map_err(write_err)?;
    }
    Ok(())
}
