// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Statement execution on the connection thread.
//!
//! Result sets are read to completion while the statement is still alive and
//! parked in a [`CursorState`]; cursor handles then drain that buffer in
//! batches.

use std::collections::VecDeque;
use std::sync::Arc;

use rusqlite::Statement;
use sqlactor_core::{IsolationLevel, Params, Result, Row, SqlActorError, TextFactory, Value};

use crate::actor::Worker;

/// Identifies one open cursor on a connection thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CursorId(u64);

/// Server-side state of a cursor.
#[derive(Debug)]
pub(crate) struct CursorState {
    rows: VecDeque<Row>,
    description: Option<Arc<[String]>>,
    rowcount: i64,
    lastrowid: Option<i64>,
    arraysize: usize,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            rows: VecDeque::new(),
            description: None,
            rowcount: -1,
            lastrowid: None,
            arraysize: 1,
        }
    }
}

impl CursorState {
    fn load(&mut self, outcome: Outcome) {
        self.rows = outcome.rows;
        self.description = outcome.columns;
        self.rowcount = outcome.rowcount;
        if outcome.lastrowid.is_some() {
            self.lastrowid = outcome.lastrowid;
        }
    }

    fn reset(&mut self) {
        self.rows.clear();
        self.description = None;
        self.rowcount = -1;
    }

    /// Take up to `n` buffered rows (`arraysize` when `None`).
    pub(crate) fn fetch(&mut self, n: Option<usize>) -> Vec<Row> {
        let n = n.unwrap_or(self.arraysize).min(self.rows.len());
        self.rows.drain(..n).collect()
    }

    pub(crate) fn fetch_one(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    pub(crate) fn fetch_all(&mut self) -> Vec<Row> {
        self.rows.drain(..).collect()
    }

    pub(crate) fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    pub(crate) fn rowcount(&self) -> i64 {
        self.rowcount
    }

    pub(crate) fn lastrowid(&self) -> Option<i64> {
        self.lastrowid
    }

    pub(crate) fn description(&self) -> Option<Vec<String>> {
        self.description.as_ref().map(|cols| cols.to_vec())
    }

    pub(crate) fn arraysize(&self) -> usize {
        self.arraysize
    }

    pub(crate) fn set_arraysize(&mut self, size: usize) {
        self.arraysize = size.max(1);
    }
}

/// Everything a single statement produced.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) columns: Option<Arc<[String]>>,
    pub(crate) rows: VecDeque<Row>,
    pub(crate) rowcount: i64,
    pub(crate) lastrowid: Option<i64>,
}

/// Leading keyword of `sql`, skipping whitespace and comments.
fn leading_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.find('\n').map_or("", |i| &after[i + 1..]);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.find("*/").map_or("", |i| &after[i + 2..]);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Statements that open an implicit transaction.
pub(crate) fn is_dml(sql: &str) -> bool {
    let keyword = leading_keyword(sql);
    ["INSERT", "UPDATE", "DELETE", "REPLACE"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

fn is_insert(sql: &str) -> bool {
    let keyword = leading_keyword(sql);
    keyword.eq_ignore_ascii_case("INSERT") || keyword.eq_ignore_ascii_case("REPLACE")
}

fn bind(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    let expected = stmt.parameter_count();
    match params {
        Params::None if expected == 0 => Ok(()),
        Params::None => Err(SqlActorError::Programming(format!(
            "incorrect number of bindings supplied: statement uses {expected}, 0 supplied"
        ))),
        Params::Positional(values) => {
            if values.len() != expected {
                return Err(SqlActorError::Programming(format!(
                    "incorrect number of bindings supplied: statement uses {expected}, {} supplied",
                    values.len()
                )));
            }
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
            Ok(())
        }
        Params::Named(pairs) => {
            for (name, value) in pairs {
                let idx = stmt.parameter_index(name)?.ok_or_else(|| {
                    SqlActorError::Programming(format!("no binding for named parameter {name}"))
                })?;
                stmt.raw_bind_parameter(idx, value)?;
            }
            for idx in 1..=expected {
                match stmt.parameter_name(idx) {
                    None => {
                        return Err(SqlActorError::Programming(format!(
                            "named parameters supplied but placeholder {idx} is positional"
                        )));
                    }
                    Some(name) if !pairs.iter().any(|(supplied, _)| supplied == name) => {
                        return Err(SqlActorError::Programming(format!(
                            "no value supplied for binding parameter {name}"
                        )));
                    }
                    Some(_) => {}
                }
            }
            Ok(())
        }
    }
}

fn count(changes: u64) -> i64 {
    i64::try_from(changes).unwrap_or(i64::MAX)
}

/// Open a transaction before DML when the isolation level asks for one.
pub(crate) fn begin_implicit(
    conn: &rusqlite::Connection,
    level: IsolationLevel,
    sql: &str,
) -> Result<()> {
    if let Some(begin) = level.begin_statement()
        && conn.is_autocommit()
        && is_dml(sql)
    {
        conn.execute_batch(begin)?;
    }
    Ok(())
}

/// Run one statement and materialize whatever it returns.
pub(crate) fn run_statement(
    conn: &rusqlite::Connection,
    level: IsolationLevel,
    text: TextFactory,
    sql: &str,
    params: &Params,
) -> Result<Outcome> {
    begin_implicit(conn, level, sql)?;
    let mut stmt = conn.prepare(sql)?;
    bind(&mut stmt, params)?;

    let width = stmt.column_count();
    if width == 0 {
        let changes = stmt.raw_execute()?;
        let dml = is_dml(sql);
        return Ok(Outcome {
            columns: None,
            rows: VecDeque::new(),
            rowcount: if dml { count(changes as u64) } else { -1 },
            lastrowid: (dml && is_insert(sql)).then(|| conn.last_insert_rowid()),
        });
    }

    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut rows = VecDeque::new();
    let mut cursor = stmt.raw_query();
    while let Some(row) = cursor.next()? {
        let values = (0..width)
            .map(|i| Value::from_value_ref(row.get_ref(i)?, text))
            .collect::<Result<Vec<_>>>()?;
        rows.push_back(Row::new(Arc::clone(&columns), values));
    }
    Ok(Outcome {
        columns: Some(columns),
        rows,
        rowcount: -1,
        lastrowid: is_insert(sql).then(|| conn.last_insert_rowid()),
    })
}

/// Run a row-less statement once per parameter set. Returns the summed row count.
pub(crate) fn run_many(
    conn: &rusqlite::Connection,
    level: IsolationLevel,
    sql: &str,
    batches: &[Params],
) -> Result<Outcome> {
    begin_implicit(conn, level, sql)?;
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() > 0 {
        return Err(SqlActorError::Programming(
            "execute_many() can only run statements that return no rows".into(),
        ));
    }
    let mut total: u64 = 0;
    for params in batches {
        bind(&mut stmt, params)?;
        total += stmt.raw_execute()? as u64;
    }
    Ok(Outcome {
        columns: None,
        rows: VecDeque::new(),
        rowcount: if is_dml(sql) { count(total) } else { -1 },
        lastrowid: None,
    })
}

/// Commit any open transaction, then run `script` as-is.
pub(crate) fn run_script(conn: &rusqlite::Connection, script: &str) -> Result<()> {
    if !conn.is_autocommit() {
        conn.execute_batch("COMMIT")?;
    }
    conn.execute_batch(script)?;
    Ok(())
}

const CLOSED_CURSOR: &str = "cannot operate on a closed cursor";

impl Worker {
    pub(crate) fn open_cursor(&mut self) -> CursorId {
        let id = CursorId(self.next_cursor);
        self.next_cursor += 1;
        self.cursors.insert(id, CursorState::default());
        id
    }

    pub(crate) fn cursor(&mut self, id: CursorId) -> Result<&mut CursorState> {
        self.cursors
            .get_mut(&id)
            .ok_or_else(|| SqlActorError::Programming(CLOSED_CURSOR.into()))
    }

    pub(crate) fn close_cursor(&mut self, id: CursorId) {
        self.cursors.remove(&id);
    }

    /// Execute `sql` and park its result in cursor `id`.
    pub(crate) fn cursor_execute(&mut self, id: CursorId, sql: &str, params: &Params) -> Result<()> {
        self.cursor(id)?.reset();
        let (level, text) = (self.isolation_level, self.text_factory);
        let outcome = run_statement(self.conn()?, level, text, sql, params)?;
        self.cursor(id)?.load(outcome);
        Ok(())
    }

    pub(crate) fn cursor_execute_many(
        &mut self,
        id: CursorId,
        sql: &str,
        batches: &[Params],
    ) -> Result<()> {
        self.cursor(id)?.reset();
        let level = self.isolation_level;
        let outcome = run_many(self.conn()?, level, sql, batches)?;
        self.cursor(id)?.load(outcome);
        Ok(())
    }

    pub(crate) fn cursor_execute_script(&mut self, id: CursorId, script: &str) -> Result<()> {
        self.cursor(id)?.reset();
        run_script(self.conn()?, script)
    }

    /// Open a cursor and execute into it; the cursor is discarded on failure.
    pub(crate) fn execute_new(&mut self, sql: &str, params: &Params) -> Result<CursorId> {
        let id = self.open_cursor();
        match self.cursor_execute(id, sql, params) {
            Ok(()) => Ok(id),
            Err(err) => {
                self.close_cursor(id);
                Err(err)
            }
        }
    }

    /// Run a statement without keeping a cursor around.
    pub(crate) fn execute_direct(&mut self, sql: &str, params: &Params) -> Result<Outcome> {
        let (level, text) = (self.isolation_level, self.text_factory);
        run_statement(self.conn()?, level, text, sql, params)
    }

    pub(crate) fn commit(&mut self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub(crate) fn rollback(&mut self) -> Result<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Switching to autocommit commits whatever transaction is open.
    pub(crate) fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        if level == IsolationLevel::Autocommit {
            self.commit()?;
        }
        self.isolation_level = level;
        Ok(())
    }
}
