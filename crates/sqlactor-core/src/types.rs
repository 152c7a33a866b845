// SPDX-FileCopyrightText: 2026 Sqlactor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value model passed between callers and the connection thread.
//!
//! Everything here is plain owned data: it is moved into an operation on the
//! caller side and moved back out with the result, so no type in this module
//! borrows from the underlying SQLite handle.

use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, SqlActorError};

/// A single SQLite value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Name of the SQLite storage class, as reported by `typeof()`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Copy a borrowed engine value, applying `text` to TEXT columns.
    ///
    /// TEXT that is not valid UTF-8 is a [`SqlActorError::Data`] under
    /// [`TextFactory::String`]; read it with [`TextFactory::Bytes`] instead.
    pub fn from_value_ref(value: ValueRef<'_>, text: TextFactory) -> Result<Self> {
        Ok(match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(bytes) => match text {
                TextFactory::String => {
                    let decoded = std::str::from_utf8(bytes).map_err(|err| {
                        SqlActorError::Data(format!("could not decode TEXT value as UTF-8: {err}"))
                    })?;
                    Self::Text(decoded.to_owned())
                }
                TextFactory::Bytes => Self::Blob(bytes.to_vec()),
            },
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        })
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Self::Null => ValueRef::Null,
            Self::Integer(i) => ValueRef::Integer(*i),
            Self::Real(r) => ValueRef::Real(*r),
            Self::Text(s) => ValueRef::Text(s.as_bytes()),
            Self::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(b) => {
                f.write_str("x'")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

macro_rules! value_from_integer {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::Integer(i64::from(v))
            }
        })*
    };
}

value_from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Real(f64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Conversion out of a [`Value`] held by a [`Row`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &str, value: &Value) -> SqlActorError {
    SqlActorError::Data(format!(
        "cannot convert {} value to {expected}",
        value.type_name()
    ))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => Err(mismatch("i64", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| SqlActorError::Data(format!("{wide} out of range for i32")))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(i64::from_value(value)? != 0)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Real(r) => Ok(*r),
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(i) => Ok(*i as f64),
            other => Err(mismatch("f64", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Blob(b) => String::from_utf8(b.clone())
                .map_err(|e| SqlActorError::Data(format!("blob is not valid UTF-8: {e}"))),
            other => Err(mismatch("String", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => Err(mismatch("Vec<u8>", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// One result row: the column names of its result set plus its values.
///
/// Values are addressable by position or (case-insensitively) by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn value(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.column_index(name).and_then(|idx| self.values.get(idx))
    }

    /// Convert the value at `idx`.
    pub fn get<T: FromValue>(&self, idx: usize) -> Result<T> {
        let value = self.values.get(idx).ok_or_else(|| {
            SqlActorError::Programming(format!(
                "column index {idx} out of range for row of {}",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Convert the value of the column called `name`.
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| SqlActorError::Programming(format!("no such column: {name}")))?;
        self.get(idx)
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|col| col.eq_ignore_ascii_case(name))
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, idx: usize) -> &Value {
        &self.values[idx]
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Parameters bound to a statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Params {
    #[default]
    None,
    /// `?` / `?NNN` placeholders, in order.
    Positional(Vec<Value>),
    /// `:name`, `@name` or `$name` placeholders. Names include the prefix.
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Positional(values) => values.len(),
            Self::Named(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Self::None
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Params {
    fn from(values: [T; N]) -> Self {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<(String, Value)>> for Params {
    fn from(pairs: Vec<(String, Value)>) -> Self {
        Self::Named(pairs)
    }
}

/// Build positional [`Params`] from a list of expressions convertible into [`Value`].
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::None
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::Positional(vec![$($crate::Value::from($value)),+])
    };
}

/// Build named [`Params`]: `named_params! { ":id" => 1, ":name" => "x" }`.
#[macro_export]
macro_rules! named_params {
    ($($name:literal => $value:expr),* $(,)?) => {
        $crate::Params::Named(vec![$(($name.to_string(), $crate::Value::from($value))),*])
    };
}

/// Transaction mode used when a DML statement implicitly opens a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationLevel {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
    /// Never open transactions implicitly; every statement commits on its own.
    Autocommit,
}

impl IsolationLevel {
    /// The statement that opens a transaction in this mode, if any.
    pub fn begin_statement(self) -> Option<&'static str> {
        match self {
            Self::Deferred => Some("BEGIN DEFERRED"),
            Self::Immediate => Some("BEGIN IMMEDIATE"),
            Self::Exclusive => Some("BEGIN EXCLUSIVE"),
            Self::Autocommit => None,
        }
    }
}

/// How TEXT columns are returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFactory {
    /// As [`Value::Text`], replacing invalid UTF-8.
    #[default]
    String,
    /// As [`Value::Blob`] with the raw bytes.
    Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let columns: Arc<[String]> = vec!["id".to_string(), "Name".to_string()].into();
        Row::new(columns, vec![Value::Integer(7), Value::Text("alice".into())])
    }

    #[test]
    fn row_access_by_index_and_name() {
        let row = sample_row();
        assert_eq!(row.get::<i64>(0).unwrap(), 7);
        assert_eq!(row.get_by_name::<String>("name").unwrap(), "alice");
        assert_eq!(row[1], Value::Text("alice".into()));
        assert!(row.value_by_name("missing").is_none());
        assert!(matches!(
            row.get::<i64>(5),
            Err(SqlActorError::Programming(_))
        ));
    }

    #[test]
    fn conversion_mismatch_is_a_data_error() {
        let row = sample_row();
        let err = row.get::<i64>(1).unwrap_err();
        assert!(matches!(err, SqlActorError::Data(_)));
        assert_eq!(row.get::<Option<String>>(1).unwrap().as_deref(), Some("alice"));
    }

    #[test]
    fn params_macros_build_expected_variants() {
        assert_eq!(params![], Params::None);
        assert_eq!(
            params![1, "two", 3.5, None::<i64>],
            Params::Positional(vec![
                Value::Integer(1),
                Value::Text("two".into()),
                Value::Real(3.5),
                Value::Null,
            ])
        );
        let named = named_params! { ":id" => 1, ":name" => "x" };
        assert_eq!(named.len(), 2);
        assert!(matches!(named, Params::Named(_)));
    }

    #[test]
    fn row_serializes_as_object() {
        let json = serde_json::to_string(&sample_row()).unwrap();
        assert_eq!(json, r#"{"id":7,"Name":"alice"}"#);
    }

    #[test]
    fn isolation_levels_map_to_begin_statements() {
        assert_eq!(IsolationLevel::default().begin_statement(), Some("BEGIN DEFERRED"));
        assert_eq!(IsolationLevel::Autocommit.begin_statement(), None);
        let parsed: IsolationLevel = serde_json::from_str("\"immediate\"").unwrap();
        assert_eq!(parsed, IsolationLevel::Immediate);
    }

    #[test]
    fn text_factory_controls_text_conversion() {
        let text = ValueRef::Text(b"caf\xc3\xa9");
        assert_eq!(
            Value::from_value_ref(text, TextFactory::String).unwrap(),
            Value::Text("café".into())
        );
        assert_eq!(
            Value::from_value_ref(text, TextFactory::Bytes).unwrap(),
            Value::Blob("café".as_bytes().to_vec())
        );
        assert_eq!(
            Value::from_value_ref(ValueRef::Integer(3), TextFactory::Bytes).unwrap(),
            Value::Integer(3)
        );
    }

    #[test]
    fn invalid_utf8_text_is_a_data_error() {
        let text = ValueRef::Text(b"caf\xe9");
        let err = Value::from_value_ref(text, TextFactory::String).unwrap_err();
        assert!(matches!(err, SqlActorError::Data(ref m) if m.contains("UTF-8")), "{err:?}");
        assert_eq!(
            Value::from_value_ref(text, TextFactory::Bytes).unwrap(),
            Value::Blob(b"caf\xe9".to_vec())
        );
    }

    #[test]
    fn blob_display_is_hex_literal() {
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_string(), "x'dead'");
        assert_eq!(Value::Null.to_string(), "NULL");
    }
}
