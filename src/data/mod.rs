//! Table-oriented data access boundary.
//!
//! Every page talks to the hosted backend through [`DataClient`]. Rows travel
//! as [`Record`]s (field name to scalar [`Value`]); reads are narrowed with a
//! declarative [`Selection`] rather than query text, so the layer stays
//! storage-agnostic and never splices user input into SQL.

pub mod memory;
pub mod postgres;
pub mod timeout;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryDataClient;
pub use postgres::PgDataClient;
pub use timeout::TimeoutClient;

/// Identifier column every writable table carries.
pub const ID_FIELD: &str = "id";

/* -------------------------
   Values & records
--------------------------*/

/// One scalar cell. `Null` only shows up on reads of nullable columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Null or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Row identifier used for update targeting and pending-change ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of a remote table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn id(&self) -> Option<RecordId> {
        self.get(ID_FIELD).and_then(Value::as_i64).map(RecordId)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Overlay `patch` on top of this record.
    pub fn merge(&mut self, patch: &Record) {
        for (field, value) in patch.iter() {
            self.0.insert(field.to_string(), value.clone());
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/* -------------------------
   Tables & filters
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    /// Medicine / pharmacy inventory.
    Main,
    Appointment,
    /// Read-only reference data.
    Doctor,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Main => "main",
            Table::Appointment => "appointment",
            Table::Doctor => "doctor",
        }
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Table::Doctor)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    /// Case-insensitive substring match on the textual form of the column.
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Contains,
            value: value.into(),
        }
    }

    /// Reference semantics shared by every backend: both sides compare by
    /// their textual form, so a text query can match a numeric column.
    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };
        match (self.op, &self.value) {
            (FilterOp::Eq, Value::Null) => matches!(actual, Value::Null),
            (_, _) if matches!(actual, Value::Null) => false,
            (FilterOp::Eq, expected) => actual == expected || actual.to_string() == expected.to_string(),
            (FilterOp::Contains, needle) => actual
                .to_string()
                .to_lowercase()
                .contains(&needle.to_string().to_lowercase()),
        }
    }
}

/// Filters joined by one combinator. No filters selects every row.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Selection {
    pub combinator: Combinator,
    pub filters: Vec<Filter>,
}

impl Selection {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn all_of(filters: Vec<Filter>) -> Self {
        Self {
            combinator: Combinator::And,
            filters,
        }
    }

    pub fn any_of(filters: Vec<Filter>) -> Self {
        Self {
            combinator: Combinator::Or,
            filters,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        match self.combinator {
            Combinator::And => self.filters.iter().all(|f| f.matches(record)),
            Combinator::Or => self.filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// `(field, value)` target of a single-row update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowKey {
    pub field: String,
    pub value: Value,
}

impl RowKey {
    pub fn id(id: RecordId) -> Self {
        Self {
            field: ID_FIELD.to_string(),
            value: Value::Integer(id.get()),
        }
    }
}

/* -------------------------
   Errors & trait
--------------------------*/

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("timeout")]
    Timeout,
    #[error("table `{0}` is read-only")]
    ReadOnly(Table),
    #[error("invalid field name `{0}`")]
    InvalidField(String),
    #[error("db error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("row decode error: {0}")]
    Decode(String),
    /// Failure reported by the backend itself (constraint, permission, ...).
    #[error("{0}")]
    Rejected(String),
}

impl DataError {
    /// Primary-key collision, worded the way Postgres reports it.
    pub fn duplicate_key(table: Table, id: RecordId) -> Self {
        DataError::Rejected(format!(
            "duplicate key value violates unique constraint \"{}_pkey\" (id {id})",
            table.as_str()
        ))
    }
}

/// Field names reach SQL as quoted identifiers, so only plain
/// `[A-Za-z_][A-Za-z0-9_]*` names are accepted.
pub fn validate_field_name(field: &str) -> Result<(), DataError> {
    let mut chars = field.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            field.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DataError::InvalidField(field.to_string()))
    }
}

/// Remote table-oriented data access.
///
/// Used as `Arc<dyn DataClient>`. Implementations never retry; each call is
/// one round trip whose failure is reported to the calling workflow.
#[async_trait]
pub trait DataClient: Send + Sync {
    /// Rows of `table` matching `selection`.
    async fn select(&self, table: Table, selection: &Selection) -> Result<Vec<Record>, DataError>;

    /// Insert `rows`, returning them as stored (ids assigned).
    async fn insert(&self, table: Table, rows: &[Record]) -> Result<Vec<Record>, DataError>;

    /// Apply `patch` to every row whose `key.field` equals `key.value`.
    async fn update(&self, table: Table, patch: &Record, key: &RowKey) -> Result<(), DataError>;

    /// Insert `rows`, updating in place when `conflict_key` already exists.
    async fn upsert(&self, table: Table, rows: &[Record], conflict_key: &str) -> Result<(), DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medicine() -> Record {
        Record::new()
            .with("id", 4)
            .with("medicine_name", "Aspirin")
            .with("ingredients", "acetylsalicylic acid")
            .with("address", "12 Main St")
            .with("availability", true)
    }

    #[test]
    fn contains_is_case_insensitive() {
        assert!(Filter::contains("medicine_name", "aspi").matches(&medicine()));
        assert!(Filter::contains("ingredients", "SALICYLIC").matches(&medicine()));
        assert!(!Filter::contains("medicine_name", "ibu").matches(&medicine()));
    }

    #[test]
    fn eq_compares_textual_form() {
        assert!(Filter::eq("id", "4").matches(&medicine()));
        assert!(Filter::eq("availability", "true").matches(&medicine()));
        assert!(!Filter::eq("medicine_name", "aspirin").matches(&medicine()));
    }

    #[test]
    fn missing_field_never_matches() {
        assert!(!Filter::eq("pharmacy_name", "").matches(&medicine()));
    }

    #[test]
    fn selection_combinators() {
        let hit = Filter::contains("medicine_name", "asp");
        let miss = Filter::contains("ingredients", "ibuprofen");

        assert!(Selection::any_of(vec![hit.clone(), miss.clone()]).matches(&medicine()));
        assert!(!Selection::all_of(vec![hit, miss]).matches(&medicine()));
        assert!(Selection::all().matches(&medicine()));
    }

    #[test]
    fn record_id_reads_integer_identifier() {
        assert_eq!(medicine().id(), Some(RecordId::new(4)));
        assert_eq!(Record::new().with("id", "x").id(), None);
    }

    #[test]
    fn value_deserializes_untagged() {
        let record: Record =
            serde_json::from_str(r#"{"id":1,"dose":2.5,"name":"x","ok":false,"note":null}"#)
                .unwrap();
        assert_eq!(record.get("id"), Some(&Value::Integer(1)));
        assert_eq!(record.get("dose"), Some(&Value::Float(2.5)));
        assert_eq!(record.get("name"), Some(&Value::text("x")));
        assert_eq!(record.get("ok"), Some(&Value::Bool(false)));
        assert_eq!(record.get("note"), Some(&Value::Null));
    }

    #[test]
    fn field_names_are_plain_identifiers() {
        assert!(validate_field_name("medicine_name").is_ok());
        assert!(validate_field_name("_x1").is_ok());
        assert!(validate_field_name("1abc").is_err());
        assert!(validate_field_name("name\"; drop").is_err());
        assert!(validate_field_name("").is_err());
    }
}
