// src/workflow/form.rs

use std::fmt;

use serde::Serialize;

use crate::data::{DataClient, Record, Table, Value};
use crate::workflow::{OperationOutcome, ValidationError, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
}

impl FieldKind {
    /// Empty string for text and number inputs, `false` for checkboxes.
    pub fn default_value(self) -> Value {
        match self {
            FieldKind::Text | FieldKind::Number => Value::Text(String::new()),
            FieldKind::Boolean => Value::Bool(false),
        }
    }

    /// Number inputs hold raw text until submit, so text is accepted too.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::Text => matches!(value, Value::Text(_)),
            FieldKind::Number => value.is_number() || matches!(value, Value::Text(_)),
            FieldKind::Boolean => matches!(value, Value::Bool(_)),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FieldKind::Text => "text",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            required: false,
        }
    }

    pub const fn number(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Number,
            required: false,
        }
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Boolean,
            required: false,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Ordered fields managed by one form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet {
    fields: &'static [FieldSpec],
}

impl FieldSet {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn spec(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Current values of one record's editable fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    field_set: FieldSet,
    values: Vec<Value>,
}

impl FormState {
    pub fn new(field_set: FieldSet) -> Self {
        let values = field_set
            .fields()
            .iter()
            .map(|f| f.kind.default_value())
            .collect();
        Self { field_set, values }
    }

    pub fn field_set(&self) -> FieldSet {
        self.field_set
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.field_set.position(name).map(|i| &self.values[i])
    }

    /// `(spec, value)` pairs in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static FieldSpec, &Value)> {
        self.field_set.fields().iter().zip(self.values.iter())
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), ValidationError> {
        let idx = self
            .field_set
            .position(name)
            .ok_or_else(|| ValidationError::UnknownField(name.to_string()))?;
        let spec = &self.field_set.fields()[idx];
        if !spec.kind.accepts(&value) {
            return Err(ValidationError::TypeMismatch {
                field: name.to_string(),
                expected: spec.kind,
            });
        }
        self.values[idx] = value;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let missing = self
            .entries()
            .any(|(spec, value)| spec.required && value.is_blank());
        if missing {
            Err(ValidationError::MissingRequired)
        } else {
            Ok(())
        }
    }

    pub fn reset(&mut self) {
        for (slot, spec) in self.values.iter_mut().zip(self.field_set.fields()) {
            *slot = spec.kind.default_value();
        }
    }

    /// Row to insert. Text is trimmed, number text parsed, and blank optional
    /// fields are left out so the table default applies.
    pub fn to_record(&self) -> Result<Record, ValidationError> {
        let mut record = Record::new();
        for (spec, value) in self.entries() {
            if value.is_blank() {
                continue;
            }
            let cell = match (spec.kind, value) {
                (FieldKind::Number, Value::Text(raw)) => parse_number(raw)
                    .ok_or_else(|| ValidationError::InvalidNumber(spec.name.to_string()))?,
                (FieldKind::Text, Value::Text(raw)) => Value::Text(raw.trim().to_string()),
                (_, other) => other.clone(),
            };
            record.insert(spec.name, cell);
        }
        Ok(record)
    }
}

fn parse_number(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

/// Add-record page: a form and the table it inserts into.
#[derive(Debug, Clone)]
pub struct FormWorkflow {
    table: Table,
    form: FormState,
    outcome: Option<OperationOutcome>,
}

impl FormWorkflow {
    pub fn new(table: Table, field_set: FieldSet) -> Self {
        Self {
            table,
            form: FormState::new(field_set),
            outcome: None,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn outcome(&self) -> Option<&OperationOutcome> {
        self.outcome.as_ref()
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), ValidationError> {
        let result = self.form.set_field(name, value);
        if let Err(err) = &result {
            self.outcome = Some(err.clone().into());
        }
        result
    }

    pub fn reset(&mut self) {
        self.form.reset();
        self.outcome = None;
    }

    /// Validate, insert, and reset only once the insert is confirmed.
    pub async fn submit(&mut self, client: &dyn DataClient) -> OperationOutcome {
        let outcome = match self.try_submit(client).await {
            Ok(stored) => {
                tracing::info!(table = %self.table, id = ?stored.id(), "record added");
                self.form.reset();
                OperationOutcome::success("record added")
            }
            Err(err) => {
                if let WorkflowError::Write(source) = &err {
                    tracing::warn!(table = %self.table, error = %source, "insert failed");
                }
                err.into()
            }
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn try_submit(&self, client: &dyn DataClient) -> Result<Record, WorkflowError> {
        self.form.validate()?;
        let row = self.form.to_record()?;

        let mut stored = client
            .insert(self.table, std::slice::from_ref(&row))
            .await
            .map_err(WorkflowError::Write)?;
        Ok(stored.pop().unwrap_or(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataError, MemoryDataClient, RecordId};

    const FIELDS: FieldSet = FieldSet::new(&[
        FieldSpec::number("id").required(),
        FieldSpec::text("medicine_name").required(),
        FieldSpec::text("address"),
        FieldSpec::boolean("availability"),
    ]);

    fn filled() -> FormState {
        let mut form = FormState::new(FIELDS);
        form.set_field("id", Value::text(" 7 ")).unwrap();
        form.set_field("medicine_name", Value::text(" Aspirin ")).unwrap();
        form.set_field("availability", Value::Bool(true)).unwrap();
        form
    }

    #[test]
    fn reset_restores_declared_defaults() {
        let mut form = filled();
        form.set_field("address", Value::text("12 Main St")).unwrap();
        form.reset();

        for (spec, value) in form.entries() {
            assert_eq!(*value, spec.kind.default_value(), "field {}", spec.name);
        }
        assert_eq!(form.value("availability"), Some(&Value::Bool(false)));
        assert_eq!(form.value("id"), Some(&Value::text("")));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut form = FormState::new(FIELDS);
        let err = form.set_field("dosage", Value::text("x")).unwrap_err();
        assert_eq!(err, ValidationError::UnknownField("dosage".into()));
        assert_eq!(form, FormState::new(FIELDS));
    }

    #[test]
    fn kinds_are_enforced() {
        let mut form = FormState::new(FIELDS);
        assert!(matches!(
            form.set_field("availability", Value::text("yes")),
            Err(ValidationError::TypeMismatch { .. })
        ));
        assert!(form.set_field("id", Value::Integer(2)).is_ok());
        assert!(form.set_field("medicine_name", Value::Integer(1)).is_err());
    }

    #[test]
    fn validate_flags_blank_required_fields() {
        let mut form = filled();
        assert!(form.validate().is_ok());

        form.set_field("medicine_name", Value::text("   ")).unwrap();
        assert_eq!(form.validate(), Err(ValidationError::MissingRequired));
    }

    #[test]
    fn to_record_parses_numbers_and_skips_blanks() {
        let record = filled().to_record().unwrap();

        assert_eq!(record.id(), Some(RecordId::new(7)));
        assert_eq!(record.get("medicine_name"), Some(&Value::text("Aspirin")));
        assert_eq!(record.get("availability"), Some(&Value::Bool(true)));
        assert!(!record.contains("address"));
    }

    #[test]
    fn to_record_rejects_garbage_numbers() {
        let mut form = filled();
        form.set_field("id", Value::text("seven")).unwrap();
        assert_eq!(
            form.to_record(),
            Err(ValidationError::InvalidNumber("id".into()))
        );
    }

    #[tokio::test]
    async fn submit_with_missing_field_never_calls_backend() {
        let client = MemoryDataClient::new();
        let mut page = FormWorkflow::new(Table::Main, FIELDS);
        page.set_field("id", Value::text("3")).unwrap();

        let outcome = page.submit(&client).await;

        assert_eq!(outcome, OperationOutcome::failure("missing required fields"));
        assert!(client.calls().await.is_empty());
        assert_eq!(page.form().value("id"), Some(&Value::text("3")));
    }

    #[tokio::test]
    async fn successful_submit_inserts_and_resets() {
        let client = MemoryDataClient::new();
        let mut page = FormWorkflow::new(Table::Main, FIELDS);
        page.set_field("id", Value::text("1")).unwrap();
        page.set_field("medicine_name", Value::text("x")).unwrap();

        let outcome = page.submit(&client).await;

        assert_eq!(outcome, OperationOutcome::success("record added"));
        assert_eq!(page.form(), &FormState::new(FIELDS));
        let rows = client.rows(Table::Main).await;
        assert_eq!(rows[0].id(), Some(RecordId::new(1)));
        assert!(!rows[0].contains("address"));
    }

    #[tokio::test]
    async fn failed_insert_keeps_form_values() {
        let client = MemoryDataClient::new();
        client.fail_next_insert("connection reset").await;
        let mut page = FormWorkflow::new(Table::Main, FIELDS);
        page.set_field("id", Value::text("1")).unwrap();
        page.set_field("medicine_name", Value::text("x")).unwrap();

        let outcome = page.submit(&client).await;

        assert_eq!(outcome, OperationOutcome::failure("connection reset"));
        assert_eq!(page.form().value("medicine_name"), Some(&Value::text("x")));
        assert_eq!(page.outcome(), Some(&outcome));
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected_and_form_kept() {
        let client = MemoryDataClient::seeded([(
            Table::Main,
            vec![Record::new().with("id", 1).with("medicine_name", "Aspirin")],
        )]);
        let mut page = FormWorkflow::new(Table::Main, FIELDS);
        page.set_field("id", Value::text("1")).unwrap();
        page.set_field("medicine_name", Value::text("Panadol")).unwrap();

        let outcome = page.submit(&client).await;

        let expected = DataError::duplicate_key(Table::Main, RecordId::new(1)).to_string();
        assert_eq!(outcome.reason(), Some(expected.as_str()));
        assert_eq!(page.form().value("id"), Some(&Value::text("1")));
        assert_eq!(page.form().value("medicine_name"), Some(&Value::text("Panadol")));
        assert_eq!(client.rows(Table::Main).await.len(), 1);
    }
}
