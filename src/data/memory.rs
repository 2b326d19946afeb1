//! In-process [`DataClient`] backed by per-table vectors.
//!
//! Serves as the demo backend when no `DATABASE_URL` is configured and as the
//! test double for the workflows: failures and latency can be injected, and
//! every call is logged so tests can assert what reached the backend.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    DataClient, DataError, ID_FIELD, Record, RecordId, RowKey, Selection, Table, Value,
    validate_field_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Select,
    Insert,
    Update,
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    pub table: Table,
}

#[derive(Debug, Default)]
struct TableData {
    rows: Vec<Record>,
    next_id: i64,
}

impl TableData {
    fn contains(&self, id: RecordId) -> bool {
        self.rows.iter().any(|row| row.id() == Some(id))
    }

    fn push(&mut self, mut row: Record) -> Record {
        match row.id() {
            Some(id) => self.next_id = self.next_id.max(id.get()),
            None => {
                self.next_id += 1;
                row.insert(ID_FIELD, Value::Integer(self.next_id));
            }
        }
        self.rows.push(row.clone());
        row
    }
}

#[derive(Debug, Default)]
struct Faults {
    next_select: Option<String>,
    next_insert: Option<String>,
    writes: HashMap<(Table, RecordId), String>,
    select_delays: Vec<(String, Duration)>,
}

#[derive(Debug, Default)]
pub struct MemoryDataClient {
    tables: Mutex<HashMap<Table, TableData>>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<Call>>,
}

impl MemoryDataClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `rows`; rows without an `id` get one assigned.
    pub fn seeded(rows: impl IntoIterator<Item = (Table, Vec<Record>)>) -> Self {
        let mut tables: HashMap<Table, TableData> = HashMap::new();
        for (table, records) in rows {
            let data = tables.entry(table).or_default();
            for record in records {
                data.push(record);
            }
        }
        Self {
            tables: Mutex::new(tables),
            ..Self::default()
        }
    }

    /// Sample inventory, doctors and appointments for running without a database.
    pub fn demo() -> Self {
        let medicine = |id: i64, name: &str, ingredients: &str, pharmacy: &str, address: &str, available: bool| {
            Record::new()
                .with("id", id)
                .with("medicine_name", name)
                .with("ingredients", ingredients)
                .with("pharmacy_name", pharmacy)
                .with("address", address)
                .with("availability", available)
        };
        let doctor = |id: i64, name: &str, clinic: &str, contact: &str, specialization: &str| {
            Record::new()
                .with("id", id)
                .with("name", name)
                .with("clinic_location", clinic)
                .with("contact", contact)
                .with("specialization", specialization)
                .with("email", format!("{}@clinic.example", name.to_lowercase().replace(' ', ".")))
        };
        let appointment = |id: i64, patient: (i64, &str), doctor: (i64, &str), start: &str, end: &str, confirm: bool| {
            Record::new()
                .with("id", id)
                .with("patient_id", patient.0)
                .with("patient_name", patient.1)
                .with("doctor_id", doctor.0)
                .with("doctor_name", doctor.1)
                .with("start_time", start)
                .with("end_time", end)
                .with("confirm", confirm)
        };

        let haddad = (1, "Amal Haddad");
        let nasser = (2, "Omar Nasser");
        Self::seeded([
            (
                Table::Main,
                vec![
                    medicine(1, "Aspirin", "acetylsalicylic acid", "Central Pharmacy", "14 King Faisal St", true),
                    medicine(2, "Panadol", "paracetamol", "Central Pharmacy", "14 King Faisal St", true),
                    medicine(3, "Brufen", "ibuprofen", "Riverside Pharmacy", "3 River Rd", false),
                    medicine(4, "Amoxil", "amoxicillin", "Riverside Pharmacy", "3 River Rd", true),
                ],
            ),
            (
                Table::Doctor,
                vec![
                    doctor(haddad.0, haddad.1, "Central Clinic", "0790000001", "General practice"),
                    doctor(nasser.0, nasser.1, "North Clinic", "0790000002", "Pediatrics"),
                ],
            ),
            (
                Table::Appointment,
                vec![
                    appointment(1, (101, "Lina Saleh"), haddad, "2026-10-20T09:30", "2026-10-20T10:00", false),
                    appointment(2, (102, "Yousef Karim"), haddad, "2026-10-20T10:00", "2026-10-20T10:30", false),
                    appointment(3, (103, "Sara Odeh"), nasser, "2026-10-21T11:15", "2026-10-21T11:45", true),
                ],
            ),
        ])
    }

    /// Fail the next `select` with `reason`.
    pub async fn fail_next_select(&self, reason: impl Into<String>) {
        self.faults.lock().await.next_select = Some(reason.into());
    }

    /// Fail the next `insert` with `reason`.
    pub async fn fail_next_insert(&self, reason: impl Into<String>) {
        self.faults.lock().await.next_insert = Some(reason.into());
    }

    /// Fail every update/upsert that targets `id` in `table`.
    pub async fn fail_writes_for(&self, table: Table, id: RecordId, reason: impl Into<String>) {
        self.faults
            .lock()
            .await
            .writes
            .insert((table, id), reason.into());
    }

    /// Delay selects whose filters carry the text `needle`.
    pub async fn delay_select_matching(&self, needle: impl Into<String>, delay: Duration) {
        self.faults
            .lock()
            .await
            .select_delays
            .push((needle.into(), delay));
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn rows(&self, table: Table) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .get(&table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    async fn record_call(&self, kind: CallKind, table: Table) {
        self.calls.lock().await.push(Call { kind, table });
    }

    async fn write_fault(&self, table: Table, id: Option<RecordId>) -> Result<(), DataError> {
        let Some(id) = id else {
            return Ok(());
        };
        match self.faults.lock().await.writes.get(&(table, id)) {
            Some(reason) => Err(DataError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

fn ensure_writable(table: Table) -> Result<(), DataError> {
    if table.is_writable() {
        Ok(())
    } else {
        Err(DataError::ReadOnly(table))
    }
}

fn validate_fields(rows: &[Record]) -> Result<(), DataError> {
    rows.iter()
        .flat_map(Record::fields)
        .try_for_each(validate_field_name)
}

#[async_trait]
impl DataClient for MemoryDataClient {
    async fn select(&self, table: Table, selection: &Selection) -> Result<Vec<Record>, DataError> {
        self.record_call(CallKind::Select, table).await;

        let delay = {
            let needles: HashSet<String> =
                selection.filters.iter().map(|f| f.value.to_string()).collect();
            let faults = self.faults.lock().await;
            faults
                .select_delays
                .iter()
                .filter(|(needle, _)| needles.contains(needle))
                .map(|(_, d)| *d)
                .max()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.faults.lock().await.next_select.take() {
            return Err(DataError::Rejected(reason));
        }
        for filter in &selection.filters {
            validate_field_name(&filter.field)?;
        }

        let tables = self.tables.lock().await;
        Ok(tables
            .get(&table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|row| selection.matches(row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: Table, rows: &[Record]) -> Result<Vec<Record>, DataError> {
        self.record_call(CallKind::Insert, table).await;
        ensure_writable(table)?;
        validate_fields(rows)?;
        if let Some(reason) = self.faults.lock().await.next_insert.take() {
            return Err(DataError::Rejected(reason));
        }

        let mut tables = self.tables.lock().await;
        let data = tables.entry(table).or_default();
        // all or nothing, like a single INSERT statement
        let mut incoming = HashSet::new();
        for id in rows.iter().filter_map(Record::id) {
            if data.contains(id) || !incoming.insert(id) {
                return Err(DataError::duplicate_key(table, id));
            }
        }
        Ok(rows.iter().cloned().map(|row| data.push(row)).collect())
    }

    async fn update(&self, table: Table, patch: &Record, key: &RowKey) -> Result<(), DataError> {
        self.record_call(CallKind::Update, table).await;
        ensure_writable(table)?;
        validate_field_name(&key.field)?;
        validate_fields(std::slice::from_ref(patch))?;
        self.write_fault(table, key.value.as_i64().map(RecordId::new).filter(|_| key.field == ID_FIELD))
            .await?;

        let matching = super::Filter::eq(key.field.clone(), key.value.clone());
        let mut tables = self.tables.lock().await;
        if let Some(data) = tables.get_mut(&table) {
            for row in data.rows.iter_mut().filter(|row| matching.matches(row)) {
                row.merge(patch);
            }
        }
        Ok(())
    }

    async fn upsert(&self, table: Table, rows: &[Record], conflict_key: &str) -> Result<(), DataError> {
        self.record_call(CallKind::Upsert, table).await;
        ensure_writable(table)?;
        validate_field_name(conflict_key)?;
        validate_fields(rows)?;
        for row in rows {
            self.write_fault(table, row.id()).await?;
        }

        let mut tables = self.tables.lock().await;
        let data = tables.entry(table).or_default();
        for row in rows {
            let existing = row.get(conflict_key).and_then(|key| {
                let matching = super::Filter::eq(conflict_key, key.clone());
                data.rows.iter_mut().find(|r| matching.matches(r))
            });
            match existing {
                Some(current) => current.merge(row),
                None => {
                    data.push(row.clone());
                }
            }
        }
        Ok(())
    }
}
