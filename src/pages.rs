//! The screens of the pharmacy desk and the per-session state behind them.
//!
//! Each page is an independent workflow over one table; nothing is shared
//! between pages or sessions.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::data::{Combinator, DataClient, DataError, Record, Table, Value};
use crate::workflow::{
    BulkEditWorkflow, CommitMode, FieldSet, FieldSpec, FormState, FormWorkflow, MatchMode,
    OperationOutcome, SearchPredicate, SearchTicket, SearchWorkflow, ValidationError,
};

/* -------------------------
   main (medicine inventory)
--------------------------*/

/// Add-medicine form; the id is entered by staff, not generated.
pub const MEDICINE_FIELDS: FieldSet = FieldSet::new(&[
    FieldSpec::number("id").required(),
    FieldSpec::text("medicine_name").required(),
    FieldSpec::text("ingredients").required(),
    FieldSpec::text("pharmacy_name").required(),
    FieldSpec::text("address").required(),
    FieldSpec::boolean("availability"),
]);

pub const MEDICINE_BY_NAME_OR_INGREDIENT: SearchPredicate = SearchPredicate {
    fields: &["medicine_name", "ingredients"],
    mode: MatchMode::CaseInsensitiveSubstring,
    combinator: Combinator::Or,
};

pub const MEDICINE_BY_PHARMACY: SearchPredicate = SearchPredicate {
    fields: &["pharmacy_name"],
    mode: MatchMode::CaseInsensitiveSubstring,
    combinator: Combinator::And,
};

pub const AVAILABILITY_EDITABLE: &[FieldSpec] = &[FieldSpec::boolean("availability")];

/* -------------------------
   appointment / doctor
--------------------------*/

pub const APPOINTMENT_FIELDS: FieldSet = FieldSet::new(&[
    FieldSpec::number("patient_id").required(),
    FieldSpec::text("patient_name").required(),
    FieldSpec::number("doctor_id").required(),
    FieldSpec::text("doctor_name").required(),
    FieldSpec::text("start_time").required(),
    FieldSpec::text("end_time").required(),
]);

pub const APPOINTMENT_BY_DOCTOR: SearchPredicate = SearchPredicate {
    fields: &["doctor_id"],
    mode: MatchMode::Exact,
    combinator: Combinator::And,
};

/// Both must match the same appointment row.
pub const PATIENT_LOOKUP_FIELDS: FieldSet = FieldSet::new(&[
    FieldSpec::number("patient_id").required(),
    FieldSpec::text("patient_name").required(),
]);

pub const CONFIRM_EDITABLE: &[FieldSpec] = &[FieldSpec::boolean("confirm")];

/// Add-appointment form plus the doctor list it picks from.
#[derive(Debug, Clone)]
pub struct AddAppointmentPage {
    pub form: FormWorkflow,
    pub doctors: SearchWorkflow,
}

impl Default for AddAppointmentPage {
    fn default() -> Self {
        Self {
            form: FormWorkflow::new(Table::Appointment, APPOINTMENT_FIELDS),
            doctors: SearchWorkflow::new(Table::Doctor),
        }
    }
}

/// Patient-facing status check: look up by id and name, then phrase each
/// matching appointment as accepted or not.
#[derive(Debug, Clone)]
pub struct AppointmentStatusPage {
    lookup: FormState,
    search: SearchWorkflow,
    outcome: Option<OperationOutcome>,
}

impl Default for AppointmentStatusPage {
    fn default() -> Self {
        Self {
            lookup: FormState::new(PATIENT_LOOKUP_FIELDS),
            search: SearchWorkflow::new(Table::Appointment),
            outcome: None,
        }
    }
}

impl AppointmentStatusPage {
    pub fn lookup(&self) -> &FormState {
        &self.lookup
    }

    pub fn search(&self) -> &SearchWorkflow {
        &self.search
    }

    pub fn outcome(&self) -> Option<&OperationOutcome> {
        self.outcome.as_ref()
    }

    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), ValidationError> {
        let result = self.lookup.set_field(name, value);
        if let Err(err) = &result {
            self.outcome = Some(err.clone().into());
        }
        result
    }

    pub fn begin_check(&mut self) -> Result<SearchTicket, ValidationError> {
        let begun = self.search.begin_lookup(&self.lookup);
        if let Err(err) = &begun {
            self.outcome = Some(err.clone().into());
        }
        begun
    }

    pub fn complete_check(
        &mut self,
        ticket: SearchTicket,
        result: Result<Vec<Record>, DataError>,
    ) -> Option<OperationOutcome> {
        let outcome = self.search.complete(ticket, result)?;
        self.outcome = Some(outcome.clone());
        Some(outcome)
    }

    pub async fn check(&mut self, client: &dyn DataClient) -> OperationOutcome {
        let ticket = match self.begin_check() {
            Ok(ticket) => ticket,
            Err(err) => return err.into(),
        };
        let result = ticket.fetch(client).await;
        self.complete_check(ticket, result)
            .unwrap_or_else(|| OperationOutcome::failure("superseded by a newer search"))
    }

    /// One line per matching appointment, in result order.
    pub fn messages(&self) -> Vec<String> {
        self.search.results().iter().map(status_message).collect()
    }
}

pub fn status_message(appointment: &Record) -> String {
    let doctor = appointment
        .get("doctor_name")
        .map(Value::to_string)
        .unwrap_or_default();
    match appointment.get("confirm").and_then(Value::as_bool) {
        Some(true) => format!("Your appointment with Doctor {doctor} is accepted."),
        _ => format!("Your appointment with Doctor {doctor} is not yet accepted."),
    }
}

/// Directory entry rendered by `/home`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PageInfo {
    pub key: &'static str,
    pub title: &'static str,
    pub path: &'static str,
    pub table: Table,
}

pub const DIRECTORY: &[PageInfo] = &[
    PageInfo {
        key: "add_medicine",
        title: "Add medicine",
        path: "/api/v1/medicines/new",
        table: Table::Main,
    },
    PageInfo {
        key: "medicine_list",
        title: "Medicines",
        path: "/api/v1/medicines",
        table: Table::Main,
    },
    PageInfo {
        key: "medicine_search",
        title: "Search medicines",
        path: "/api/v1/medicines/search",
        table: Table::Main,
    },
    PageInfo {
        key: "availability",
        title: "Pharmacy availability",
        path: "/api/v1/pharmacy/availability",
        table: Table::Main,
    },
    PageInfo {
        key: "add_appointment",
        title: "Book appointment",
        path: "/api/v1/appointments/new",
        table: Table::Appointment,
    },
    PageInfo {
        key: "confirm_appointments",
        title: "Confirm appointments",
        path: "/api/v1/appointments/confirm",
        table: Table::Appointment,
    },
    PageInfo {
        key: "appointment_status",
        title: "Appointment status",
        path: "/api/v1/appointments/status",
        table: Table::Appointment,
    },
];

/// Page state owned by one session. Every page sits behind its own lock so
/// a slow action on one screen never blocks another.
#[derive(Debug, Clone)]
pub struct Pages {
    pub add_medicine: Arc<Mutex<FormWorkflow>>,
    pub medicine_list: Arc<Mutex<SearchWorkflow>>,
    pub medicine_search: Arc<Mutex<SearchWorkflow>>,
    pub availability: Arc<Mutex<BulkEditWorkflow>>,
    pub add_appointment: Arc<Mutex<AddAppointmentPage>>,
    pub confirm_appointments: Arc<Mutex<BulkEditWorkflow>>,
    pub appointment_status: Arc<Mutex<AppointmentStatusPage>>,
}

impl Default for Pages {
    fn default() -> Self {
        Self {
            add_medicine: Arc::new(Mutex::new(FormWorkflow::new(Table::Main, MEDICINE_FIELDS))),
            medicine_list: Arc::new(Mutex::new(SearchWorkflow::new(Table::Main))),
            medicine_search: Arc::new(Mutex::new(SearchWorkflow::new(Table::Main))),
            availability: Arc::new(Mutex::new(BulkEditWorkflow::new(
                Table::Main,
                AVAILABILITY_EDITABLE,
                CommitMode::Update,
            ))),
            add_appointment: Arc::new(Mutex::new(AddAppointmentPage::default())),
            // Confirmation only ever touches existing rows.
            confirm_appointments: Arc::new(Mutex::new(BulkEditWorkflow::new(
                Table::Appointment,
                CONFIRM_EDITABLE,
                CommitMode::Update,
            ))),
            appointment_status: Arc::new(Mutex::new(AppointmentStatusPage::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryDataClient, RecordId};

    #[tokio::test]
    async fn medicine_search_matches_name_or_ingredients() {
        let client = MemoryDataClient::demo();
        let mut search = SearchWorkflow::new(Table::Main);

        search
            .search(&client, "PARACETAMOL", MEDICINE_BY_NAME_OR_INGREDIENT)
            .await;
        let names: Vec<_> = search
            .results()
            .iter()
            .filter_map(|r| r.get("medicine_name").cloned())
            .collect();
        assert_eq!(names, vec![Value::text("Panadol")]);
    }

    #[test]
    fn medicine_form_takes_inventory_columns() {
        let mut page = FormWorkflow::new(Table::Main, MEDICINE_FIELDS);
        for field in ["id", "ingredients", "address"] {
            assert!(page.set_field(field, Value::text("1")).is_ok(), "{field}");
        }
        assert!(page.set_field("price", Value::text("1")).is_err());
    }

    #[tokio::test]
    async fn confirm_search_is_exact_on_doctor_id() {
        let client = MemoryDataClient::demo();
        let mut page = BulkEditWorkflow::new(Table::Appointment, CONFIRM_EDITABLE, CommitMode::Update);

        assert!(page.run_search(&client, "1", APPOINTMENT_BY_DOCTOR).await.is_success());
        let ids: Vec<_> = page.search().results().iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec![RecordId::new(1), RecordId::new(2)]);

        page.stage_change(RecordId::new(1), "confirm", Value::Bool(true)).unwrap();
        page.commit(&client).await;
        let rows = client.rows(Table::Appointment).await;
        assert_eq!(rows[0].get("confirm"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn booked_appointment_stores_form_columns_only() {
        let client = MemoryDataClient::new();
        let mut page = AddAppointmentPage::default();
        for (field, value) in [
            ("patient_id", "104"),
            ("patient_name", "Rami Aziz"),
            ("doctor_id", "1"),
            ("doctor_name", "Amal Haddad"),
            ("start_time", "2026-11-02T08:45"),
            ("end_time", "2026-11-02T09:15"),
        ] {
            page.form.set_field(field, Value::text(value)).unwrap();
        }

        assert!(page.form.submit(&client).await.is_success());
        let rows = client.rows(Table::Appointment).await;
        assert_eq!(rows[0].get("patient_id"), Some(&Value::Integer(104)));
        assert_eq!(rows[0].get("doctor_id"), Some(&Value::Integer(1)));
        assert!(!rows[0].contains("confirm"));
    }

    #[tokio::test]
    async fn status_check_needs_id_and_name() {
        let client = MemoryDataClient::demo();
        let mut page = AppointmentStatusPage::default();
        page.set_field("patient_name", Value::text("Lina Saleh")).unwrap();

        assert_eq!(page.check(&client).await, OperationOutcome::failure("missing required fields"));
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn status_check_matches_both_fields() {
        let client = MemoryDataClient::demo();
        let mut page = AppointmentStatusPage::default();
        page.set_field("patient_id", Value::text("102")).unwrap();
        page.set_field("patient_name", Value::text("Lina Saleh")).unwrap();
        assert_eq!(page.check(&client).await, OperationOutcome::Empty);

        page.set_field("patient_id", Value::text("101")).unwrap();
        assert!(page.check(&client).await.is_success());
        assert_eq!(
            page.messages(),
            vec!["Your appointment with Doctor Amal Haddad is not yet accepted.".to_string()]
        );
    }

    #[test]
    fn status_message_reflects_confirm_flag() {
        let row = Record::new().with("doctor_name", "Omar Nasser");
        assert_eq!(
            status_message(&row.clone().with("confirm", true)),
            "Your appointment with Doctor Omar Nasser is accepted."
        );
        assert_eq!(
            status_message(&row),
            "Your appointment with Doctor Omar Nasser is not yet accepted."
        );
    }

    #[test]
    fn directory_covers_every_page() {
        assert_eq!(DIRECTORY.len(), 7);
        assert!(DIRECTORY.iter().all(|p| p.path.starts_with("/api/v1/")));
    }
}
