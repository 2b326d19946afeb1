use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{DataClient, Record, RecordId, Table, Value};
use crate::pages::AppointmentStatusPage;
use crate::session::SessionStore;
use crate::workflow::form::FieldKind;
use crate::workflow::{
    BulkEditWorkflow, CommitMode, CommitState, FieldSpec, FormState, FormWorkflow,
    OperationOutcome, PendingChanges, SearchWorkflow,
};

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn DataClient>,
    pub sessions: SessionStore,
    pub session_ttl_hours: i64,
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

impl<T> ApiOk<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionOpened {
    pub access_token: String,
    pub session: SessionInfo,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OkData {
    pub ok: bool,
}

/// `onFieldChange` body.
#[derive(Debug, Deserialize)]
pub struct FieldValueRequest {
    pub value: Value,
}

/// `onSearch` body.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    pub query: String,
}

/// `onStageChange` body.
#[derive(Debug, Deserialize)]
pub struct StageChangeRequest {
    pub id: RecordId,
    pub field: String,
    pub value: Value,
}

/* -------------------------
   Page views
--------------------------*/

#[derive(Debug, Serialize)]
pub struct FieldView {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct FormView {
    pub table: Table,
    pub fields: Vec<FieldView>,
    pub outcome: Option<OperationOutcome>,
}

fn field_views(form: &FormState) -> Vec<FieldView> {
    form.entries()
        .map(|(spec, value)| FieldView {
            name: spec.name,
            kind: spec.kind,
            required: spec.required,
            value: value.clone(),
        })
        .collect()
}

impl From<&FormWorkflow> for FormView {
    fn from(page: &FormWorkflow) -> Self {
        Self {
            table: page.table(),
            fields: field_views(page.form()),
            outcome: page.outcome().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchView {
    pub table: Table,
    pub query: Option<String>,
    pub loading: bool,
    pub rows: Vec<Record>,
    pub outcome: Option<OperationOutcome>,
}

impl From<&SearchWorkflow> for SearchView {
    fn from(search: &SearchWorkflow) -> Self {
        Self {
            table: search.table(),
            query: search
                .last_request()
                .and_then(|r| r.query())
                .map(str::to_string),
            loading: search.is_loading(),
            rows: search.results().to_vec(),
            outcome: search.outcome().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkEditView {
    pub table: Table,
    pub query: Option<String>,
    pub loading: bool,
    pub editable: &'static [FieldSpec],
    pub mode: CommitMode,
    /// Result set with pending changes laid over it.
    pub rows: Vec<Record>,
    pub pending: PendingChanges,
    pub commit_state: CommitState,
    pub search_outcome: Option<OperationOutcome>,
    pub outcome: Option<OperationOutcome>,
}

impl From<&BulkEditWorkflow> for BulkEditView {
    fn from(page: &BulkEditWorkflow) -> Self {
        let search = SearchView::from(page.search());
        Self {
            table: search.table,
            query: search.query,
            loading: search.loading,
            editable: page.editable(),
            mode: page.mode(),
            rows: page.effective_rows(),
            pending: page.pending().clone(),
            commit_state: page.state(),
            search_outcome: search.outcome,
            outcome: page.outcome().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddAppointmentView {
    #[serde(flatten)]
    pub form: FormView,
    pub doctors: Vec<Record>,
}

/// Lookup fields plus one status line per matching appointment.
#[derive(Debug, Serialize)]
pub struct AppointmentStatusView {
    pub fields: Vec<FieldView>,
    pub loading: bool,
    pub rows: Vec<Record>,
    pub messages: Vec<String>,
    pub outcome: Option<OperationOutcome>,
}

impl From<&AppointmentStatusPage> for AppointmentStatusView {
    fn from(page: &AppointmentStatusPage) -> Self {
        Self {
            fields: field_views(page.lookup()),
            loading: page.search().is_loading(),
            rows: page.search().results().to_vec(),
            messages: page.messages(),
            outcome: page.outcome().cloned(),
        }
    }
}
