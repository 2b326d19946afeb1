//! Pending-change overlay on top of a search result set.
//!
//! Edits are staged per record and field, rendered through
//! [`BulkEditWorkflow::effective_value`], and written back by
//! [`BulkEditWorkflow::commit`] one row at a time in ascending id order.
//! The backend has no multi-row transaction: a commit that fails partway
//! leaves earlier rows written and later rows pending.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::{DataClient, DataError, ID_FIELD, Record, RecordId, RowKey, Table, Value};
use crate::workflow::form::{FieldKind, FieldSpec};
use crate::workflow::search::{SearchPredicate, SearchTicket, SearchWorkflow};
use crate::workflow::{OperationOutcome, ValidationError, WorkflowError};

/// Record id -> fields modified since the last fetch or commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PendingChanges(BTreeMap<RecordId, Record>);

impl PendingChanges {
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.0.get(&id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.0.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &Record)> {
        self.0.iter().map(|(id, patch)| (*id, patch))
    }

    fn stage(&mut self, id: RecordId, field: &str, value: Value) {
        self.0.entry(id).or_default().insert(field, value);
    }

    fn remove(&mut self, id: RecordId) {
        self.0.remove(&id);
    }

    fn retain_ids(&mut self, keep: impl Fn(RecordId) -> bool) {
        self.0.retain(|id, _| keep(*id));
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// How staged changes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// `update(table, patch, id = <id>)`; unmatched ids write nothing.
    Update,
    /// `upsert(table, [patch + id], "id")`; unmatched ids insert a row.
    Upsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CommitState {
    Idle,
    Committing,
    Committed,
    PartiallyFailed { applied: usize, total: usize },
}

#[derive(Debug, Clone)]
pub struct BulkEditWorkflow {
    search: SearchWorkflow,
    editable: &'static [FieldSpec],
    mode: CommitMode,
    pending: PendingChanges,
    state: CommitState,
    outcome: Option<OperationOutcome>,
}

impl BulkEditWorkflow {
    pub fn new(table: Table, editable: &'static [FieldSpec], mode: CommitMode) -> Self {
        Self {
            search: SearchWorkflow::new(table),
            editable,
            mode,
            pending: PendingChanges::default(),
            state: CommitState::Idle,
            outcome: None,
        }
    }

    pub fn search(&self) -> &SearchWorkflow {
        &self.search
    }

    pub fn pending(&self) -> &PendingChanges {
        &self.pending
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    pub fn mode(&self) -> CommitMode {
        self.mode
    }

    pub fn editable(&self) -> &'static [FieldSpec] {
        self.editable
    }

    /// Outcome of the last stage/commit action.
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        self.outcome.as_ref()
    }

    /* -------------------------
       Search pass-through
    --------------------------*/

    pub fn begin_search(
        &mut self,
        query: &str,
        predicate: SearchPredicate,
    ) -> Result<SearchTicket, ValidationError> {
        self.search.begin(query, predicate)
    }

    /// Apply a search result, then drop pending entries whose record is no
    /// longer in the result set.
    pub fn complete_search(
        &mut self,
        ticket: SearchTicket,
        result: Result<Vec<Record>, DataError>,
    ) -> Option<OperationOutcome> {
        let outcome = self.search.complete(ticket, result)?;
        self.prune_pending();
        Some(outcome)
    }

    pub async fn run_search(
        &mut self,
        client: &dyn DataClient,
        query: &str,
        predicate: SearchPredicate,
    ) -> OperationOutcome {
        let outcome = self.search.search(client, query, predicate).await;
        self.prune_pending();
        outcome
    }

    fn prune_pending(&mut self) {
        let search = &self.search;
        self.pending
            .retain_ids(|id| search.results().iter().any(|row| row.id() == Some(id)));
    }

    fn row(&self, id: RecordId) -> Option<&Record> {
        self.search.results().iter().find(|row| row.id() == Some(id))
    }

    /* -------------------------
       Overlay
    --------------------------*/

    pub fn stage_change(
        &mut self,
        id: RecordId,
        field: &str,
        value: Value,
    ) -> Result<(), ValidationError> {
        let result = self.try_stage(id, field, value);
        self.outcome = match &result {
            Ok(()) => None,
            Err(err) => Some(err.clone().into()),
        };
        result
    }

    fn try_stage(&mut self, id: RecordId, field: &str, value: Value) -> Result<(), ValidationError> {
        if self.row(id).is_none() {
            return Err(ValidationError::UnknownRecord);
        }
        let spec = self
            .editable
            .iter()
            .find(|spec| spec.name == field)
            .ok_or_else(|| ValidationError::NotEditable(field.to_string()))?;
        // staged values go straight to the backend, so numbers must be numbers
        let accepted = match spec.kind {
            FieldKind::Number => value.is_number(),
            kind => kind.accepts(&value),
        };
        if !accepted {
            return Err(ValidationError::TypeMismatch {
                field: field.to_string(),
                expected: spec.kind,
            });
        }
        self.pending.stage(id, field, value);
        Ok(())
    }

    /// Pending value if staged, else the value from the result set.
    pub fn effective_value(&self, id: RecordId, field: &str) -> Option<&Value> {
        self.pending
            .get(id)
            .and_then(|patch| patch.get(field))
            .or_else(|| self.row(id).and_then(|row| row.get(field)))
    }

    /// Result set rows with pending changes laid over them.
    pub fn effective_rows(&self) -> Vec<Record> {
        self.search
            .results()
            .iter()
            .map(|row| {
                let mut merged = row.clone();
                if let Some(patch) = row.id().and_then(|id| self.pending.get(id)) {
                    merged.merge(patch);
                }
                merged
            })
            .collect()
    }

    pub fn discard(&mut self) {
        self.pending.clear();
        self.outcome = None;
    }

    /* -------------------------
       Commit state machine
    --------------------------*/

    /// Return a terminal commit state to `Idle`.
    pub fn acknowledge(&mut self) {
        if matches!(
            self.state,
            CommitState::Committed | CommitState::PartiallyFailed { .. }
        ) {
            self.state = CommitState::Idle;
        }
    }

    /// Write every pending entry, strictly one after another in ascending id
    /// order, stopping at the first failure. Applied entries leave
    /// `pending` as they succeed; nothing is rolled back.
    pub async fn commit(&mut self, client: &dyn DataClient) -> OperationOutcome {
        let outcome = match self.try_commit(client).await {
            Ok(total) => {
                tracing::info!(table = %self.search.table(), total, "changes committed");
                if let Some(refresh) = self.search.rerun(client).await {
                    if refresh.is_failure() {
                        tracing::warn!(table = %self.search.table(), "refresh after commit failed");
                    }
                }
                self.prune_pending();
                OperationOutcome::success(format!("{total} change(s) saved"))
            }
            Err(err) => err.into(),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }

    async fn try_commit(&mut self, client: &dyn DataClient) -> Result<usize, WorkflowError> {
        if self.state != CommitState::Idle {
            return Err(ValidationError::CommitNotAcknowledged.into());
        }
        if self.pending.is_empty() {
            return Err(ValidationError::NothingToCommit.into());
        }

        self.state = CommitState::Committing;
        let table = self.search.table();
        let batch: Vec<(RecordId, Record)> = self
            .pending
            .iter()
            .map(|(id, patch)| (id, patch.clone()))
            .collect();
        let total = batch.len();

        for (applied, (id, patch)) in batch.into_iter().enumerate() {
            if let Err(source) = self.write(client, table, id, patch).await {
                tracing::warn!(%table, %id, applied, total, error = %source, "commit stopped");
                self.state = CommitState::PartiallyFailed { applied, total };
                return Err(WorkflowError::PartialCommit {
                    applied,
                    total,
                    source,
                });
            }
            self.pending.remove(id);
        }

        self.state = CommitState::Committed;
        Ok(total)
    }

    async fn write(
        &self,
        client: &dyn DataClient,
        table: Table,
        id: RecordId,
        patch: Record,
    ) -> Result<(), DataError> {
        match self.mode {
            CommitMode::Update => client.update(table, &patch, &RowKey::id(id)).await,
            CommitMode::Upsert => {
                let row = patch.with(ID_FIELD, id.get());
                client.upsert(table, &[row], ID_FIELD).await
            }
        }
    }
}
