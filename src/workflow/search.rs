//! Query-driven result sets with last-request-wins semantics.
//!
//! A search is split into [`SearchWorkflow::begin`], which hands out a
//! [`SearchTicket`], and [`SearchWorkflow::complete`], which applies the
//! ticket's result only if no newer search was begun in the meantime. The
//! owner can therefore drop its lock while the select is in flight.

use serde::Serialize;

use crate::data::{DataClient, DataError, Filter, Record, Selection, Table};
use crate::workflow::{FormState, OperationOutcome, ValidationError, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    CaseInsensitiveSubstring,
}

pub use crate::data::Combinator;

/// Declarative description of which fields the query text is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchPredicate {
    pub fields: &'static [&'static str],
    pub mode: MatchMode,
    pub combinator: Combinator,
}

impl SearchPredicate {
    pub fn selection(&self, query: &str) -> Selection {
        let filters = self
            .fields
            .iter()
            .map(|field| match self.mode {
                MatchMode::Exact => Filter::eq(*field, query),
                MatchMode::CaseInsensitiveSubstring => Filter::contains(*field, query),
            })
            .collect();
        Selection {
            combinator: self.combinator,
            filters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchRequest {
    All,
    Matching {
        query: String,
        predicate: SearchPredicate,
    },
    /// Every field of `criteria` must equal its value.
    Lookup { criteria: Record },
}

impl SearchRequest {
    fn selection(&self) -> Selection {
        match self {
            SearchRequest::All => Selection::all(),
            SearchRequest::Matching { query, predicate } => predicate.selection(query),
            SearchRequest::Lookup { criteria } => Selection::all_of(
                criteria
                    .iter()
                    .map(|(field, value)| Filter::eq(field, value.clone()))
                    .collect(),
            ),
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            SearchRequest::Matching { query, .. } => Some(query),
            SearchRequest::All | SearchRequest::Lookup { .. } => None,
        }
    }
}

/// Handle for one in-flight search.
#[derive(Debug, Clone)]
#[must_use]
pub struct SearchTicket {
    generation: u64,
    table: Table,
    selection: Selection,
}

impl SearchTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn fetch(&self, client: &dyn DataClient) -> Result<Vec<Record>, DataError> {
        client.select(self.table, &self.selection).await
    }
}

#[derive(Debug, Clone)]
pub struct SearchWorkflow {
    table: Table,
    results: Vec<Record>,
    last_request: Option<SearchRequest>,
    issued: u64,
    settled: u64,
    outcome: Option<OperationOutcome>,
}

impl SearchWorkflow {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            results: Vec::new(),
            last_request: None,
            issued: 0,
            settled: 0,
            outcome: None,
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    /// The current result set.
    pub fn results(&self) -> &[Record] {
        &self.results
    }

    pub fn last_request(&self) -> Option<&SearchRequest> {
        self.last_request.as_ref()
    }

    pub fn outcome(&self) -> Option<&OperationOutcome> {
        self.outcome.as_ref()
    }

    /// A begun search has not settled yet.
    pub fn is_loading(&self) -> bool {
        self.settled < self.issued
    }

    /// Validate `query` and allocate a ticket. An empty query leaves the
    /// result set and any in-flight search untouched.
    pub fn begin(
        &mut self,
        query: &str,
        predicate: SearchPredicate,
    ) -> Result<SearchTicket, ValidationError> {
        let query = query.trim();
        if query.is_empty() {
            self.outcome = Some(ValidationError::EmptyQuery.into());
            return Err(ValidationError::EmptyQuery);
        }
        Ok(self.issue(SearchRequest::Matching {
            query: query.to_string(),
            predicate,
        }))
    }

    /// Ticket for an exact match on every field of `form`. All fields of the
    /// form must be filled in; otherwise nothing is issued.
    pub fn begin_lookup(&mut self, form: &FormState) -> Result<SearchTicket, ValidationError> {
        let criteria = form.validate().and_then(|()| form.to_record());
        match criteria {
            Ok(criteria) => Ok(self.issue(SearchRequest::Lookup { criteria })),
            Err(err) => {
                self.outcome = Some(err.clone().into());
                Err(err)
            }
        }
    }

    /// Ticket for an unfiltered select (list pages).
    pub fn begin_list(&mut self) -> SearchTicket {
        self.issue(SearchRequest::All)
    }

    /// Ticket re-issuing the last begun request, if any.
    pub fn begin_rerun(&mut self) -> Option<SearchTicket> {
        let request = self.last_request.clone()?;
        Some(self.issue(request))
    }

    fn issue(&mut self, request: SearchRequest) -> SearchTicket {
        self.issued += 1;
        let ticket = SearchTicket {
            generation: self.issued,
            table: self.table,
            selection: request.selection(),
        };
        self.last_request = Some(request);
        ticket
    }

    /// Apply a ticket's result. Returns `None` when a newer search has been
    /// begun since, in which case nothing changes.
    pub fn complete(
        &mut self,
        ticket: SearchTicket,
        result: Result<Vec<Record>, DataError>,
    ) -> Option<OperationOutcome> {
        if ticket.generation != self.issued {
            tracing::debug!(
                table = %self.table,
                stale = ticket.generation,
                latest = self.issued,
                "discarding superseded search result"
            );
            return None;
        }
        self.settled = ticket.generation;

        let outcome = match result {
            Ok(rows) if rows.is_empty() => {
                self.results = rows;
                OperationOutcome::Empty
            }
            Ok(rows) => {
                let message = format!("{} record(s) found", rows.len());
                self.results = rows;
                OperationOutcome::success(message)
            }
            Err(err) => {
                tracing::warn!(table = %self.table, error = %err, "search failed");
                WorkflowError::Query(err).into()
            }
        };
        self.outcome = Some(outcome.clone());
        Some(outcome)
    }

    pub async fn search(
        &mut self,
        client: &dyn DataClient,
        query: &str,
        predicate: SearchPredicate,
    ) -> OperationOutcome {
        match self.begin(query, predicate) {
            Ok(ticket) => self.run(client, ticket).await,
            Err(err) => err.into(),
        }
    }

    pub async fn list(&mut self, client: &dyn DataClient) -> OperationOutcome {
        let ticket = self.begin_list();
        self.run(client, ticket).await
    }

    pub async fn rerun(&mut self, client: &dyn DataClient) -> Option<OperationOutcome> {
        let ticket = self.begin_rerun()?;
        Some(self.run(client, ticket).await)
    }

    async fn run(&mut self, client: &dyn DataClient, ticket: SearchTicket) -> OperationOutcome {
        let result = ticket.fetch(client).await;
        // Holding `&mut self` across the fetch means nothing newer can begin.
        self.complete(ticket, result)
            .unwrap_or_else(|| OperationOutcome::failure("superseded by a newer search"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::data::{MemoryDataClient, RecordId, Value};
    use crate::workflow::{FieldSet, FieldSpec};
    use tokio::sync::Mutex;

    const BY_NAME: SearchPredicate = SearchPredicate {
        fields: &["medicine_name", "ingredients"],
        mode: MatchMode::CaseInsensitiveSubstring,
        combinator: Combinator::Or,
    };

    fn row(id: i64, name: &str) -> Record {
        Record::new().with("id", id).with("medicine_name", name)
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter().filter_map(Record::id).map(RecordId::get).collect()
    }

    #[tokio::test]
    async fn empty_query_fails_without_touching_results() {
        let client = MemoryDataClient::seeded([(Table::Main, vec![row(1, "Aspirin")])]);
        let mut search = SearchWorkflow::new(Table::Main);
        search.search(&client, "asp", BY_NAME).await;
        let before = search.results().to_vec();

        let outcome = search.search(&client, "   ", BY_NAME).await;

        assert_eq!(outcome, OperationOutcome::failure("empty query"));
        assert_eq!(search.results(), before.as_slice());
        assert_eq!(client.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn zero_rows_is_empty_outcome() {
        let client = MemoryDataClient::seeded([(Table::Main, vec![row(1, "Aspirin")])]);
        let mut search = SearchWorkflow::new(Table::Main);

        assert_eq!(search.search(&client, "zzz", BY_NAME).await, OperationOutcome::Empty);
        assert!(search.results().is_empty());
    }

    #[tokio::test]
    async fn backend_error_keeps_previous_results() {
        let client = MemoryDataClient::seeded([(Table::Main, vec![row(1, "Aspirin")])]);
        let mut search = SearchWorkflow::new(Table::Main);
        search.search(&client, "asp", BY_NAME).await;

        client.fail_next_select("connection reset").await;
        let outcome = search.search(&client, "ibu", BY_NAME).await;

        assert_eq!(outcome, OperationOutcome::failure("connection reset"));
        assert_eq!(ids(search.results()), vec![1]);
        assert!(!search.is_loading());
    }

    #[test]
    fn later_search_wins_when_earlier_arrives_last() {
        let mut search = SearchWorkflow::new(Table::Main);
        let aspirin = search.begin("aspirin", BY_NAME).unwrap();
        let ibuprofen = search.begin("ibuprofen", BY_NAME).unwrap();
        assert!(search.is_loading());

        assert!(search.complete(ibuprofen, Ok(vec![row(3, "Brufen")])).is_some());
        assert!(search.complete(aspirin, Ok(vec![row(1, "Aspirin"), row(2, "Aspro")])).is_none());

        assert_eq!(ids(search.results()), vec![3]);
        assert!(!search.is_loading());
    }

    #[test]
    fn later_search_wins_when_earlier_arrives_first() {
        let mut search = SearchWorkflow::new(Table::Main);
        let aspirin = search.begin("aspirin", BY_NAME).unwrap();
        let ibuprofen = search.begin("ibuprofen", BY_NAME).unwrap();

        assert!(search.complete(aspirin, Ok(vec![row(1, "Aspirin"), row(2, "Aspro")])).is_none());
        assert!(search.is_loading());
        search.complete(ibuprofen, Ok(vec![row(3, "Brufen")]));

        assert_eq!(ids(search.results()), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_searches_settle_on_latest_query() {
        let client = Arc::new(MemoryDataClient::seeded([(
            Table::Main,
            vec![row(1, "Aspirin"), row(2, "Aspirin Forte"), row(3, "Ibuprofen")],
        )]));
        client.delay_select_matching("aspirin", Duration::from_millis(200)).await;
        let search = Arc::new(Mutex::new(SearchWorkflow::new(Table::Main)));

        let run = |query: &'static str| {
            let client = Arc::clone(&client);
            let search = Arc::clone(&search);
            async move {
                let ticket = search.lock().await.begin(query, BY_NAME).unwrap();
                let result = ticket.fetch(client.as_ref()).await;
                search.lock().await.complete(ticket, result)
            }
        };

        let slow = tokio::spawn(run("aspirin"));
        tokio::task::yield_now().await;
        let fast = tokio::spawn(run("ibuprofen"));

        assert!(fast.await.unwrap().is_some());
        assert!(slow.await.unwrap().is_none());
        assert_eq!(ids(search.lock().await.results()), vec![3]);
    }

    const LOOKUP: FieldSet = FieldSet::new(&[
        FieldSpec::number("patient_id").required(),
        FieldSpec::text("patient_name").required(),
    ]);

    fn appointment(id: i64, patient_id: i64, patient: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("patient_id", patient_id)
            .with("patient_name", patient)
    }

    #[tokio::test]
    async fn lookup_requires_every_field() {
        let client = MemoryDataClient::seeded([(Table::Appointment, vec![appointment(1, 7, "Lina")])]);
        let mut search = SearchWorkflow::new(Table::Appointment);
        let mut form = FormState::new(LOOKUP);
        form.set_field("patient_name", Value::text("Lina")).unwrap();

        assert_eq!(search.begin_lookup(&form).unwrap_err(), ValidationError::MissingRequired);
        assert_eq!(search.outcome(), Some(&OperationOutcome::failure("missing required fields")));
        assert!(!search.is_loading());
        assert!(client.calls().await.is_empty());
    }

    #[tokio::test]
    async fn lookup_ands_all_fields() {
        let client = MemoryDataClient::seeded([(
            Table::Appointment,
            vec![appointment(1, 7, "Lina"), appointment(2, 8, "Lina"), appointment(3, 7, "Omar")],
        )]);
        let mut search = SearchWorkflow::new(Table::Appointment);
        let mut form = FormState::new(LOOKUP);
        form.set_field("patient_id", Value::text("7")).unwrap();
        form.set_field("patient_name", Value::text("Lina")).unwrap();

        let ticket = search.begin_lookup(&form).unwrap();
        let result = ticket.fetch(&client).await;
        search.complete(ticket, result);

        assert_eq!(ids(search.results()), vec![1]);
        assert_eq!(search.last_request().and_then(SearchRequest::query), None);
    }

    #[tokio::test]
    async fn list_selects_everything() {
        let client = MemoryDataClient::seeded([(Table::Main, vec![row(1, "a"), row(2, "b")])]);
        let mut search = SearchWorkflow::new(Table::Main);

        assert!(search.list(&client).await.is_success());
        assert_eq!(ids(search.results()), vec![1, 2]);
        assert_eq!(search.last_request(), Some(&SearchRequest::All));
    }

    #[tokio::test]
    async fn rerun_repeats_last_query() {
        let client = MemoryDataClient::seeded([(Table::Main, vec![row(1, "Aspirin")])]);
        let mut search = SearchWorkflow::new(Table::Main);
        assert!(search.rerun(&client).await.is_none());

        search.search(&client, "asp", BY_NAME).await;
        client
            .insert(Table::Main, &[Record::new().with("medicine_name", "Aspro")])
            .await
            .unwrap();
        search.rerun(&client).await;

        assert_eq!(ids(search.results()), vec![1, 2]);
    }
}
