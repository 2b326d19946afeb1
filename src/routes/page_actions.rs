// src/routes/page_actions.rs
//
// Event plumbing shared by the page routes. Searches and commits run on their
// own task so a dropped request cannot strand a page mid-action: a search
// releases the page lock while the select is in flight so a newer search can
// begin, a commit keeps it for the whole write sequence.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    data::{DataClient, DataError, Record},
    error::ApiError,
    models::{BulkEditView, SearchView, StageChangeRequest},
    pages::{AddAppointmentPage, AppointmentStatusPage},
    workflow::{BulkEditWorkflow, SearchPredicate, SearchTicket, SearchWorkflow},
};

/// Page state that owns a last-request-wins search.
pub trait SearchPage: Send + 'static {
    fn settle(&mut self, ticket: SearchTicket, result: Result<Vec<Record>, DataError>);
}

impl SearchPage for SearchWorkflow {
    fn settle(&mut self, ticket: SearchTicket, result: Result<Vec<Record>, DataError>) {
        self.complete(ticket, result);
    }
}

impl SearchPage for BulkEditWorkflow {
    fn settle(&mut self, ticket: SearchTicket, result: Result<Vec<Record>, DataError>) {
        self.complete_search(ticket, result);
    }
}

impl SearchPage for AddAppointmentPage {
    fn settle(&mut self, ticket: SearchTicket, result: Result<Vec<Record>, DataError>) {
        self.doctors.complete(ticket, result);
    }
}

impl SearchPage for AppointmentStatusPage {
    fn settle(&mut self, ticket: SearchTicket, result: Result<Vec<Record>, DataError>) {
        self.complete_check(ticket, result);
    }
}

/// Begin a search on `page`, fetch, settle, then render. Runs detached from
/// the caller; `begin` returning `None` skips the fetch.
pub async fn run_search<P, V>(
    page: Arc<Mutex<P>>,
    client: Arc<dyn DataClient>,
    begin: impl FnOnce(&mut P) -> Option<SearchTicket> + Send + 'static,
    render: impl FnOnce(&P) -> V + Send + 'static,
) -> Result<V, ApiError>
where
    P: SearchPage,
    V: Send + 'static,
{
    let task = tokio::spawn(async move {
        let begun = begin(&mut *page.lock().await);
        if let Some(ticket) = begun {
            let result = ticket.fetch(client.as_ref()).await;
            page.lock().await.settle(ticket, result);
        }
        let page = page.lock().await;
        render(&*page)
    });

    task.await
        .map_err(|e| ApiError::Internal(format!("search task failed: {e}")))
}

pub async fn search(
    page: Arc<Mutex<SearchWorkflow>>,
    client: Arc<dyn DataClient>,
    query: String,
    predicate: SearchPredicate,
) -> Result<SearchView, ApiError> {
    run_search(
        page,
        client,
        move |p| p.begin(&query, predicate).ok(),
        |p| SearchView::from(p),
    )
    .await
}

pub async fn list(
    page: Arc<Mutex<SearchWorkflow>>,
    client: Arc<dyn DataClient>,
) -> Result<SearchView, ApiError> {
    run_search(page, client, |p| Some(p.begin_list()), |p| SearchView::from(p)).await
}

pub async fn bulk_search(
    page: Arc<Mutex<BulkEditWorkflow>>,
    client: Arc<dyn DataClient>,
    query: String,
    predicate: SearchPredicate,
) -> Result<BulkEditView, ApiError> {
    run_search(
        page,
        client,
        move |p| p.begin_search(&query, predicate).ok(),
        |p| BulkEditView::from(p),
    )
    .await
}

pub async fn stage(page: &Mutex<BulkEditWorkflow>, req: StageChangeRequest) -> BulkEditView {
    let mut page = page.lock().await;
    if let Err(err) = page.stage_change(req.id, &req.field, req.value) {
        tracing::debug!(id = %req.id, field = %req.field, error = %err, "change rejected");
    }
    BulkEditView::from(&*page)
}

pub async fn discard(page: &Mutex<BulkEditWorkflow>) -> BulkEditView {
    let mut page = page.lock().await;
    page.discard();
    BulkEditView::from(&*page)
}

pub async fn acknowledge(page: &Mutex<BulkEditWorkflow>) -> BulkEditView {
    let mut page = page.lock().await;
    page.acknowledge();
    BulkEditView::from(&*page)
}

pub async fn commit(
    page: Arc<Mutex<BulkEditWorkflow>>,
    client: Arc<dyn DataClient>,
) -> Result<BulkEditView, ApiError> {
    let task = tokio::spawn(async move {
        let mut page = page.lock_owned().await;
        page.commit(client.as_ref()).await;
        BulkEditView::from(&*page)
    });

    task.await
        .map_err(|e| ApiError::Internal(format!("commit task failed: {e}")))
}
