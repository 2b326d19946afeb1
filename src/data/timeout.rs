use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{DataClient, DataError, Record, RowKey, Selection, Table};

/// Bounds every call of the wrapped client; an elapsed call becomes
/// [`DataError::Timeout`].
pub struct TimeoutClient<C> {
    inner: C,
    limit: Duration,
}

impl<C> TimeoutClient<C> {
    pub fn new(inner: C, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, DataError>>,
    ) -> Result<T, DataError> {
        tokio::time::timeout(self.limit, call)
            .await
            .unwrap_or(Err(DataError::Timeout))
    }
}

#[async_trait]
impl<C: DataClient> DataClient for TimeoutClient<C> {
    async fn select(&self, table: Table, selection: &Selection) -> Result<Vec<Record>, DataError> {
        self.bounded(self.inner.select(table, selection)).await
    }

    async fn insert(&self, table: Table, rows: &[Record]) -> Result<Vec<Record>, DataError> {
        self.bounded(self.inner.insert(table, rows)).await
    }

    async fn update(&self, table: Table, patch: &Record, key: &RowKey) -> Result<(), DataError> {
        self.bounded(self.inner.update(table, patch, key)).await
    }

    async fn upsert(&self, table: Table, rows: &[Record], conflict_key: &str) -> Result<(), DataError> {
        self.bounded(self.inner.upsert(table, rows, conflict_key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Filter, MemoryDataClient};

    #[tokio::test(start_paused = true)]
    async fn slow_select_times_out() {
        let memory = MemoryDataClient::new();
        memory
            .delay_select_matching("aspirin", Duration::from_secs(30))
            .await;
        let client = TimeoutClient::new(memory, Duration::from_secs(5));

        let err = client
            .select(Table::Main, &Selection::all_of(vec![Filter::contains("medicine_name", "aspirin")]))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Timeout));
        assert_eq!(err.to_string(), "timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn fast_calls_pass_through() {
        let client = TimeoutClient::new(MemoryDataClient::demo(), Duration::from_millis(50));
        let rows = client.select(Table::Doctor, &Selection::all()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }
}
