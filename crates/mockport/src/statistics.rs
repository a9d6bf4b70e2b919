//! Request statistics.
//!
//! Mock servers emit one [`RequestRecord`] per handled request through a
//! [`StatisticsSender`]. A single [`StatisticsCollector`] task drains the
//! channel and increments the counters in the [`StatisticsStore`]; the
//! management API reads and resets them under the store's read/write lock.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Buffered records between request handlers and the collector
pub const STATISTICS_CHANNEL_CAPACITY: usize = 1024;

/// One handled (or unmatched) request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestRecord {
    #[serde(rename = "server")]
    pub server_name: String,
    /// Request target as received, including the query string
    pub url: String,
    pub method: String,
    pub status_code: u16,
}

impl RequestRecord {
    pub fn new(
        server_name: impl Into<String>,
        url: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            url: url.into(),
            method: method.into(),
            status_code,
        }
    }
}

impl fmt::Display for RequestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server: {}; url: {}; method: {}; response status: {}",
            self.server_name, self.url, self.method, self.status_code
        )
    }
}

/// Selects records by server, url and method. `None` matches anything;
/// set fields must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsFilter {
    pub server_name: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
}

impl StatisticsFilter {
    /// Filter matching every record
    pub fn any() -> Self {
        Self::default()
    }

    pub fn server(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Methods are compared upper-case
    pub fn method(mut self, method: impl AsRef<str>) -> Self {
        self.method = Some(method.as_ref().to_ascii_uppercase());
        self
    }

    pub fn matches(&self, record: &RequestRecord) -> bool {
        fn field_matches(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }

        field_matches(&self.server_name, &record.server_name)
            && field_matches(&self.url, &record.url)
            && field_matches(&self.method, &record.method)
    }
}

/// One aggregated row returned by [`StatisticsStore::query`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsEntry {
    pub server: String,
    pub url: String,
    pub method: String,
    pub count: u64,
}

/// Request counters keyed by [`RequestRecord`]
#[derive(Debug, Default)]
pub struct StatisticsStore {
    counters: RwLock<HashMap<RequestRecord, u64>>,
}

impl StatisticsStore {
    /// Create a store with its ingestion channel.
    ///
    /// The collector must be run (see [`StatisticsCollector::run`]) for
    /// sent records to become visible.
    pub fn new() -> (Arc<Self>, StatisticsSender, StatisticsCollector) {
        let store = Arc::new(Self::default());
        let (tx, rx) = mpsc::channel(STATISTICS_CHANNEL_CAPACITY);
        let collector = StatisticsCollector {
            rx,
            store: Arc::clone(&store),
        };
        (store, StatisticsSender { tx }, collector)
    }

    fn increment(&self, record: RequestRecord) {
        *self.counters.write().entry(record).or_insert(0) += 1;
    }

    /// Snapshot of the counters matching `filter`, in no particular order
    pub fn query(&self, filter: &StatisticsFilter) -> Vec<StatisticsEntry> {
        self.counters
            .read()
            .iter()
            .filter(|(record, _)| filter.matches(record))
            .map(|(record, count)| StatisticsEntry {
                server: record.server_name.clone(),
                url: record.url.clone(),
                method: record.method.clone(),
                count: *count,
            })
            .collect()
    }

    /// Remove every counter matching `filter`; returns how many were removed
    pub fn delete(&self, filter: &StatisticsFilter) -> usize {
        let mut counters = self.counters.write();
        let before = counters.len();
        counters.retain(|record, _| !filter.matches(record));
        before - counters.len()
    }

    /// Count for one exact record
    pub fn count(&self, record: &RequestRecord) -> u64 {
        self.counters.read().get(record).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.read().is_empty()
    }
}

/// Producer side of the ingestion channel, cloned into every mock server
#[derive(Debug, Clone)]
pub struct StatisticsSender {
    tx: mpsc::Sender<RequestRecord>,
}

impl StatisticsSender {
    /// Queue a record; waits while the buffer is full
    pub async fn send(&self, record: RequestRecord) {
        if let Err(e) = self.tx.send(record).await {
            debug!("Statistics collector stopped, dropping record: {}", e.0);
        }
    }
}

/// The single consumer that applies queued records to the store
#[derive(Debug)]
pub struct StatisticsCollector {
    rx: mpsc::Receiver<RequestRecord>,
    store: Arc<StatisticsStore>,
}

impl StatisticsCollector {
    /// Apply records until `stop` fires (or its sender is dropped), then
    /// close the channel and drain what is still buffered. Returns the
    /// number of records applied.
    pub async fn run(mut self, mut stop: oneshot::Receiver<()>) -> u64 {
        info!("Statistics collector started");
        let mut applied = 0u64;

        loop {
            tokio::select! {
                record = self.rx.recv() => match record {
                    Some(record) => {
                        self.store.increment(record);
                        applied += 1;
                    }
                    None => break,
                },
                _ = &mut stop => {
                    self.rx.close();
                    while let Some(record) = self.rx.recv().await {
                        self.store.increment(record);
                        applied += 1;
                    }
                    break;
                }
            }
        }

        info!("Statistics collector stopped after {} record(s)", applied);
        applied
    }
}
