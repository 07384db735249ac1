//! Concurrent hour-bucket retrieval
//!
//! A query over a `TimeRange` becomes one prefix scan per hour bucket. Scans
//! run on the blocking pool, at most `workers` at a time, and stream their
//! points back through a bounded channel. The first failed scan cancels the
//! rest and fails the whole query: a partial result would undercount.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument, Span};

use super::CounterStore;
use crate::counters::{CounterKeyEncoder, CounterKind, DataPoint};
use crate::error::{Result, StatsError};
use crate::time_range::TimeRange;

/// Hour buckets scanned concurrently per query
pub const DEFAULT_FAN_OUT_WORKERS: usize = 5;

/// Capacity of the channel carrying scanned points to the collector
pub const DEFAULT_RESULT_BUFFER: usize = 5;

/// Scatter/gather of prefix scans over the hours of a window
#[derive(Clone)]
pub struct FanOutExecutor {
    store: Arc<dyn CounterStore>,
    workers: usize,
    buffer: usize,
    span: Span,
}

impl FanOutExecutor {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        FanOutExecutor {
            store,
            workers: DEFAULT_FAN_OUT_WORKERS,
            buffer: DEFAULT_RESULT_BUFFER,
            span: tracing::info_span!("fan_out"),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Every stored point of `kind` in `channel_id` within `range`
    ///
    /// Points come back in no particular order.
    pub async fn get_data_points(
        &self,
        range: &TimeRange,
        kind: CounterKind,
        channel_id: &str,
    ) -> Result<Vec<DataPoint>> {
        let hours = range.by_hour();
        debug!(
            parent: &self.span,
            start = %range.start_hour(),
            end = %range.end_hour(),
            hours = hours.len(),
            %kind,
            channel_id,
            "get_data_points"
        );

        let cancel = CancellationToken::new();
        // Dropping this call cancels any scans still queued
        let _guard = cancel.clone().drop_guard();
        let (tx, mut rx) = mpsc::channel(self.buffer);

        let dispatcher = tokio::spawn(
            dispatch(
                Arc::clone(&self.store),
                hours,
                kind,
                channel_id.to_string(),
                self.workers,
                tx,
                cancel,
            )
            .instrument(self.span.clone()),
        );

        let mut results = Vec::new();
        while let Some(dp) = rx.recv().await {
            results.push(dp);
        }

        match dispatcher.await {
            Ok(Ok(())) => Ok(results),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(StatsError::QueryAborted(format!("dispatcher failed: {e}"))),
        }
    }
}

async fn dispatch(
    store: Arc<dyn CounterStore>,
    hours: Vec<String>,
    kind: CounterKind,
    channel_id: String,
    workers: usize,
    tx: mpsc::Sender<DataPoint>,
    cancel: CancellationToken,
) -> Result<()> {
    let permits = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();

    for hour in hours {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => {
                permit.map_err(|e| StatsError::QueryAborted(e.to_string()))?
            }
        };

        let store = Arc::clone(&store);
        let tx = tx.clone();
        let cancel = cancel.clone();
        let prefix = CounterKeyEncoder::prefix_for(&hour, kind, &channel_id);
        tasks.spawn(
            async move {
                let _permit = permit;
                let outcome = scan_bucket(store, prefix, &tx, &cancel).await;
                if let Err(e) = &outcome {
                    error!(%hour, error = %e, "hour bucket scan failed; aborting query");
                    cancel.cancel();
                }
                outcome
            }
            .in_current_span(),
        );
    }
    drop(tx);

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = joined
            .map_err(|e| StatsError::QueryAborted(format!("scan task failed: {e}")))
            .and_then(|scanned| scanned);
        if let Err(e) = outcome {
            if first_error.is_none() {
                cancel.cancel();
                tasks.abort_all();
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn scan_bucket(
    store: Arc<dyn CounterStore>,
    prefix: Vec<u8>,
    tx: &mpsc::Sender<DataPoint>,
    cancel: &CancellationToken,
) -> Result<()> {
    if cancel.is_cancelled() {
        return Ok(());
    }

    let points = tokio::task::spawn_blocking(move || store.scan_prefix(&prefix))
        .await
        .map_err(|e| StatsError::QueryAborted(format!("scan did not complete: {e}")))??;

    for dp in points {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            sent = tx.send(dp) => {
                if sent.is_err() {
                    // Collector is gone
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}
