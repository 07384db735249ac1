//! Per-user aggregation over retrieved counters

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, Span};

use super::{CounterStore, FanOutExecutor};
use crate::config::QueryConfig;
use crate::counters::{CounterKind, DataPoint, PercentageResp, SumResp};
use crate::error::{Result, StatsError};
use crate::time_range::TimeRange;

/// Counter every percentage is taken against
pub const BASELINE_KIND: CounterKind = CounterKind::Messages;

/// Group points by display user and sum their values
///
/// Sorted ascending by sum, then by user so equal sums come out in a fixed
/// order. A sum past `i64::MAX` fails the query instead of clamping.
pub fn sum_points(points: &[DataPoint]) -> Result<Vec<SumResp>> {
    let mut sums: BTreeMap<&str, i64> = BTreeMap::new();
    for dp in points {
        let user = dp.display_user();
        let entry = sums.entry(user).or_insert(0);
        *entry = entry.checked_add(dp.value).ok_or_else(|| {
            StatsError::QueryAborted(format!("sum overflow for user '{user}' in {}", dp.kind))
        })?;
    }

    let mut result: Vec<SumResp> = sums
        .into_iter()
        .map(|(user, sum)| SumResp {
            user: user.to_string(),
            sum,
        })
        .collect();
    result.sort_by(|a, b| a.sum.cmp(&b.sum).then_with(|| a.user.cmp(&b.user)));
    Ok(result)
}

/// Inner join of baseline totals with counter sums
///
/// Users without a counter sum are dropped. Sorted ascending by total, then
/// by user.
pub fn join_percentages(totals: &[SumResp], counts: &[SumResp]) -> Vec<PercentageResp> {
    let counts: HashMap<&str, i64> = counts.iter().map(|c| (c.user.as_str(), c.sum)).collect();

    let mut result: Vec<PercentageResp> = totals
        .iter()
        .filter(|t| t.sum > 0)
        .filter_map(|t| {
            counts.get(t.user.as_str()).map(|&count| PercentageResp {
                user: t.user.clone(),
                total: t.sum,
                count,
                percent: floor_percent(count, t.sum),
            })
        })
        .collect();
    result.sort_by(|a, b| a.total.cmp(&b.total).then_with(|| a.user.cmp(&b.user)));
    result
}

fn floor_percent(count: i64, total: i64) -> i64 {
    let percent = i128::from(count) * 100 / i128::from(total);
    i64::try_from(percent).unwrap_or(i64::MAX)
}

/// Sums and percentages over a fan-out executor
#[derive(Clone)]
pub struct Aggregator {
    executor: FanOutExecutor,
    span: Span,
}

impl Aggregator {
    pub fn new(executor: FanOutExecutor) -> Self {
        Aggregator {
            executor,
            span: tracing::info_span!("aggregator"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn executor(&self) -> &FanOutExecutor {
        &self.executor
    }

    pub async fn sum_by_user(
        &self,
        range: &TimeRange,
        kind: CounterKind,
        channel_id: &str,
    ) -> Result<Vec<SumResp>> {
        let points = self.executor.get_data_points(range, kind, channel_id).await?;
        let sums = sum_points(&points)?;
        debug!(parent: &self.span, %kind, channel_id, points = points.len(), users = sums.len(), "sum_by_user");
        Ok(sums)
    }

    pub async fn percentage_by_user(
        &self,
        range: &TimeRange,
        kind: CounterKind,
        channel_id: &str,
    ) -> Result<Vec<PercentageResp>> {
        let (totals, counts) = tokio::try_join!(
            self.sum_by_user(range, BASELINE_KIND, channel_id),
            self.sum_by_user(range, kind, channel_id),
        )?;
        let percentages = join_percentages(&totals, &counts);
        debug!(parent: &self.span, %kind, channel_id, users = percentages.len(), "percentage_by_user");
        Ok(percentages)
    }
}

/// Query result envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse<T> {
    #[serde(rename = "start-hour")]
    pub start_hour: String,
    #[serde(rename = "end-hour")]
    pub end_hour: String,
    pub items: Vec<T>,
}

impl<T> QueryResponse<T> {
    pub fn new(range: &TimeRange, items: Vec<T>) -> Self {
        QueryResponse {
            start_hour: range.start_hour(),
            end_hour: range.end_hour(),
            items,
        }
    }
}

/// Read side of the counter store
///
/// One executor and aggregator over a shared store. Worker count and buffer
/// size come from configuration only.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn CounterStore>,
    aggregator: Aggregator,
    lookback_hours: i64,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn CounterStore>, config: &QueryConfig) -> Self {
        let executor = FanOutExecutor::new(Arc::clone(&store))
            .with_workers(config.fan_out_workers)
            .with_buffer(config.result_buffer);
        QueryEngine {
            store,
            aggregator: Aggregator::new(executor),
            lookback_hours: config.default_lookback_hours,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Window for optional start/end hour labels, defaulting to the
    /// configured lookback ending now
    pub fn time_range(&self, start: Option<&str>, end: Option<&str>) -> Result<TimeRange> {
        TimeRange::parse_at(
            start.unwrap_or(""),
            end.unwrap_or(""),
            chrono::Utc::now(),
            self.lookback_hours,
        )
    }

    pub async fn data_points(
        &self,
        range: &TimeRange,
        kind: CounterKind,
        channel_id: &str,
    ) -> Result<QueryResponse<DataPoint>> {
        let mut points = self
            .aggregator
            .executor()
            .get_data_points(range, kind, channel_id)
            .await?;
        // Buckets finish in any order
        points.sort_by(|a, b| a.hour.cmp(&b.hour).then_with(|| a.user_id.cmp(&b.user_id)));
        Ok(QueryResponse::new(range, points))
    }

    pub async fn sum_by_user(
        &self,
        range: &TimeRange,
        kind: CounterKind,
        channel_id: &str,
    ) -> Result<QueryResponse<SumResp>> {
        let sums = self.aggregator.sum_by_user(range, kind, channel_id).await?;
        Ok(QueryResponse::new(range, sums))
    }

    pub async fn percentage_by_user(
        &self,
        range: &TimeRange,
        kind: CounterKind,
        channel_id: &str,
    ) -> Result<QueryResponse<PercentageResp>> {
        let percentages = self
            .aggregator
            .percentage_by_user(range, kind, channel_id)
            .await?;
        Ok(QueryResponse::new(range, percentages))
    }

    /// Every stored counter, in key order
    pub async fn all(&self) -> Result<Vec<DataPoint>> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.scan_all())
            .await
            .map_err(|e| StatsError::QueryAborted(format!("full scan did not complete: {e}")))?
    }
}
