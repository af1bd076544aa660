//! Query Engine - the `plan_and_execute` entry point
//!
//! Owns the two stores and the configuration values the planner needs. Each
//! request runs as a sequential pipeline on the calling thread:
//!
//! 1. Validate range and grouping (no store access on failure)
//! 2. Widen the range by one sample per side for graphical clients
//! 3. Consult the aggregation switch once
//! 4. Choose a rollup level and resolve its boundary
//! 5. Build the [`QueryPlan`] and hand it to the executor
//!
//! The engine keeps no per-request state, so concurrent requests need no
//! coordination beyond what the stores provide.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::aggregation::{AggregationLevel, RollupAggregator};
use crate::config::Config;
use crate::engine::traits::{AggregationSwitch, RollupStore, RollupWriter, SampleStore};
use crate::error::Result;
use crate::metrics;
use crate::query::executor::QueryExecutor;
use crate::query::planner::{choose_level, effective_tuple_count, QueryPlan, QueryRequest};
use crate::query::result::QueryOutput;
use crate::types::{AggregationBoundary, ChannelId, ClientHint, QueryRange};

/// Rollup-aware query engine over a sample store and a rollup store
pub struct QueryEngine<S, R> {
    /// Raw sample store
    samples: S,

    /// Rollup store
    rollups: R,

    /// Global rollup feature flag
    switch: Arc<dyn AggregationSwitch>,

    /// Level used when no level has rollup rows
    default_level: AggregationLevel,

    /// Upper bound for requested tuple counts
    max_tuple_count: Option<u64>,

    /// Whether Prometheus collectors are updated
    metrics_enabled: bool,
}

impl<S, R> QueryEngine<S, R>
where
    S: SampleStore,
    R: RollupStore,
{
    /// Create an engine from the stores and a configuration
    ///
    /// The aggregation flag is copied from the configuration; use
    /// [`QueryEngine::with_switch`] to share a flag that can change at runtime.
    pub fn new(samples: S, rollups: R, config: &Config) -> Result<Self> {
        Ok(Self {
            samples,
            rollups,
            switch: Arc::new(AtomicBool::new(config.aggregation.enabled)),
            default_level: config.aggregation.default_level()?,
            max_tuple_count: config.query.max_tuple_count.filter(|max| *max > 0),
            metrics_enabled: config.monitoring.metrics_enabled,
        })
    }

    /// Replace the aggregation switch
    pub fn with_switch(mut self, switch: Arc<dyn AggregationSwitch>) -> Self {
        self.switch = switch;
        self
    }

    /// Raw sample store
    pub fn samples(&self) -> &S {
        &self.samples
    }

    /// Rollup store
    pub fn rollups(&self) -> &R {
        &self.rollups
    }

    /// Plan a request without executing it
    pub fn plan(&self, request: &QueryRequest) -> Result<QueryPlan> {
        let (range, group_by) = request.validate()?;
        let tuple_count = effective_tuple_count(request.tuple_count, self.max_tuple_count);
        let range = self.widen(request.channel, range, request.client)?;

        let eligible =
            request.client != ClientHint::ForceSlow && self.switch.is_aggregation_enabled();
        let rollup = if eligible && (group_by.is_some() || tuple_count.is_some()) {
            self.resolve_rollup(request.channel, &range, group_by, tuple_count)?
        } else {
            None
        };

        let plan = QueryPlan::build(
            request.channel,
            range,
            group_by,
            tuple_count,
            request.reducer,
            rollup,
        );
        debug!(
            channel = plan.channel,
            strategy = %plan.strategy,
            rollup_level = ?plan.rollup_level,
            rollup_from = ?plan.boundary.rollup_from,
            rollup_to = ?plan.boundary.rollup_to,
            tiers = plan.tiers.len(),
            "planned query"
        );
        Ok(plan)
    }

    /// Execute a plan
    pub fn execute(&self, plan: &QueryPlan) -> Result<QueryOutput<'_>> {
        QueryExecutor::new(&self.samples, &self.rollups).execute(plan)
    }

    /// Plan and execute a request
    pub fn plan_and_execute(&self, request: &QueryRequest) -> Result<QueryOutput<'_>> {
        let start = Instant::now();
        let output = self.plan(request).and_then(|plan| self.execute(&plan));

        if self.metrics_enabled {
            match &output {
                Ok(output) => {
                    metrics::record_query(output.strategy.name(), start.elapsed().as_secs_f64());
                }
                Err(e) => metrics::record_error(e.kind(), "query"),
            }
        }
        output
    }

    /// Extend the range by one sample on each side
    fn widen(
        &self,
        channel: ChannelId,
        range: QueryRange,
        client: ClientHint,
    ) -> Result<QueryRange> {
        if client == ClientHint::Raw {
            return Ok(range);
        }

        let from = match range.from {
            Some(from) => Some(
                self.samples
                    .nearest_before(channel, from)?
                    .map_or(from, |sample| sample.timestamp),
            ),
            None => None,
        };
        let to = match range.to {
            Some(to) => Some(
                self.samples
                    .nearest_after(channel, to)?
                    .map_or(to, |sample| sample.timestamp),
            ),
            None => None,
        };
        Ok(QueryRange { from, to })
    }

    /// Level and boundary for a rollup eligible request
    fn resolve_rollup(
        &self,
        channel: ChannelId,
        range: &QueryRange,
        group_by: Option<AggregationLevel>,
        tuple_count: Option<u64>,
    ) -> Result<Option<(AggregationLevel, AggregationBoundary)>> {
        let counts = self.rollups.row_counts_by_level(channel, group_by)?;
        let Some(level) = choose_level(&counts, group_by, self.default_level) else {
            warn!(
                channel,
                group_by = ?group_by,
                default_level = %self.default_level,
                "default rollup level is coarser than the grouping, using raw samples"
            );
            return Ok(None);
        };

        // A single target tuple keeps the first bucket raw
        let shift = u32::from(group_by.is_none() && tuple_count == Some(1));
        let boundary = self
            .rollups
            .boundary(channel, level, range.from, range.to, shift)?;
        if self.metrics_enabled {
            metrics::record_boundary(boundary.is_valid());
        }

        Ok(Some((level, boundary)))
    }
}

impl<S, R> QueryEngine<S, R>
where
    S: SampleStore,
    R: RollupWriter,
{
    /// Maintenance job writing into this engine's rollup store
    pub fn rollup_aggregator(&self) -> RollupAggregator<'_, S, R> {
        RollupAggregator::new(&self.samples, &self.rollups).with_metrics(self.metrics_enabled)
    }
}
