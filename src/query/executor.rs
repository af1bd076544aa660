//! Query Executor - runs a [`QueryPlan`] against the stores
//!
//! Execution is two passes, like the count-then-data query pair of a SQL
//! backend: the row count is computed first (it decides the package size),
//! then the data pipeline is opened lazily.
//!
//! ```text
//! ┌─────────────────┐
//! │  TupleStream    │  ← min/max tracking
//! └────────┬────────┘
//!          │ pull
//! ┌────────▼────────┐
//! │ group/downsample│  ← ReduceByKey (optional)
//! └────────┬────────┘
//!          │ pull
//! ┌────────▼────────┐
//! │   TierChain     │  ← raw-pre, rollup-middle, raw-post
//! └─────────────────┘
//! ```

use tracing::debug;

use crate::engine::traits::{RollupStore, RowStream, SampleStore};
use crate::error::{Result, StoreError};
use crate::query::operators::{count_groups, downsample, group_by_level, PackageSpec, TierChain};
use crate::query::planner::{QueryPlan, Strategy, Tier};
use crate::query::result::{QueryOutput, TupleStream};
use crate::types::Tuple;

/// Executes plans against a pair of stores
pub struct QueryExecutor<'a, S: ?Sized, R: ?Sized> {
    /// Raw sample store
    samples: &'a S,

    /// Rollup store
    rollups: &'a R,
}

impl<'a, S, R> QueryExecutor<'a, S, R>
where
    S: SampleStore + ?Sized + 'a,
    R: RollupStore + ?Sized + 'a,
{
    /// Create an executor over the stores
    pub fn new(samples: &'a S, rollups: &'a R) -> Self {
        Self { samples, rollups }
    }

    fn chain(&self, plan: &QueryPlan, tiers: Vec<Tier>) -> TierChain<'a, S, R> {
        TierChain::new(self.samples, self.rollups, plan.channel, tiers)
    }

    /// Row count before downsampling
    ///
    /// Grouped plans count distinct buckets; ungrouped stitched plans sum the
    /// sample counts of every tier; ungrouped raw plans count samples.
    pub fn count(&self, plan: &QueryPlan) -> std::result::Result<u64, StoreError> {
        match (plan.strategy, plan.group_by) {
            (_, Some(level)) => count_groups(self.chain(plan, plan.tiers.clone()), level),
            (Strategy::Counted, None) => {
                plan.tiers.iter().try_fold(0u64, |total, tier| {
                    let count = match tier {
                        Tier::Raw(range) => self.samples.count(plan.channel, range)?,
                        Tier::Rollup { level, range } => {
                            self.rollups.sample_count(plan.channel, *level, range)?
                        }
                    };
                    Ok::<_, StoreError>(total + count)
                })
            }
            (_, None) => self.samples.count(plan.channel, &plan.range.scan()),
        }
    }

    /// Rows the stitched tiers yield, a rollup row counting once
    pub fn stitched_rows(&self, plan: &QueryPlan) -> std::result::Result<u64, StoreError> {
        plan.tiers.iter().try_fold(0u64, |total, tier| {
            let rows = match tier {
                Tier::Raw(range) => self.samples.count(plan.channel, range)?,
                Tier::Rollup { level, range } => {
                    self.rollups.row_count(plan.channel, *level, range)?
                }
            };
            Ok::<_, StoreError>(total + rows)
        })
    }

    /// Timestamps of the first and last sample inside the plan range
    pub fn extent(&self, plan: &QueryPlan) -> std::result::Result<(i64, i64), StoreError> {
        let after = plan.range.from.map_or(i64::MIN, |from| from.saturating_sub(1));
        let before = plan.range.to.map_or(i64::MAX, |to| to.saturating_add(1));
        let first = self.samples.nearest_after(plan.channel, after)?;
        let last = self.samples.nearest_before(plan.channel, before)?;
        match (first, last) {
            (Some(first), Some(last)) => Ok((first.timestamp, last.timestamp)),
            _ => Err(StoreError::Backend(format!(
                "channel {} counted rows in {} but has no sample there",
                plan.channel,
                plan.range.scan()
            ))),
        }
    }

    /// Execute the plan
    pub fn execute(&self, plan: &QueryPlan) -> Result<QueryOutput<'a>> {
        let row_count = self.count(plan)?;
        debug!(
            channel = plan.channel,
            strategy = %plan.strategy,
            row_count,
            "counted rows"
        );

        if row_count == 0 {
            return Ok(QueryOutput {
                row_count: 0,
                range_from: None,
                range_to: None,
                strategy: plan.strategy,
                rollup_level: plan.rollup_level,
                tuples: TupleStream::empty(),
            });
        }

        let (range_from, range_to) = self.extent(plan)?;
        let (row_count, pipeline) = self.pipeline(plan, row_count)?;
        Ok(QueryOutput {
            row_count,
            range_from: Some(range_from),
            range_to: Some(range_to),
            strategy: plan.strategy,
            rollup_level: plan.rollup_level,
            tuples: TupleStream::new(pipeline),
        })
    }

    /// Operator pipeline and the number of tuples it yields
    fn pipeline(
        &self,
        plan: &QueryPlan,
        row_count: u64,
    ) -> std::result::Result<(u64, RowStream<'a, Tuple>), StoreError> {
        if let Some(level) = plan.group_by {
            let chain = self.chain(plan, plan.tiers.clone());
            return Ok((row_count, Box::new(group_by_level(chain, level, plan.reducer))));
        }

        let target = match plan.tuple_count {
            Some(target) if row_count > target => target,
            _ => {
                // Full resolution: rollup rows would merge samples
                let chain = self.chain(plan, vec![Tier::Raw(plan.range.scan())]);
                return Ok((row_count, Box::new(chain)));
            }
        };

        let rows = match plan.strategy {
            Strategy::Counted => self.stitched_rows(plan)?,
            _ => row_count,
        };
        let chain = self.chain(plan, plan.tiers.clone());
        match PackageSpec::for_target(rows, target) {
            Some(spec) => {
                debug!(
                    channel = plan.channel,
                    rows,
                    package_size = spec.package_size,
                    packages = spec.packages,
                    "downsampling"
                );
                Ok((spec.packages, Box::new(downsample(chain, spec, plan.reducer))))
            }
            None => Ok((rows, Box::new(chain))),
        }
    }
}
