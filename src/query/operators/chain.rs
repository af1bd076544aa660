//! Tier chaining - stitches raw and rollup scans into one ascending stream
//!
//! Tiers are disjoint and ordered (raw-pre, rollup-middle, raw-post), so
//! concatenating them keeps timestamp order. Each tier's scan is only opened
//! once the previous one is exhausted.

use std::vec;

use crate::engine::traits::{RollupStore, RowStream, SampleStore};
use crate::error::StoreError;
use crate::query::planner::Tier;
use crate::types::{ChannelId, Tuple};

/// Lazy concatenation of tier scans
pub struct TierChain<'a, S: ?Sized, R: ?Sized> {
    /// Raw sample store
    samples: &'a S,

    /// Rollup store
    rollups: &'a R,

    /// Channel being scanned
    channel: ChannelId,

    /// Tiers not yet opened
    tiers: vec::IntoIter<Tier>,

    /// Scan of the current tier
    current: Option<RowStream<'a, Tuple>>,

    /// Exhausted or failed
    finished: bool,
}

impl<'a, S, R> TierChain<'a, S, R>
where
    S: SampleStore + ?Sized,
    R: RollupStore + ?Sized,
{
    /// Create a chain over `tiers`, in order
    pub fn new(samples: &'a S, rollups: &'a R, channel: ChannelId, tiers: Vec<Tier>) -> Self {
        Self {
            samples,
            rollups,
            channel,
            tiers: tiers.into_iter(),
            current: None,
            finished: false,
        }
    }

    fn open(&self, tier: Tier) -> Result<RowStream<'a, Tuple>, StoreError> {
        let (samples, rollups) = (self.samples, self.rollups);
        match tier {
            Tier::Raw(range) => {
                let rows = samples.scan(self.channel, &range)?;
                Ok(Box::new(rows.map(|row| row.map(Tuple::from))))
            }
            Tier::Rollup { level, range } => {
                let rows = rollups.scan(self.channel, level, &range)?;
                Ok(Box::new(rows.map(|row| row.map(Tuple::from))))
            }
        }
    }
}

impl<'a, S, R> Iterator for TierChain<'a, S, R>
where
    S: SampleStore + ?Sized,
    R: RollupStore + ?Sized,
{
    type Item = Result<Tuple, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(current) = self.current.as_mut() {
                match current.next() {
                    Some(Ok(tuple)) => return Some(Ok(tuple)),
                    Some(Err(e)) => {
                        self.finished = true;
                        self.current = None;
                        return Some(Err(e));
                    }
                    None => self.current = None,
                }
            }

            let Some(tier) = self.tiers.next() else {
                self.finished = true;
                return None;
            };
            match self.open(tier) {
                Ok(stream) => self.current = Some(stream),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
