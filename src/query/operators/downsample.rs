//! Downsample Operator - Package reduction to a target tuple count
//!
//! The ordered stream is cut into contiguous packages of `package_size`
//! rows and every package is reduced to one tuple (max timestamp, reduced
//! value, summed count).
//!
//! Package keys are computed from each row's ordinal, so no scan state
//! beyond a running counter is needed:
//!
//! ```text
//! ordinal:   0 | 1 2 3 | 4 5 6 | 7 8 9 10
//! package:   0 |   1   |   2   |    3
//! ```
//!
//! The first package holds only the first row, so the first output tuple is
//! the true first row. The last package absorbs the remainder, which makes
//! the output exactly `row_count / package_size` tuples. A rollup row is one
//! row here; its `count` only flows into the merged tuple.

use crate::aggregation::Reducer;
use crate::error::StoreError;
use crate::query::operators::ReduceByKey;
use crate::types::Tuple;

/// Package layout for one downsampled query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageSpec {
    /// Rows per package
    pub package_size: u64,

    /// Number of output tuples, `row_count / package_size`
    pub packages: u64,
}

impl PackageSpec {
    /// Layout for reducing `row_count` rows to about `target` tuples
    ///
    /// `None` when no reduction applies: no target, the natural density
    /// already fits, or the package size would be 1.
    pub fn for_target(row_count: u64, target: u64) -> Option<Self> {
        if target == 0 || row_count <= target {
            return None;
        }
        let package_size = row_count / target;
        if package_size <= 1 {
            return None;
        }
        Some(Self {
            package_size,
            packages: row_count / package_size,
        })
    }

    /// Package of the row at `ordinal` (zero based)
    #[inline]
    pub fn key(&self, ordinal: u64) -> u64 {
        if self.packages <= 1 {
            return 0;
        }
        let skewed = ordinal.saturating_add(self.package_size - 1) / self.package_size;
        skewed.min(self.packages - 1)
    }
}

/// Reduce an ascending stream of `row_count` rows to `spec.packages` tuples
pub fn downsample<I>(
    input: I,
    spec: PackageSpec,
    reducer: Reducer,
) -> ReduceByKey<I, impl FnMut(&Tuple) -> u64, u64>
where
    I: Iterator<Item = Result<Tuple, StoreError>>,
{
    let mut ordinal = 0u64;
    ReduceByKey::new(
        input,
        move |_: &Tuple| {
            let key = spec.key(ordinal);
            ordinal += 1;
            key
        },
        reducer,
    )
}
