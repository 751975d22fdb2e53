use rust_decimal::Decimal;

use crate::{IntervalWindow, MovingAverageKind, Result};

/// Read access to the latest moving-average values.
///
/// Implementations are shared across evaluation tasks and updated by an
/// independent indicator pipeline. Lookups must be fast and in-memory.
pub trait IndicatorLookup: Send + Sync {
    /// Latest value of the requested moving average.
    ///
    /// Fails with `Error::IndicatorUnavailable` when the series was never
    /// provisioned or holds fewer samples than `series.window`.
    fn latest_average(&self, kind: MovingAverageKind, series: IntervalWindow) -> Result<Decimal>;
}
