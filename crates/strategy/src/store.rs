use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use common::{Error, IndicatorLookup, Interval, IntervalWindow, MovingAverageKind, Result};

/// Latest value of one moving-average series, as produced by the indicator
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorReading {
    pub kind: MovingAverageKind,
    pub interval: Interval,
    pub window: usize,
    pub value: Decimal,
    /// Number of klines the series has absorbed so far.
    pub samples: usize,
}

impl IndicatorReading {
    /// A reading with no samples means the pipeline restarted the series.
    pub fn is_reset(&self) -> bool {
        self.samples == 0
    }

    pub fn series(&self) -> IntervalWindow {
        IntervalWindow {
            interval: self.interval,
            window: self.window,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: Decimal,
    samples: usize,
}

/// Shared snapshot of published moving-average values.
///
/// Written by the indicator ingestion task, read by every evaluation.
#[derive(Debug, Default)]
pub struct IndicatorStore {
    series: RwLock<HashMap<(MovingAverageKind, IntervalWindow), Entry>>,
}

impl IndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value of the reading's series.
    pub fn publish(&self, reading: IndicatorReading) {
        let key = (reading.kind, reading.series());
        let entry = Entry {
            value: reading.value,
            samples: reading.samples,
        };
        match self.series.write() {
            Ok(mut series) => {
                series.insert(key, entry);
            }
            Err(poisoned) => {
                warn!("Indicator store lock poisoned, recovering");
                poisoned.into_inner().insert(key, entry);
            }
        }
        debug!(
            kind = %reading.kind,
            series = %reading.series(),
            value = %reading.value,
            "Indicator published"
        );
    }

    /// Drop a series. It stays unavailable until published again.
    pub fn forget(&self, kind: MovingAverageKind, series: IntervalWindow) {
        match self.series.write() {
            Ok(mut map) => {
                map.remove(&(kind, series));
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&(kind, series));
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.series.read() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndicatorLookup for IndicatorStore {
    fn latest_average(&self, kind: MovingAverageKind, series: IntervalWindow) -> Result<Decimal> {
        let entry = match self.series.read() {
            Ok(map) => map.get(&(kind, series)).copied(),
            Err(poisoned) => poisoned.into_inner().get(&(kind, series)).copied(),
        };

        match entry {
            Some(e) if e.samples >= series.window => Ok(e.value),
            _ => Err(Error::IndicatorUnavailable { kind, series }),
        }
    }
}
