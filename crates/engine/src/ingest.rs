use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use common::Result;
use strategy::{IndicatorReading, IndicatorStore};

/// Publish moving-average readings from an external indicator pipeline.
///
/// Each line is one JSON `IndicatorReading`, e.g.
/// `{"kind":"sma","interval":"1h","window":25,"value":"101.5","samples":25}`.
/// A reading with `"samples":0` resets its series, which then stays
/// unavailable until it warms up again. Malformed lines are logged and
/// skipped. Returns the number of readings applied once the reader reaches
/// end of input.
pub async fn ingest_readings<R>(reader: R, store: Arc<IndicatorStore>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<IndicatorReading>(line) {
            Ok(reading) if reading.is_reset() => {
                info!(kind = %reading.kind, series = %reading.series(), "Indicator series reset");
                store.forget(reading.kind, reading.series());
                published += 1;
            }
            Ok(reading) => {
                store.publish(reading);
                published += 1;
            }
            Err(e) => warn!(error = %e, line, "Skipping malformed indicator reading"),
        }
    }

    info!(published, series = store.len(), "Indicator input closed");
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{IndicatorLookup, Interval, IntervalWindow, MovingAverageKind};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn publishes_valid_lines_and_skips_garbage() {
        let input = concat!(
            r#"{"kind":"sma","interval":"1h","window":25,"value":"101.5","samples":25}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"kind":"EMA","interval":"4h","window":7,"value":99.25,"samples":3}"#,
            "\n",
        );
        let store = Arc::new(IndicatorStore::new());

        let published = ingest_readings(input.as_bytes(), store.clone()).await.unwrap();
        assert_eq!(published, 2);

        let sma = IntervalWindow { interval: Interval::OneHour, window: 25 };
        assert_eq!(
            store.latest_average(MovingAverageKind::Sma, sma).unwrap(),
            dec!(101.5)
        );

        // Still warming up: fewer samples than the window.
        let ewma = IntervalWindow { interval: Interval::FourHours, window: 7 };
        assert!(store.latest_average(MovingAverageKind::Ewma, ewma).is_err());
    }

    #[tokio::test]
    async fn zero_sample_reading_resets_series() {
        let input = concat!(
            r#"{"kind":"sma","interval":"1h","window":25,"value":"101.5","samples":30}"#,
            "\n",
            r#"{"kind":"ewma","interval":"1h","window":7,"value":"99","samples":7}"#,
            "\n",
            r#"{"kind":"sma","interval":"1h","window":25,"value":"0","samples":0}"#,
            "\n",
        );
        let store = Arc::new(IndicatorStore::new());

        let applied = ingest_readings(input.as_bytes(), store.clone()).await.unwrap();
        assert_eq!(applied, 3);
        assert_eq!(store.len(), 1);

        let sma = IntervalWindow { interval: Interval::OneHour, window: 25 };
        assert!(store.latest_average(MovingAverageKind::Sma, sma).is_err());

        let ewma = IntervalWindow { interval: Interval::OneHour, window: 7 };
        assert_eq!(
            store.latest_average(MovingAverageKind::Ewma, ewma).unwrap(),
            dec!(99)
        );
    }
}
