use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, info, warn};

use common::{Bar, EngineState, Signal};

use crate::evaluator::BarEvaluator;

/// Bridges the closed-bar broadcast to the evaluator and queues the
/// resulting signals for delivery.
pub struct EventDispatcher {
    evaluator: BarEvaluator,
    lookup_timeout: Duration,
}

impl EventDispatcher {
    pub fn new(evaluator: BarEvaluator, lookup_timeout: Duration) -> Self {
        Self {
            evaluator,
            lookup_timeout,
        }
    }

    /// Whether the bar concerns the configured symbol and an interval some
    /// rule reacts to.
    pub fn accepts(&self, bar: &Bar) -> bool {
        bar.symbol == self.evaluator.symbol() && self.evaluator.rules().reacts_to(bar.interval)
    }

    /// Evaluate one bar. Each indicator lookup is bounded by the lookup
    /// timeout; an expired lookup skips only its own rule.
    pub async fn dispatch(&self, bar: Bar) -> Vec<Signal> {
        self.evaluator
            .evaluate_within(&bar, self.lookup_timeout)
            .await
    }

    /// Run the dispatch loop.
    /// Reads closed bars from `bar_rx`, pushes signals to `signal_tx`.
    /// Bars are ignored while the engine is not running.
    ///
    /// The signal queue is unbounded: a slow sink delays delivery but never
    /// blocks this loop or loses a signal.
    pub async fn run(
        self,
        mut bar_rx: broadcast::Receiver<Bar>,
        signal_tx: mpsc::UnboundedSender<Signal>,
        engine_state: Arc<RwLock<EngineState>>,
    ) {
        info!(
            symbol = %self.evaluator.symbol(),
            rules = self.evaluator.rules().len(),
            "EventDispatcher running"
        );
        loop {
            match bar_rx.recv().await {
                Ok(bar) => {
                    let state = *engine_state.read().await;
                    if state != EngineState::Running {
                        continue;
                    }
                    if !self.accepts(&bar) {
                        continue;
                    }

                    debug!(
                        symbol = %bar.symbol,
                        interval = %bar.interval,
                        close = %bar.close,
                        "Evaluating closed bar"
                    );
                    for signal in self.dispatch(bar).await {
                        if signal_tx.send(signal).is_err() {
                            warn!("Signal channel closed, stopping dispatcher");
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(dropped = n, "Dispatcher lagged, dropped closed bars");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("Bar broadcast channel closed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use async_trait::async_trait;
    use common::{
        Error, IndicatorLookup, Interval, IntervalWindow, MovingAverageKind, Result, Rule,
        SignalSink, VolumeSide,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    use crate::rules::RuleSet;
    use crate::sink::spawn_delivery;

    struct ConstLookup(Decimal);

    impl IndicatorLookup for ConstLookup {
        fn latest_average(&self, _: MovingAverageKind, _: IntervalWindow) -> Result<Decimal> {
            Ok(self.0)
        }
    }

    struct SlowLookup;

    impl IndicatorLookup for SlowLookup {
        fn latest_average(
            &self,
            kind: MovingAverageKind,
            series: IntervalWindow,
        ) -> Result<Decimal> {
            std::thread::sleep(Duration::from_millis(200));
            Err(Error::IndicatorUnavailable { kind, series })
        }
    }

    /// Answers at once, except for one window whose lookup stalls.
    struct StallingWindow {
        window: usize,
        stall: Duration,
    }

    impl IndicatorLookup for StallingWindow {
        fn latest_average(&self, _: MovingAverageKind, series: IntervalWindow) -> Result<Decimal> {
            if series.window == self.window {
                std::thread::sleep(self.stall);
            }
            Ok(dec!(100))
        }
    }

    /// Records delivered signals after a fixed delay per signal.
    struct SlowRecorder {
        delay: Duration,
        seen: Mutex<Vec<Signal>>,
    }

    impl SlowRecorder {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                seen: Mutex::new(Vec::new()),
            }
        }

        async fn observed(&self) -> Vec<Decimal> {
            self.seen.lock().await.iter().map(|s| s.observed).collect()
        }
    }

    #[async_trait]
    impl SignalSink for SlowRecorder {
        async fn deliver(&self, signal: Signal) {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().await.push(signal);
        }
    }

    fn base_rule(window: usize) -> Rule {
        Rule {
            interval: Interval::OneHour,
            average_kind: MovingAverageKind::Sma,
            average_interval: Interval::OneHour,
            average_window: window,
            min_base_volume: dec!(100),
            min_quote_volume: Decimal::ZERO,
        }
    }

    fn rules() -> Arc<RuleSet> {
        Arc::new(
            RuleSet::new(vec![
                Rule {
                    interval: Interval::OneHour,
                    average_kind: MovingAverageKind::Sma,
                    average_interval: Interval::OneHour,
                    average_window: 25,
                    min_base_volume: dec!(100),
                    min_quote_volume: dec!(1000),
                },
                Rule {
                    interval: Interval::OneHour,
                    average_kind: MovingAverageKind::Ewma,
                    average_interval: Interval::FourHours,
                    average_window: 7,
                    min_base_volume: Decimal::ZERO,
                    min_quote_volume: dec!(1000),
                },
            ])
            .unwrap(),
        )
    }

    fn dispatcher(lookup: Arc<dyn IndicatorLookup>, timeout: Duration) -> EventDispatcher {
        EventDispatcher::new(BarEvaluator::new("BTCUSDT", rules(), lookup), timeout)
    }

    fn bar(symbol: &str, interval: Interval, base: Decimal, quote: Decimal) -> Bar {
        Bar {
            symbol: symbol.into(),
            interval,
            open: dec!(100),
            high: dec!(101),
            low: dec!(99),
            close: dec!(100),
            base_volume: base,
            quote_volume: quote,
            closed_at: Utc::now(),
        }
    }

    fn running() -> Arc<RwLock<EngineState>> {
        Arc::new(RwLock::new(EngineState::Running))
    }

    #[test]
    fn accepts_only_configured_symbol_and_intervals() {
        let d = dispatcher(Arc::new(ConstLookup(dec!(100))), Duration::from_secs(1));
        assert!(d.accepts(&bar("BTCUSDT", Interval::OneHour, dec!(1), dec!(1))));
        assert!(!d.accepts(&bar("ETHUSDT", Interval::OneHour, dec!(1), dec!(1))));
        // 4h is only an average interval, not a rule interval.
        assert!(!d.accepts(&bar("BTCUSDT", Interval::FourHours, dec!(1), dec!(1))));
    }

    #[tokio::test]
    async fn dispatch_evaluates_every_matching_rule() {
        let d = dispatcher(Arc::new(ConstLookup(dec!(100))), Duration::from_secs(1));
        let signals = d
            .dispatch(bar("BTCUSDT", Interval::OneHour, dec!(150), dec!(2000)))
            .await;
        let sides: Vec<VolumeSide> = signals.iter().map(|s| s.crossed).collect();
        assert_eq!(sides, vec![VolumeSide::Base, VolumeSide::Quote]);
    }

    #[tokio::test]
    async fn slow_lookup_is_treated_as_unavailable() {
        let d = dispatcher(Arc::new(SlowLookup), Duration::from_millis(10));
        let signals = d
            .dispatch(bar("BTCUSDT", Interval::OneHour, dec!(150), dec!(2000)))
            .await;
        assert!(signals.is_empty());
    }

    #[tokio::test]
    async fn stalled_lookup_skips_only_its_own_rule() {
        let rules = Arc::new(RuleSet::new(vec![base_rule(99), base_rule(25)]).unwrap());
        let lookup = Arc::new(StallingWindow {
            window: 99,
            stall: Duration::from_millis(300),
        });
        let d = EventDispatcher::new(
            BarEvaluator::new("BTCUSDT", rules, lookup),
            Duration::from_millis(50),
        );

        let signals = d
            .dispatch(bar("BTCUSDT", Interval::OneHour, dec!(150), Decimal::ZERO))
            .await;

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].rule.average_window, 25);
        assert_eq!(signals[0].crossed, VolumeSide::Base);
    }

    #[tokio::test]
    async fn run_forwards_signals_in_order() {
        let d = dispatcher(Arc::new(ConstLookup(dec!(100))), Duration::from_secs(1));
        let (bar_tx, bar_rx) = broadcast::channel(16);
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        bar_tx.send(bar("ETHUSDT", Interval::OneHour, dec!(500), dec!(5000))).unwrap();
        bar_tx.send(bar("BTCUSDT", Interval::OneMinute, dec!(500), dec!(5000))).unwrap();
        bar_tx.send(bar("BTCUSDT", Interval::OneHour, dec!(50), dec!(2000))).unwrap();
        bar_tx.send(bar("BTCUSDT", Interval::OneHour, dec!(150), dec!(10))).unwrap();
        drop(bar_tx);

        d.run(bar_rx, signal_tx, running()).await;

        let mut seen = Vec::new();
        while let Some(s) = signal_rx.recv().await {
            seen.push((s.crossed, s.observed));
        }
        assert_eq!(
            seen,
            vec![
                (VolumeSide::Quote, dec!(2000)),
                (VolumeSide::Quote, dec!(2000)),
                (VolumeSide::Base, dec!(150)),
            ]
        );
    }

    #[tokio::test]
    async fn paused_engine_suppresses_evaluation() {
        let d = dispatcher(Arc::new(ConstLookup(dec!(100))), Duration::from_secs(1));
        let (bar_tx, bar_rx) = broadcast::channel(4);
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        bar_tx.send(bar("BTCUSDT", Interval::OneHour, dec!(150), dec!(2000))).unwrap();
        drop(bar_tx);

        d.run(bar_rx, signal_tx, Arc::new(RwLock::new(EngineState::Paused))).await;
        assert!(signal_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_sink_receives_every_signal_in_order() {
        let d = dispatcher(Arc::new(ConstLookup(dec!(100))), Duration::from_secs(1));
        let (bar_tx, bar_rx) = broadcast::channel(16);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let sink = Arc::new(SlowRecorder::new(Duration::from_millis(50)));
        let delivery = spawn_delivery(signal_rx, sink.clone());

        for base in [150, 160, 170, 180, 190] {
            bar_tx
                .send(bar("BTCUSDT", Interval::OneHour, Decimal::from(base), dec!(2000)))
                .unwrap();
        }
        drop(bar_tx);

        // The dispatcher finishes while the sink is still working through the queue.
        d.run(bar_rx, signal_tx, running()).await;
        assert!(sink.observed().await.len() < 10);

        delivery.await.unwrap();
        let mut expected = Vec::new();
        for base in [150, 160, 170, 180, 190] {
            expected.push(Decimal::from(base));
            expected.push(dec!(2000));
        }
        assert_eq!(sink.observed().await, expected);
    }

    #[tokio::test]
    async fn stopping_dispatcher_lets_delivery_drain() {
        let d = dispatcher(Arc::new(ConstLookup(dec!(100))), Duration::from_secs(1));
        let (bar_tx, bar_rx) = broadcast::channel(4);
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(d.run(bar_rx, signal_tx, running()));

        bar_tx
            .send(bar("BTCUSDT", Interval::OneHour, dec!(150), dec!(2000)))
            .unwrap();
        bar_tx
            .send(bar("BTCUSDT", Interval::OneHour, dec!(160), dec!(2000)))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while signal_rx.len() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Bars are still flowing, so only aborting the task releases the sender.
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let sink = Arc::new(SlowRecorder::new(Duration::from_millis(5)));
        let delivery = spawn_delivery(signal_rx, sink.clone());
        tokio::time::timeout(Duration::from_secs(5), delivery)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            sink.observed().await,
            vec![dec!(150), dec!(2000), dec!(160), dec!(2000)]
        );
        drop(bar_tx);
    }

    #[tokio::test]
    async fn closed_signal_channel_stops_dispatcher() {
        let d = dispatcher(Arc::new(ConstLookup(dec!(100))), Duration::from_secs(1));
        let (bar_tx, bar_rx) = broadcast::channel(4);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        drop(signal_rx);

        bar_tx.send(bar("BTCUSDT", Interval::OneHour, dec!(150), dec!(2000))).unwrap();

        // Returns even though the bar sender is still alive.
        d.run(bar_rx, signal_tx, running()).await;
        drop(bar_tx);
    }
}
