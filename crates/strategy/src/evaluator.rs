use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use common::{Bar, Error, IndicatorLookup, Result, Rule, Signal, VolumeSide};

use crate::rules::RuleSet;

/// Evaluates closed bars of one symbol against the configured support rules.
///
/// Holds no mutable state: evaluating the same bar twice against an
/// unchanged indicator snapshot yields the same signals.
#[derive(Clone)]
pub struct BarEvaluator {
    symbol: String,
    rules: Arc<RuleSet>,
    lookup: Arc<dyn IndicatorLookup>,
    require_price_at_or_below_average: bool,
}

impl BarEvaluator {
    pub fn new(
        symbol: impl Into<String>,
        rules: Arc<RuleSet>,
        lookup: Arc<dyn IndicatorLookup>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            rules,
            lookup,
            require_price_at_or_below_average: false,
        }
    }

    /// Only emit when the bar closed at or below the moving average.
    /// Off by default, in which case the price comparison is informational.
    pub fn require_price_at_or_below_average(mut self, enabled: bool) -> Self {
        self.require_price_at_or_below_average = enabled;
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Evaluate one closed bar. Returns signals in rule declaration order,
    /// at most one per rule.
    pub fn evaluate(&self, bar: &Bar) -> Vec<Signal> {
        if bar.symbol != self.symbol {
            return Vec::new();
        }

        self.rules
            .rules_for_interval(bar.interval)
            .filter_map(|rule| {
                let average = self
                    .lookup
                    .latest_average(rule.average_kind, rule.average_series());
                self.evaluate_rule(rule, bar, average)
            })
            .collect()
    }

    /// Like [`evaluate`](Self::evaluate), but every lookup runs on the
    /// blocking pool and is bounded by `timeout`. A lookup that does not
    /// answer in time counts as unavailable for its own rule only.
    pub async fn evaluate_within(&self, bar: &Bar, timeout: Duration) -> Vec<Signal> {
        if bar.symbol != self.symbol {
            return Vec::new();
        }

        let mut signals = Vec::new();
        for rule in self.rules.rules_for_interval(bar.interval) {
            let average = self.bounded_lookup(rule, timeout).await;
            if let Some(signal) = self.evaluate_rule(rule, bar, average) {
                signals.push(signal);
            }
        }
        signals
    }

    async fn bounded_lookup(&self, rule: &Rule, timeout: Duration) -> Result<Decimal> {
        let kind = rule.average_kind;
        let series = rule.average_series();
        let lookup = self.lookup.clone();
        let task = tokio::task::spawn_blocking(move || lookup.latest_average(kind, series));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(average)) => average,
            Ok(Err(e)) => {
                warn!(kind = %kind, series = %series, error = %e, "Indicator lookup task failed");
                Err(Error::IndicatorUnavailable { kind, series })
            }
            Err(_) => {
                // The blocking call cannot be cancelled; its late answer is discarded.
                warn!(
                    kind = %kind,
                    series = %series,
                    timeout = ?timeout,
                    "Indicator lookup timed out"
                );
                Err(Error::IndicatorUnavailable { kind, series })
            }
        }
    }

    fn evaluate_rule(&self, rule: &Rule, bar: &Bar, average: Result<Decimal>) -> Option<Signal> {
        let average = match average {
            Ok(v) => v,
            Err(e) => {
                debug!(
                    symbol = %bar.symbol,
                    interval = %bar.interval,
                    error = %e,
                    "Skipping rule"
                );
                return None;
            }
        };

        let at_or_below = bar.close <= average;
        if self.require_price_at_or_below_average && !at_or_below {
            debug!(
                symbol = %bar.symbol,
                close = %bar.close,
                average = %average,
                "Close above moving average, signal suppressed"
            );
            return None;
        }

        let (crossed, observed, threshold, counterpart) =
            if crosses(bar.base_volume, rule.min_base_volume) {
                (VolumeSide::Base, bar.base_volume, rule.min_base_volume, bar.quote_volume)
            } else if crosses(bar.quote_volume, rule.min_quote_volume) {
                (VolumeSide::Quote, bar.quote_volume, rule.min_quote_volume, bar.base_volume)
            } else {
                return None;
            };

        Some(Signal {
            symbol: bar.symbol.clone(),
            rule: rule.clone(),
            crossed,
            observed,
            threshold,
            counterpart,
            close_price: bar.close,
            average,
            bar_closed_at: bar.closed_at,
        })
    }
}

/// A zero threshold is disabled; otherwise the volume must be strictly above it.
fn crosses(volume: Decimal, threshold: Decimal) -> bool {
    threshold > Decimal::ZERO && volume > threshold
}
