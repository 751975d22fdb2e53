use rust_decimal::Decimal;

use common::{Error, Interval, Result, Rule, Subscription};

/// Ordered, read-only collection of support-detection rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Validate and wrap the configured rules, keeping declaration order.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        for (idx, rule) in rules.iter().enumerate() {
            validate_rule(idx, rule)?;
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules reacting to bars of `interval`, in declaration order.
    pub fn rules_for_interval(&self, interval: Interval) -> impl Iterator<Item = &Rule> + '_ {
        self.rules.iter().filter(move |r| r.interval == interval)
    }

    /// Distinct rule intervals in order of first appearance.
    pub fn intervals(&self) -> Vec<Interval> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.interval) {
                seen.push(rule.interval);
            }
        }
        seen
    }

    pub fn reacts_to(&self, interval: Interval) -> bool {
        self.rules.iter().any(|r| r.interval == interval)
    }

    /// Kline subscriptions needed to evaluate this rule set for `symbol`.
    ///
    /// Moving-average series are provisioned by the indicator pipeline and
    /// are not requested here.
    pub fn subscriptions(&self, symbol: &str) -> Vec<Subscription> {
        self.intervals()
            .into_iter()
            .map(|interval| Subscription {
                symbol: symbol.to_string(),
                interval,
            })
            .collect()
    }
}

fn validate_rule(idx: usize, rule: &Rule) -> Result<()> {
    if rule.average_window == 0 {
        return Err(Error::Config(format!(
            "supportDetection[{idx}]: movingAverageWindow must be positive"
        )));
    }
    if rule.min_base_volume < Decimal::ZERO {
        return Err(Error::Config(format!(
            "supportDetection[{idx}]: minVolume must not be negative"
        )));
    }
    if rule.min_quote_volume < Decimal::ZERO {
        return Err(Error::Config(format!(
            "supportDetection[{idx}]: minQuoteVolume must not be negative"
        )));
    }
    Ok(())
}
