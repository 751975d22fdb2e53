use rust_decimal::{Decimal, RoundingStrategy};

use common::{Market, Signal, VolumeSide};
use strategy::RuleSet;

/// Human-readable notification for a support signal.
pub fn format_signal(market: &Market, signal: &Signal) -> String {
    let base = |v: Decimal| money(v, market.volume_precision, &market.base_currency);
    let quote = |v: Decimal| money(v, 0, &market.quote_currency);

    match signal.crossed {
        VolumeSide::Base => format!(
            "Detected {} support base volume {} > min base volume {}, quote volume {}",
            signal.symbol,
            base(signal.observed),
            base(signal.threshold),
            quote(signal.counterpart),
        ),
        VolumeSide::Quote => format!(
            "Detected {} support quote volume {} > min quote volume {}, base volume {}",
            signal.symbol,
            quote(signal.observed),
            quote(signal.threshold),
            base(signal.counterpart),
        ),
    }
}

/// One line per configured rule, for the `/rules` command.
pub fn format_rules(symbol: &str, rules: &RuleSet) -> String {
    if rules.is_empty() {
        return format!("{symbol}: no support rules configured");
    }

    let mut out = format!("{symbol} support rules:");
    for (idx, rule) in rules.rules().iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {} bars vs {}({}, {}) min volume {} min quote volume {}",
            idx + 1,
            rule.interval,
            rule.average_kind,
            rule.average_interval,
            rule.average_window,
            rule.min_base_volume.normalize(),
            rule.min_quote_volume.normalize(),
        ));
    }
    out
}

/// Amount rounded to `precision` places, with thousands separators and
/// an optional currency suffix.
pub fn money(value: Decimal, precision: u32, currency: &str) -> String {
    let rounded = value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.*}", precision as usize, rounded);

    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let mut out = format!("{sign}{grouped}");
    if let Some(f) = frac_part {
        out.push('.');
        out.push_str(f);
    }
    if !currency.is_empty() {
        out.push(' ');
        out.push_str(currency);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{Interval, MovingAverageKind, Rule};
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            base_currency: "BTC".into(),
            quote_currency: "USDT".into(),
            volume_precision: 2,
        }
    }

    fn rule() -> Rule {
        Rule {
            interval: Interval::OneHour,
            average_kind: MovingAverageKind::Sma,
            average_interval: Interval::FourHours,
            average_window: 25,
            min_base_volume: dec!(100),
            min_quote_volume: dec!(1000000),
        }
    }

    fn signal(
        crossed: VolumeSide,
        observed: Decimal,
        threshold: Decimal,
        counterpart: Decimal,
    ) -> Signal {
        Signal {
            symbol: "BTCUSDT".into(),
            rule: rule(),
            crossed,
            observed,
            threshold,
            counterpart,
            close_price: dec!(27000),
            average: dec!(27100),
            bar_closed_at: Utc::now(),
        }
    }

    #[test]
    fn money_groups_thousands_and_rounds() {
        assert_eq!(money(dec!(1234567.891), 2, "BTC"), "1,234,567.89 BTC");
        assert_eq!(money(dec!(999.995), 2, "BTC"), "1,000.00 BTC");
        assert_eq!(money(dec!(12.5), 0, "USDT"), "13 USDT");
        assert_eq!(money(dec!(-1234.5), 1, ""), "-1,234.5");
        assert_eq!(money(dec!(0), 0, "USDT"), "0 USDT");
        assert_eq!(money(dec!(100), 3, "ETH"), "100.000 ETH");
    }

    #[test]
    fn base_signal_message() {
        let s = signal(VolumeSide::Base, dec!(150.456), dec!(100), dec!(4050123.4));
        assert_eq!(
            format_signal(&market(), &s),
            "Detected BTCUSDT support base volume 150.46 BTC > min base volume 100.00 BTC, quote volume 4,050,123 USDT"
        );
    }

    #[test]
    fn quote_signal_message() {
        let s = signal(VolumeSide::Quote, dec!(2000000), dec!(1000000), dec!(50));
        assert_eq!(
            format_signal(&market(), &s),
            "Detected BTCUSDT support quote volume 2,000,000 USDT > min quote volume 1,000,000 USDT, base volume 50.00 BTC"
        );
    }

    #[test]
    fn rules_listing() {
        let rules = RuleSet::new(vec![rule()]).unwrap();
        assert_eq!(
            format_rules("BTCUSDT", &rules),
            "BTCUSDT support rules:\n1. 1h bars vs sma(4h, 25) min volume 100 min quote volume 1000000"
        );
        let empty = RuleSet::new(Vec::new()).unwrap();
        assert_eq!(format_rules("BTCUSDT", &empty), "BTCUSDT: no support rules configured");
    }
}
