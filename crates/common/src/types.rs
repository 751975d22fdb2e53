use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Kline interval as understood by the exchange stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Interval {
    pub const ALL: [Interval; 15] = [
        Interval::OneMinute,
        Interval::ThreeMinutes,
        Interval::FiveMinutes,
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
        Interval::TwoHours,
        Interval::FourHours,
        Interval::SixHours,
        Interval::EightHours,
        Interval::TwelveHours,
        Interval::OneDay,
        Interval::ThreeDays,
        Interval::OneWeek,
        Interval::OneMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::SixHours => "6h",
            Interval::EightHours => "8h",
            Interval::TwelveHours => "12h",
            Interval::OneDay => "1d",
            Interval::ThreeDays => "3d",
            Interval::OneWeek => "1w",
            Interval::OneMonth => "1M",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown interval '{s}'")))
    }
}

/// Which moving average a rule consults.
///
/// Configuration strings are matched case-insensitively: `"sma"` selects the
/// simple average, every other value (including `"ema"`, `"ewma"`, an empty
/// string, or a typo) selects the exponential average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum MovingAverageKind {
    Sma,
    #[default]
    Ewma,
}

impl MovingAverageKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "sma" => MovingAverageKind::Sma,
            "ema" | "ewma" => MovingAverageKind::Ewma,
            _ => MovingAverageKind::Ewma,
        }
    }
}

impl From<String> for MovingAverageKind {
    fn from(s: String) -> Self {
        MovingAverageKind::parse(&s)
    }
}

impl fmt::Display for MovingAverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovingAverageKind::Sma => write!(f, "sma"),
            MovingAverageKind::Ewma => write!(f, "ewma"),
        }
    }
}

/// Interval and window size that identify one moving-average series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalWindow {
    pub interval: Interval,
    pub window: usize,
}

impl fmt::Display for IntervalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.interval, self.window)
    }
}

/// One support-detection rule. Field names on the wire follow the
/// strategy file schema (`supportDetection` entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Bar interval this rule reacts to.
    pub interval: Interval,
    #[serde(rename = "movingAverageType", default)]
    pub average_kind: MovingAverageKind,
    /// Interval of the klines the moving average is computed from.
    #[serde(rename = "movingAverageInterval")]
    pub average_interval: Interval,
    /// Number of klines in the moving average window.
    #[serde(rename = "movingAverageWindow")]
    pub average_window: usize,
    /// Minimum base-asset volume. Zero disables the check.
    #[serde(rename = "minVolume", default)]
    pub min_base_volume: Decimal,
    /// Minimum quote-asset volume. Zero disables the check.
    #[serde(rename = "minQuoteVolume", default)]
    pub min_quote_volume: Decimal,
}

impl Rule {
    pub fn average_series(&self) -> IntervalWindow {
        IntervalWindow {
            interval: self.average_interval,
            window: self.average_window,
        }
    }
}

/// A closed kline for one symbol and interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub interval: Interval,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Traded volume in the base asset.
    pub base_volume: Decimal,
    /// Traded volume in the quote asset.
    pub quote_volume: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// Which volume threshold a signal crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeSide {
    Base,
    Quote,
}

impl fmt::Display for VolumeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeSide::Base => write!(f, "base"),
            VolumeSide::Quote => write!(f, "quote"),
        }
    }
}

/// Support signal emitted when a bar crosses one of a rule's volume thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub rule: Rule,
    pub crossed: VolumeSide,
    /// The bar volume that crossed the threshold.
    pub observed: Decimal,
    pub threshold: Decimal,
    /// The other volume of the same bar, for context.
    pub counterpart: Decimal,
    pub close_price: Decimal,
    /// Moving-average value consulted for this bar.
    pub average: Decimal,
    pub bar_closed_at: DateTime<Utc>,
}

/// Subscription request for closed klines of one symbol at one interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub symbol: String,
    pub interval: Interval,
}

/// Display metadata of the traded market. Not used for evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub base_currency: String,
    pub quote_currency: String,
    /// Decimal places shown for base-asset amounts.
    #[serde(default)]
    pub volume_precision: u32,
}

/// Current state of the signal engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
}
