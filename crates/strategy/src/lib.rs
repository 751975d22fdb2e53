//! Moving-average support detection.
//!
//! A [`RuleSet`] loaded from the strategy file drives a [`BarEvaluator`],
//! which turns closed bars into volume [`common::Signal`]s. The
//! [`EventDispatcher`] feeds it from the kline broadcast and queues the
//! signals for a [`common::SignalSink`].

pub mod config;
pub mod dispatcher;
pub mod evaluator;
pub mod rules;
pub mod sink;
pub mod store;

pub use config::StrategyFileConfig;
pub use dispatcher::EventDispatcher;
pub use evaluator::BarEvaluator;
pub use rules::RuleSet;
pub use sink::{spawn_delivery, FanoutSink, LogSink};
pub use store::{IndicatorReading, IndicatorStore};
