pub mod config;
pub mod error;
pub mod indicator;
pub mod sink;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use indicator::IndicatorLookup;
pub use sink::SignalSink;
pub use types::*;
