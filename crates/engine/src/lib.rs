pub mod binance;
pub mod ingest;
pub mod lifecycle;

pub use binance::KlineStream;
pub use ingest::ingest_readings;
pub use lifecycle::{Engine, EngineHandle};
