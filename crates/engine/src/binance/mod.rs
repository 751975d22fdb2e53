pub mod stream;

pub use stream::{parse_kline_event, KlineStream};
