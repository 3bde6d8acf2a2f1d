//! Router Module
//!
//! Key pool, model fallback table, and the dispatcher that rotates over both.

pub mod dispatcher;
pub mod fallback;
pub mod key_pool;

pub use dispatcher::{DispatchLimits, Dispatcher};
pub use fallback::{FallbackTable, ModelFallbackChain};
pub use key_pool::{ApiKey, KeyPool, KeyPoolStats, KeyUsage};
