pub mod breaker;
pub mod cache;
pub mod telemetry;

pub use breaker::*;
pub use cache::*;
pub use telemetry::*;
