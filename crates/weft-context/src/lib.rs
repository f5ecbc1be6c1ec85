pub mod error;
pub mod multimodal;
pub mod rpc;
pub mod service;
pub mod store;
pub mod telemetry_hub;
pub mod tools;

pub use error::*;
pub use multimodal::*;
pub use service::*;
pub use store::*;
pub use telemetry_hub::*;
