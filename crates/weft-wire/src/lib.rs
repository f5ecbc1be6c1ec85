pub mod client;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod proto;
pub mod server;
pub mod status;

pub use client::*;
pub use error::*;
pub use frame::*;
pub use metadata::*;
pub use server::*;
pub use status::*;
