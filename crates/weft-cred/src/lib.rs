pub mod claims;
pub mod delegation;
pub mod error;
pub mod key;
pub mod token;

pub use claims::*;
pub use delegation::*;
pub use error::*;
pub use key::*;
pub use token::*;
