//! Constants, configuration and error types (always included).

mod config;
mod constants;
mod error;

pub use config::*;
pub use constants::*;
pub use error::*;
