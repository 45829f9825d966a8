pub mod config;
pub mod error;
pub mod types;

pub use config::AutochainConfig;
pub use error::{AutochainError, Result};
pub use types::*;
