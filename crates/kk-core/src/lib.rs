pub mod error;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{KeeperError, Result};
