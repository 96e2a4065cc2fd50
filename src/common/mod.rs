//! Common utilities shared by the runner, flows and drivers

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::{Config, Settle};
pub use error::{Error, Result};
