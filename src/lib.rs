//! Onboarding E2E - automated runs of a companion app's device onboarding
//!
//! This library drives the "add new device" flows (unguided, barcode,
//! zero-touch and Matter commissioning) through a UI driver, classifies
//! failures, and cleans up after successful runs.

pub mod cli;
pub mod commands;
pub mod common;
pub mod driver;
pub mod flow;
pub mod reset;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Config, Error, Result};
pub use driver::{DriverConnector, Locator, UiDriver};
pub use flow::{FlowResult, FlowState, FlowVariant};
pub use testing::RunTally;
