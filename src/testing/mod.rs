//! Test harness and scripted driver
//!
//! [`Harness`] repeats an onboarding flow against fresh driver sessions and
//! tallies outcomes. [`ScriptedDriver`] replays YAML screen scripts so the
//! whole stack can run without a phone.

mod harness;
mod scripted;

pub use harness::{Harness, IterationFailure, RunTally};
pub use scripted::{
    CallJournal, DriverCall, Element, Screen, ScreenScript, ScriptedConnector, ScriptedDriver,
    Transition,
};
