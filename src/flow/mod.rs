//! Onboarding flow state machines
//!
//! A flow walks its variant's [`FlowDefinition`] stage by stage. The first
//! failing stage ends the flow; everything after it is never attempted, so
//! a [`FlowResult`] is always a run of passed steps followed by at most one
//! failure.

pub mod definition;
pub mod diagnostics;
pub mod executor;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::common::{Config, Error};
use crate::driver::{DriverError, UiDriver};

pub use definition::{ErrorSurface, FlowDefinition, FlowParams, Stage, Step};
pub use diagnostics::capture_diagnostics;
pub use executor::run_step;

/// Onboarding variant under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowVariant {
    /// Unguided setup (`UGS`)
    Unguided,
    /// Barcode-code setup (`BCS`)
    Barcode,
    /// Zero-touch discovery (`ZTS`)
    Discovery,
    /// Standards-based commissioning (`Matter`)
    Commissioning,
}

impl FlowVariant {
    /// Mode name used on the command line and in logs
    pub fn mode(&self) -> &'static str {
        match self {
            FlowVariant::Unguided => "UGS",
            FlowVariant::Barcode => "BCS",
            FlowVariant::Discovery => "ZTS",
            FlowVariant::Commissioning => "Matter",
        }
    }

    pub fn all() -> [FlowVariant; 4] {
        [
            FlowVariant::Unguided,
            FlowVariant::Barcode,
            FlowVariant::Discovery,
            FlowVariant::Commissioning,
        ]
    }
}

impl fmt::Display for FlowVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode())
    }
}

impl FromStr for FlowVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlowVariant::all()
            .into_iter()
            .find(|v| v.mode().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidMode(s.to_string()))
    }
}

/// Named states of the onboarding chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowState {
    AppRestarted,
    AddDeviceMenuOpen,
    AddDeviceLandingOpen,
    DeviceTypeSelected,
    BrandOrMethodConfirmed,
    PoweredOnConfirmed,
    PairingCodeDeclined,
    ScanPromptShown,
    SearchIssued,
    DeviceListOpen,
    LogoConfirmed,
    NumericCodeChosen,
    CodeEntered,
    StillLooking,
    ClaimedByOtherAssistant,
    DeviceDiscovered,
    DeviceConnecting,
    NetworkSelected,
    NetworkJoining,
    ReadinessPreparing,
    Completed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a stage failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Expected UI condition not observed within budget
    Timeout {
        expectation: &'static str,
        locator: String,
        timeout: Duration,
    },
    /// The driver raised a fault while performing the step
    Driver(DriverError),
    /// The device is already set up with another assistant
    ClaimedElsewhere,
    /// Device list polling ran out of budget
    DeviceNotFound { name: String, budget: Duration },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Timeout {
                expectation,
                locator,
                timeout,
            } => write!(
                f,
                "{locator} did not {expectation} within {}s",
                timeout.as_secs()
            ),
            FailureReason::Driver(e) => write!(f, "{e}"),
            FailureReason::ClaimedElsewhere => {
                f.write_str("device is already set up with another assistant")
            }
            FailureReason::DeviceNotFound { name, budget } => {
                write!(f, "device '{name}' not found within {}s", budget.as_secs())
            }
        }
    }
}

/// A failed stage and the state it was trying to reach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub state: FlowState,
    pub reason: FailureReason,
}

impl StepFailure {
    pub fn new(state: FlowState, reason: FailureReason) -> Self {
        Self { state, reason }
    }
}

/// Outcome of one executed stage; `Ok(())` is success
pub type StepResult = std::result::Result<(), StepFailure>;

/// Recorded outcome of one attempted step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub state: FlowState,
    pub passed: bool,
}

/// Result of one flow run
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub variant: FlowVariant,
    pub outcomes: Vec<StepOutcome>,
    pub success: bool,
    pub failure: Option<StepFailure>,
    pub diagnostics: Option<String>,
}

impl FlowResult {
    /// Last state reached: `Completed`, or the state that failed
    pub fn terminal_state(&self) -> Option<FlowState> {
        match &self.failure {
            Some(failure) => Some(failure.state),
            None => self.outcomes.last().map(|o| o.state),
        }
    }

    /// Short human-readable outcome, e.g. `Completed` or
    /// `Failed-at-DeviceDiscovered: ...`
    pub fn summary(&self) -> String {
        match &self.failure {
            Some(failure) => format!("Failed-at-{}: {}", failure.state, failure.reason),
            None => "Completed".to_string(),
        }
    }
}

/// Run `definition` against the driver and classify the outcome
pub async fn run_flow(
    driver: &mut dyn UiDriver,
    definition: &FlowDefinition,
    config: &Config,
) -> FlowResult {
    let variant = definition.variant;
    tracing::info!("Starting {variant} test...");

    let mut outcomes = Vec::with_capacity(definition.stages.len());

    for stage in &definition.stages {
        let result = match stage {
            Stage::Step(step) => executor::run_step(driver, step, config).await,
            Stage::Discover(discover) => {
                executor::run_discover(driver, discover, &mut outcomes).await
            }
            Stage::PollForDevice(poll) => executor::run_poll(driver, poll).await,
        };

        match result {
            Ok(()) => outcomes.push(StepOutcome {
                state: stage.state(),
                passed: true,
            }),
            Err(failure) => {
                outcomes.push(StepOutcome {
                    state: failure.state,
                    passed: false,
                });
                tracing::error!(
                    state = %failure.state,
                    "{variant} failed: {}",
                    failure.reason
                );

                let diagnostics = match &definition.error_surface {
                    ErrorSurface::Element(surface) => capture_diagnostics(driver, surface).await,
                    ErrorSurface::None => None,
                };

                return FlowResult {
                    variant,
                    outcomes,
                    success: false,
                    failure: Some(failure),
                    diagnostics,
                };
            }
        }
    }

    tracing::info!("{variant} is successful!");
    FlowResult {
        variant,
        outcomes,
        success: true,
        failure: None,
        diagnostics: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("UGS".parse::<FlowVariant>().unwrap(), FlowVariant::Unguided);
        assert_eq!("BCS".parse::<FlowVariant>().unwrap(), FlowVariant::Barcode);
        assert_eq!("ZTS".parse::<FlowVariant>().unwrap(), FlowVariant::Discovery);
        assert_eq!(
            "Matter".parse::<FlowVariant>().unwrap(),
            FlowVariant::Commissioning
        );
        assert_eq!(
            "matter".parse::<FlowVariant>().unwrap(),
            FlowVariant::Commissioning
        );
    }

    #[test]
    fn test_parse_invalid_mode() {
        let err = "FOO".parse::<FlowVariant>().unwrap_err();
        assert!(matches!(err, Error::InvalidMode(ref m) if m == "FOO"));
        assert!(err.is_config());
    }

    #[test]
    fn test_failure_reason_display() {
        let reason = FailureReason::DeviceNotFound {
            name: "First light".to_string(),
            budget: Duration::from_secs(60),
        };
        assert_eq!(reason.to_string(), "device 'First light' not found within 60s");

        let result = FlowResult {
            variant: FlowVariant::Discovery,
            outcomes: vec![StepOutcome {
                state: FlowState::DeviceDiscovered,
                passed: false,
            }],
            success: false,
            failure: Some(StepFailure::new(FlowState::DeviceDiscovered, reason)),
            diagnostics: None,
        };
        assert_eq!(result.terminal_state(), Some(FlowState::DeviceDiscovered));
        assert!(result.summary().starts_with("Failed-at-DeviceDiscovered"));
    }
}
