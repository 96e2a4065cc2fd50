//! Step execution
//!
//! Executors perform one stage and convert every driver fault into a
//! [`StepFailure`]. None of them retry; the only repeat behavior is the
//! bounded "still looking" extension and device list polling, both of which
//! are part of their stage definition.

use std::time::Duration;
use tokio::time::Instant;

use super::definition::{Action, DiscoverStage, Expect, Gesture, PollStage, Step};
use super::{FailureReason, FlowState, StepFailure, StepOutcome, StepResult};
use crate::common::Config;
use crate::driver::{Direction, DriverError, Locator, UiDriver};

/// Perform a step's action and wait for its post-condition
///
/// A click first waits up to the configured step timeout for its target,
/// so a slowly rendering page does not fail the step.
pub async fn run_step(driver: &mut dyn UiDriver, step: &Step, config: &Config) -> StepResult {
    if let Some(kind) = step.settle {
        config.settle.wait(kind).await;
    }

    let action = describe_action(&step.action);
    match &step.expect {
        Some(expect) => tracing::info!(
            state = %step.state,
            locator = %expect.locator(),
            expect = expect.describe(),
            timeout_secs = step.timeout.as_secs(),
            "{action}"
        ),
        None => tracing::info!(state = %step.state, "{action}"),
    }

    let fault = |e: DriverError| {
        tracing::error!(state = %step.state, "{action} failed: {e}");
        StepFailure::new(step.state, FailureReason::Driver(e))
    };

    perform(driver, &step.action, config.timeouts.step())
        .await
        .map_err(fault)?;

    let Some(expect) = &step.expect else {
        return Ok(());
    };

    let observed = match expect {
        Expect::Appear(locator) => driver.wait_for_appear(locator, step.timeout).await,
        Expect::Disappear(locator) => driver.wait_for_disappear(locator, step.timeout).await,
    }
    .map_err(fault)?;

    if observed {
        Ok(())
    } else {
        tracing::error!(state = %step.state, "Failed to get the expected page");
        Err(StepFailure::new(
            step.state,
            FailureReason::Timeout {
                expectation: expect.describe(),
                locator: expect.locator().to_string(),
                timeout: step.timeout,
            },
        ))
    }
}

async fn perform(
    driver: &mut dyn UiDriver,
    action: &Action,
    click_timeout: Duration,
) -> Result<(), DriverError> {
    match action {
        Action::Click(locator) => {
            if !driver.wait_for_appear(locator, click_timeout).await? {
                return Err(DriverError::element_not_found(locator));
            }
            match &locator.text {
                Some(text) => {
                    let base = Locator {
                        text: None,
                        ..locator.clone()
                    };
                    driver.click_with_text(&base, text).await
                }
                None => driver.click(locator).await,
            }
        }
        Action::Wait => Ok(()),
        Action::Gesture(Gesture::RestartApp(package)) => driver.restart_app(package).await,
        Action::Gesture(Gesture::ScrollTo(text)) => driver.scroll_to(text).await,
        Action::Gesture(Gesture::Swipe(direction)) => driver.swipe(*direction).await,
        Action::Gesture(Gesture::EnterText(text)) => {
            driver.clear_text().await?;
            driver.send_text(text).await?;
            driver.submit_text().await
        }
    }
}

fn describe_action(action: &Action) -> String {
    match action {
        Action::Click(locator) => format!("Clicking {locator}"),
        Action::Wait => "Waiting".to_string(),
        Action::Gesture(Gesture::RestartApp(package)) => format!("Restarting {package}"),
        Action::Gesture(Gesture::ScrollTo(text)) => format!("Scrolling to {text:?}"),
        Action::Gesture(Gesture::Swipe(direction)) => format!("Swiping {direction:?}"),
        Action::Gesture(Gesture::EnterText(text)) => {
            format!("Entering {} characters", text.chars().count())
        }
    }
}

/// Screen that follows a finished search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchOutcome {
    StillLooking,
    DeadEnd,
    Connecting,
}

/// Wait for the device to be found, allowing one "still looking" extension
///
/// Once the search text goes away the stage waits up to `resolve_timeout`
/// for the next screen and classifies the outcome from it: the connecting
/// screen passes, the dead-end screen fails at `ClaimedByOtherAssistant`.
/// A passed `StillLooking` outcome is appended to `outcomes` when the
/// extension is used and resolves.
pub async fn run_discover(
    driver: &mut dyn UiDriver,
    stage: &DiscoverStage,
    outcomes: &mut Vec<StepOutcome>,
) -> StepResult {
    let at = |state: FlowState| {
        move |e: DriverError| {
            tracing::error!(state = %state, "Driver fault while looking for the device: {e}");
            StepFailure::new(state, FailureReason::Driver(e))
        }
    };

    tracing::info!(
        locator = %stage.searching,
        timeout_secs = stage.timeout.as_secs(),
        "Looking for the device ..."
    );
    let searching_gone = driver
        .wait_for_disappear(&stage.searching, stage.timeout)
        .await
        .map_err(at(FlowState::DeviceDiscovered))?;

    if !searching_gone
        && !driver
            .exists(&stage.still_looking)
            .await
            .map_err(at(FlowState::DeviceDiscovered))?
    {
        tracing::error!("Unable to find the device.");
        return Err(StepFailure::new(
            FlowState::DeviceDiscovered,
            FailureReason::Timeout {
                expectation: "disappear",
                locator: stage.searching.to_string(),
                timeout: stage.timeout,
            },
        ));
    }

    let mut next = wait_for_first(
        driver,
        &[
            (SearchOutcome::StillLooking, &stage.still_looking),
            (SearchOutcome::DeadEnd, &stage.dead_end),
            (SearchOutcome::Connecting, &stage.connecting),
        ],
        stage.resolve_timeout,
    )
    .await
    .map_err(at(FlowState::DeviceDiscovered))?;

    if next == Some(SearchOutcome::StillLooking) {
        tracing::warn!(
            timeout_secs = stage.retry_timeout.as_secs(),
            "Device is still being looked for, extending the wait once"
        );
        let resolved = driver
            .wait_for_disappear(&stage.still_looking, stage.retry_timeout)
            .await
            .map_err(at(FlowState::StillLooking))?;

        if !resolved {
            tracing::error!("Unable to find the device after the extended wait.");
            return Err(StepFailure::new(
                FlowState::StillLooking,
                FailureReason::Timeout {
                    expectation: "disappear",
                    locator: stage.still_looking.to_string(),
                    timeout: stage.retry_timeout,
                },
            ));
        }
        outcomes.push(StepOutcome {
            state: FlowState::StillLooking,
            passed: true,
        });

        next = wait_for_first(
            driver,
            &[
                (SearchOutcome::DeadEnd, &stage.dead_end),
                (SearchOutcome::Connecting, &stage.connecting),
            ],
            stage.resolve_timeout,
        )
        .await
        .map_err(at(FlowState::DeviceDiscovered))?;
    }

    match next {
        Some(SearchOutcome::Connecting) => Ok(()),
        Some(SearchOutcome::DeadEnd) => {
            tracing::error!("Device is already set up with another assistant.");
            Err(StepFailure::new(
                FlowState::ClaimedByOtherAssistant,
                FailureReason::ClaimedElsewhere,
            ))
        }
        Some(SearchOutcome::StillLooking) | None => {
            tracing::error!("Search finished but no known screen followed.");
            Err(StepFailure::new(
                FlowState::DeviceDiscovered,
                FailureReason::Timeout {
                    expectation: "appear",
                    locator: stage.connecting.to_string(),
                    timeout: stage.resolve_timeout,
                },
            ))
        }
    }
}

/// Poll until one of `candidates` is on screen; the earliest listed wins a tie
///
/// Checks once more at the deadline, like the driver's own waits.
async fn wait_for_first<T: Copy>(
    driver: &mut dyn UiDriver,
    candidates: &[(T, &Locator)],
    timeout: Duration,
) -> Result<Option<T>, DriverError> {
    let deadline = Instant::now() + timeout;
    let interval = driver.poll_interval();
    loop {
        for (tag, locator) in candidates {
            if driver.exists(locator).await? {
                return Ok(Some(*tag));
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        tokio::time::sleep((deadline - now).min(interval)).await;
    }
}

/// Refresh the device list until the target shows up or the budget runs out
///
/// Driver faults during polling are logged and polling continues; only the
/// budget ends the stage.
pub async fn run_poll(driver: &mut dyn UiDriver, stage: &PollStage) -> StepResult {
    tracing::info!(
        device = %stage.device_name,
        budget_secs = stage.budget.as_secs(),
        interval_secs = stage.interval.as_secs(),
        "Polling the device list ..."
    );
    let deadline = Instant::now() + stage.budget;
    let mut refreshes = 0u32;

    loop {
        dismiss_overlay(driver, &stage.overlay_dismiss).await;

        match driver.exists(&stage.target).await {
            Ok(true) => {
                tracing::info!(refreshes, "Found device '{}'", stage.device_name);
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => tracing::warn!("Device list check failed: {e}"),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }

        if let Err(e) = driver.swipe(Direction::Down).await {
            tracing::warn!("Device list refresh failed: {e}");
        }
        refreshes += 1;
        tokio::time::sleep(stage.interval.min(deadline - now)).await;
    }

    tracing::error!(refreshes, "Device '{}' did not show up", stage.device_name);
    Err(StepFailure::new(
        FlowState::DeviceDiscovered,
        FailureReason::DeviceNotFound {
            name: stage.device_name.clone(),
            budget: stage.budget,
        },
    ))
}

/// Close a promotional overlay if one is showing
// TODO: decide whether an overlay that survives every dismiss attempt should fail the poll
async fn dismiss_overlay(driver: &mut dyn UiDriver, dismiss: &[Locator]) {
    for locator in dismiss {
        if let Ok(true) = driver.exists(locator).await {
            match driver.click(locator).await {
                Ok(()) => tracing::info!(%locator, "Dismissed promotional overlay"),
                Err(e) => tracing::debug!(%locator, "Overlay dismiss failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Config;
    use crate::testing::{ScreenScript, ScriptedDriver};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Driver whose every call fails as if the automation server went away
    struct Unreachable {
        calls: u32,
    }

    #[async_trait]
    impl UiDriver for Unreachable {
        async fn click(&mut self, _: &Locator) -> Result<(), DriverError> {
            self.calls += 1;
            Err(DriverError::Transport("connection reset".to_string()))
        }
        async fn exists(&mut self, _: &Locator) -> Result<bool, DriverError> {
            self.calls += 1;
            Err(DriverError::Transport("connection reset".to_string()))
        }
        async fn get_text(&mut self, _: &Locator) -> Result<String, DriverError> {
            unreachable!()
        }
        async fn scroll_to(&mut self, _: &str) -> Result<(), DriverError> {
            unreachable!()
        }
        async fn swipe(&mut self, _: Direction) -> Result<(), DriverError> {
            self.calls += 1;
            Err(DriverError::Transport("connection reset".to_string()))
        }
        async fn clear_text(&mut self) -> Result<(), DriverError> {
            unreachable!()
        }
        async fn send_text(&mut self, _: &str) -> Result<(), DriverError> {
            unreachable!()
        }
        async fn submit_text(&mut self) -> Result<(), DriverError> {
            unreachable!()
        }
        async fn restart_app(&mut self, _: &str) -> Result<(), DriverError> {
            unreachable!()
        }
    }

    fn poll_stage() -> PollStage {
        PollStage {
            target: Locator::id("mosaic.text").with_text("First light"),
            device_name: "First light".to_string(),
            overlay_dismiss: vec![Locator::id("gd-cancel-icon")],
            budget: Duration::from_secs(10),
            interval: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_survives_driver_faults_until_budget() {
        let mut driver = Unreachable { calls: 0 };
        let start = Instant::now();

        let failure = run_poll(&mut driver, &poll_stage()).await.unwrap_err();

        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(failure.state, FlowState::DeviceDiscovered);
        assert!(matches!(failure.reason, FailureReason::DeviceNotFound { .. }));
        // overlay check, target check and refresh on each of 5 cycles, then a final check
        assert!(driver.calls >= 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_driver_fault_becomes_failure() {
        let mut driver = Unreachable { calls: 0 };
        let step = Step {
            state: FlowState::AddDeviceMenuOpen,
            action: Action::Click(Locator::id("com.amazon.dee.app:id/home_header_quick_add")),
            expect: Some(Expect::Appear(Locator::id("1-primary"))),
            timeout: Duration::from_secs(10),
            settle: None,
        };

        let failure = run_step(&mut driver, &step, &Config::default())
            .await
            .unwrap_err();

        assert_eq!(failure.state, FlowState::AddDeviceMenuOpen);
        assert!(matches!(failure.reason, FailureReason::Driver(_)));
        assert_eq!(driver.calls, 1);
    }

    fn discover_stage() -> DiscoverStage {
        DiscoverStage {
            searching: Locator::id("mosaic.base_text").with_text("Looking for your Matter device"),
            still_looking: Locator::id("mosaic.base_text").with_text("Still looking..."),
            dead_end: Locator::id("mosaic.base_text").with_text_prefix("This device is already"),
            connecting: Locator::id("mosaic.base_text")
                .with_text("Connecting to your Matter device"),
            timeout: Duration::from_secs(30),
            retry_timeout: Duration::from_secs(30),
            resolve_timeout: Duration::from_secs(10),
        }
    }

    fn scripted(yaml: &str) -> ScriptedDriver {
        ScriptedDriver::new(ScreenScript::from_yaml(yaml).unwrap())
    }

    fn click_step(target: Locator) -> Step {
        Step {
            state: FlowState::NetworkSelected,
            action: Action::Click(target),
            expect: None,
            timeout: Duration::ZERO,
            settle: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_waits_for_late_target() {
        let mut driver = scripted(
            r#"
start: wifi
screens:
  - name: wifi
    elements:
      - { resource_id: "Mosaic.radio_list_item-primary", text: "lab-net", after_secs: 3 }
"#,
        );
        let target = Locator::id("Mosaic.radio_list_item-primary").with_text("lab-net");
        let start = Instant::now();

        run_step(&mut driver, &click_step(target), &Config::default())
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_on_absent_target_fails_after_step_timeout() {
        let mut driver = scripted("start: empty\nscreens:\n  - name: empty\n");
        let start = Instant::now();

        let failure = run_step(&mut driver, &click_step(Locator::text("Next")), &Config::default())
            .await
            .unwrap_err();

        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(failure.state, FlowState::NetworkSelected);
        assert!(matches!(
            failure.reason,
            FailureReason::Driver(DriverError::ElementNotFound(_))
        ));
        // never clicked blindly
        assert!(driver.journal().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_end_after_transition_frame() {
        let mut driver = scripted(
            r#"
start: looking
screens:
  - name: looking
    elements:
      - { resource_id: "mosaic.base_text", text: "Looking for your Matter device" }
    transitions:
      - { after_secs: 5, to: blank }
  - name: blank
    transitions:
      - { after_secs: 1, to: claimed }
  - name: claimed
    elements:
      - { resource_id: "mosaic.base_text", text: "This device is already set up with another assistant." }
"#,
        );
        let mut outcomes = Vec::new();

        let failure = run_discover(&mut driver, &discover_stage(), &mut outcomes)
            .await
            .unwrap_err();

        assert_eq!(failure.state, FlowState::ClaimedByOtherAssistant);
        assert_eq!(failure.reason, FailureReason::ClaimedElsewhere);
        assert!(outcomes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_without_follow_up_screen_fails() {
        let mut driver = scripted(
            r#"
start: looking
screens:
  - name: looking
    elements:
      - { resource_id: "mosaic.base_text", text: "Looking for your Matter device" }
    transitions:
      - { after_secs: 5, to: blank }
  - name: blank
"#,
        );
        let start = Instant::now();

        let failure = run_discover(&mut driver, &discover_stage(), &mut Vec::new())
            .await
            .unwrap_err();

        assert!(start.elapsed() >= Duration::from_secs(15));
        assert_eq!(failure.state, FlowState::DeviceDiscovered);
        assert!(matches!(
            failure.reason,
            FailureReason::Timeout { expectation: "appear", .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_times_out_without_still_looking() {
        let mut driver = scripted(
            r#"
start: looking
screens:
  - name: looking
    elements:
      - { resource_id: "mosaic.base_text", text: "Looking for your Matter device" }
"#,
        );
        let mut outcomes = Vec::new();

        let failure = run_discover(&mut driver, &discover_stage(), &mut outcomes)
            .await
            .unwrap_err();

        assert_eq!(failure.state, FlowState::DeviceDiscovered);
        assert!(matches!(failure.reason, FailureReason::Timeout { .. }));
        assert!(outcomes.is_empty());
    }
}
