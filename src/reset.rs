//! Post-test cleanup
//!
//! Removes the freshly paired device from the companion app so the next
//! iteration starts from a clean device list. Cleanup is best effort: any
//! failure is logged and reported as `false`, never raised.

use crate::common::{Config, Settle};
use crate::driver::{Direction, DriverError, Locator, UiDriver};
use crate::flow::definition::reset_ids;

#[derive(Debug)]
enum ResetFailure {
    NotListed,
    Timeout(&'static str),
    Driver(DriverError),
}

impl From<DriverError> for ResetFailure {
    fn from(e: DriverError) -> Self {
        ResetFailure::Driver(e)
    }
}

/// Delete `device_name` from the companion app
///
/// Returns `false` when the device is not listed (nothing is touched in
/// that case) or when any step of the delete sequence fails.
pub async fn reset_device(driver: &mut dyn UiDriver, device_name: &str, config: &Config) -> bool {
    tracing::info!("Removing device '{device_name}' from the app");
    match try_reset(driver, device_name, config).await {
        Ok(()) => {
            tracing::info!("Device '{device_name}' is removed!");
            true
        }
        Err(ResetFailure::NotListed) => {
            tracing::warn!("Device '{device_name}' is not in the device list");
            false
        }
        Err(ResetFailure::Timeout(page)) => {
            tracing::error!("Cleanup of '{device_name}' failed: {page} did not load");
            false
        }
        Err(ResetFailure::Driver(e)) => {
            tracing::error!("Cleanup of '{device_name}' failed: {e}");
            false
        }
    }
}

async fn try_reset(
    driver: &mut dyn UiDriver,
    device_name: &str,
    config: &Config,
) -> Result<(), ResetFailure> {
    let settle = &config.settle;
    let timeouts = &config.timeouts;

    driver.restart_app(&config.defaults.app_package).await?;
    settle.wait(Settle::AppRestart).await;

    tracing::info!("Switching to device page...");
    let devices_tab = Locator::id(reset_ids::DEVICES_TAB);
    if !driver.wait_for_appear(&devices_tab, timeouts.step()).await? {
        return Err(ResetFailure::Timeout("home page"));
    }
    driver.click(&devices_tab).await?;
    settle.wait(Settle::Navigation).await;

    for _ in 0..config.reset.refresh_swipes {
        driver.swipe(Direction::Down).await?;
        settle.wait(Settle::ListRefresh).await;
    }

    tracing::info!("Locating the device '{device_name}' ...");
    let entry = Locator::id(reset_ids::TEXT).with_text(device_name);
    match driver.scroll_to(device_name).await {
        Ok(()) => {}
        Err(DriverError::ElementNotFound(_)) => return Err(ResetFailure::NotListed),
        Err(e) => return Err(e.into()),
    }
    if !driver.exists(&entry).await? {
        return Err(ResetFailure::NotListed);
    }
    driver.click(&entry).await?;

    let settings = Locator::description(reset_ids::SETTINGS);
    if !driver
        .wait_for_appear(&settings, timeouts.settings_load())
        .await?
    {
        return Err(ResetFailure::Timeout("device page"));
    }
    tracing::info!("Opening settings of '{device_name}' ...");
    driver.click(&settings).await?;

    let delete = Locator::description(reset_ids::DELETE);
    if !driver.wait_for_appear(&delete, timeouts.step()).await? {
        return Err(ResetFailure::Timeout("settings page"));
    }
    driver.click(&delete).await?;

    let confirm = Locator::id(reset_ids::DIALOG_CONFIRM);
    if !driver.wait_for_appear(&confirm, timeouts.step()).await? {
        return Err(ResetFailure::Timeout("delete confirmation"));
    }
    tracing::info!("Confirming the deletion of '{device_name}' ...");
    driver.click(&confirm).await?;
    settle.wait(Settle::Navigation).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScreenScript, ScriptedDriver};
    use async_trait::async_trait;
    use crate::driver::DriverResult;

    const PHONE: &str = include_str!("../tests/fixtures/ugs.yaml");

    /// Scripted phone whose automation server drops `scrollTo` requests
    struct ScrollFault(ScriptedDriver);

    #[async_trait]
    impl UiDriver for ScrollFault {
        async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
            self.0.click(locator).await
        }
        async fn exists(&mut self, locator: &Locator) -> DriverResult<bool> {
            self.0.exists(locator).await
        }
        async fn get_text(&mut self, locator: &Locator) -> DriverResult<String> {
            self.0.get_text(locator).await
        }
        async fn scroll_to(&mut self, _: &str) -> DriverResult<()> {
            Err(DriverError::Transport("connection reset".to_string()))
        }
        async fn swipe(&mut self, direction: Direction) -> DriverResult<()> {
            self.0.swipe(direction).await
        }
        async fn clear_text(&mut self) -> DriverResult<()> {
            self.0.clear_text().await
        }
        async fn send_text(&mut self, text: &str) -> DriverResult<()> {
            self.0.send_text(text).await
        }
        async fn submit_text(&mut self) -> DriverResult<()> {
            self.0.submit_text().await
        }
        async fn restart_app(&mut self, package: &str) -> DriverResult<()> {
            self.0.restart_app(package).await
        }
    }

    fn phone() -> ScriptedDriver {
        ScriptedDriver::new(ScreenScript::from_yaml(PHONE).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlisted_device_is_not_listed() {
        let mut driver = phone();
        let failure = try_reset(&mut driver, "Kitchen plug", &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(failure, ResetFailure::NotListed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_fault_is_driver_failure() {
        let mut driver = ScrollFault(phone());
        let failure = try_reset(&mut driver, "First light", &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(
            failure,
            ResetFailure::Driver(DriverError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_slow_home_page() {
        let slow = PHONE.replace(
            r#"- resource_id: "com.amazon.dee.app:id/tab_channels_device_icon""#,
            r#"- { resource_id: "com.amazon.dee.app:id/tab_channels_device_icon", after_secs: 8 }"#,
        );
        let mut driver = ScriptedDriver::new(ScreenScript::from_yaml(&slow).unwrap());

        assert!(reset_device(&mut driver, "First light", &Config::default()).await);
        assert_eq!(driver.screen_name(), "devices_empty");
    }
}
