//! UI driver capability
//!
//! The orchestrator only talks to the phone through [`UiDriver`]. The
//! uiautomator-backed implementation lives in [`uiautomator`]; tests and
//! simulated runs use [`crate::testing::ScriptedDriver`].

pub mod adb;
pub mod uiautomator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub use adb::AdbConnector;
pub use uiautomator::Uiautomator2Driver;

/// Interval between condition checks in the default wait implementations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Result type for driver calls
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Faults raised by a UI driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Automation request '{method}' failed: {message}")]
    Rpc { method: String, message: String },

    #[error("Automation server unreachable: {0}")]
    Transport(String),

    #[error("Unexpected automation response: {0}")]
    Protocol(String),

    #[error("adb {command} failed: {message}")]
    Adb { command: String, message: String },
}

impl DriverError {
    pub fn element_not_found(locator: &Locator) -> Self {
        Self::ElementNotFound(locator.to_string())
    }

    pub fn rpc(method: &str, message: impl Into<String>) -> Self {
        Self::Rpc {
            method: method.to_string(),
            message: message.into(),
        }
    }

    pub fn adb(command: &str, message: impl Into<String>) -> Self {
        Self::Adb {
            command: command.to_string(),
            message: message.into(),
        }
    }
}

/// Identifies a UI element by resource id, text and/or content description
///
/// All populated fields must match. `text` is an exact match and
/// `text_prefix` a starts-with match; screens that append runtime values
/// (network names, device names) to a fixed sentence use the latter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Locator {
    /// Element with the given resource id
    pub fn id(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
            ..Self::default()
        }
    }

    /// Element whose text equals `text`
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Element with the given content description
    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_text_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.text_prefix = Some(prefix.into());
        self
    }

    /// Whether an element with these attributes satisfies the locator
    pub fn matches(
        &self,
        resource_id: Option<&str>,
        text: Option<&str>,
        description: Option<&str>,
    ) -> bool {
        fn field(want: &Option<String>, have: Option<&str>) -> bool {
            want.as_deref().map_or(true, |w| have == Some(w))
        }

        let prefix_ok = self
            .text_prefix
            .as_deref()
            .map_or(true, |p| text.is_some_and(|t| t.starts_with(p)));

        field(&self.resource_id, resource_id)
            && field(&self.text, text)
            && field(&self.description, description)
            && prefix_ok
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = &self.resource_id {
            parts.push(format!("resourceId={id}"));
        }
        if let Some(text) = &self.text {
            parts.push(format!("text={text:?}"));
        }
        if let Some(prefix) = &self.text_prefix {
            parts.push(format!("textStartsWith={prefix:?}"));
        }
        if let Some(desc) = &self.description {
            parts.push(format!("description={desc:?}"));
        }
        if parts.is_empty() {
            f.write_str("<any>")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Direction of a swipe gesture, named after the finger movement
///
/// `Down` on a list is a pull-to-refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Capability to drive the companion app's UI
///
/// Calls are sequential; a driver is exclusively borrowed by one flow at a
/// time. Waits return `Ok(false)` on timeout and reserve `Err` for driver
/// faults.
#[async_trait]
pub trait UiDriver: Send {
    /// Click the first element matching `locator`
    async fn click(&mut self, locator: &Locator) -> DriverResult<()>;

    /// Click the element matching `locator` whose text equals `text`
    async fn click_with_text(&mut self, locator: &Locator, text: &str) -> DriverResult<()> {
        let target = locator.clone().with_text(text);
        self.click(&target).await
    }

    /// Whether an element matching `locator` is currently on screen
    async fn exists(&mut self, locator: &Locator) -> DriverResult<bool>;

    /// Text of the first element matching `locator`
    async fn get_text(&mut self, locator: &Locator) -> DriverResult<String>;

    /// Interval used by the default wait implementations
    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Wait up to `timeout` for `locator` to be present
    async fn wait_for_appear(&mut self, locator: &Locator, timeout: Duration) -> DriverResult<bool> {
        self.wait_for_presence(locator, timeout, true).await
    }

    /// Wait up to `timeout` for `locator` to be gone
    async fn wait_for_disappear(
        &mut self,
        locator: &Locator,
        timeout: Duration,
    ) -> DriverResult<bool> {
        self.wait_for_presence(locator, timeout, false).await
    }

    /// Poll `exists` until it equals `present` or `timeout` elapses
    ///
    /// The condition is checked once more at the deadline, so a condition
    /// that becomes true just before the deadline is still observed, and a
    /// timeout is never reported before the full budget has elapsed.
    async fn wait_for_presence(
        &mut self,
        locator: &Locator,
        timeout: Duration,
        present: bool,
    ) -> DriverResult<bool> {
        let deadline = Instant::now() + timeout;
        let interval = self.poll_interval();
        loop {
            if self.exists(locator).await? == present {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep((deadline - now).min(interval)).await;
        }
    }

    /// Scroll the scrollable container until `text` is visible
    async fn scroll_to(&mut self, text: &str) -> DriverResult<()>;

    async fn swipe(&mut self, direction: Direction) -> DriverResult<()>;

    /// Clear the focused text field
    async fn clear_text(&mut self) -> DriverResult<()>;

    /// Type into the focused text field
    async fn send_text(&mut self, text: &str) -> DriverResult<()>;

    /// Submit the focused text field (IME action / enter)
    async fn submit_text(&mut self) -> DriverResult<()>;

    /// Stop and relaunch the app identified by `package`
    async fn restart_app(&mut self, package: &str) -> DriverResult<()>;
}

/// Opens a fresh driver session for each test iteration
#[async_trait]
pub trait DriverConnector: Send {
    async fn connect(&mut self) -> DriverResult<Box<dyn UiDriver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_exact_text_match() {
        let loc = Locator::id("mosaic.base_text").with_text("Yes");
        assert!(loc.matches(Some("mosaic.base_text"), Some("Yes"), None));
        assert!(!loc.matches(Some("mosaic.base_text"), Some("Yes please"), None));
        assert!(!loc.matches(Some("other"), Some("Yes"), None));
    }

    #[test]
    fn test_locator_prefix_match() {
        let loc = Locator::id("mosaic.base_text").with_text_prefix("Connecting your");
        assert!(loc.matches(
            Some("mosaic.base_text"),
            Some("Connecting your ACK development device to lab-net"),
            None
        ));
        assert!(!loc.matches(Some("mosaic.base_text"), None, None));
    }

    #[test]
    fn test_locator_display() {
        let loc = Locator::id("UGS_ErrorPage");
        assert_eq!(loc.to_string(), "resourceId=UGS_ErrorPage");
        let loc = Locator::description("Settings");
        assert_eq!(loc.to_string(), "description=\"Settings\"");
        assert_eq!(Locator::default().to_string(), "<any>");
    }
}
