//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Values used when the matching CLI flag is absent
    #[serde(default)]
    pub defaults: Defaults,

    /// Step timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Fixed pauses absorbing UI animation latency
    #[serde(default)]
    pub settle: SettleDelays,

    /// Cleanup flow settings
    #[serde(default)]
    pub reset: ResetConfig,

    /// UI driver transport settings
    #[serde(default)]
    pub driver: DriverConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default run parameters
#[derive(Debug, Deserialize, Clone)]
pub struct Defaults {
    /// Serial of the phone running the companion app
    #[serde(default)]
    pub serial: Option<String>,

    /// Saved network selected during unguided setup
    #[serde(default)]
    pub wifi_ssid: Option<String>,

    /// Name the device is given in the companion app
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Number of iterations to run
    #[serde(default = "default_test_count")]
    pub test_count: u32,

    /// Android package of the companion app
    #[serde(default = "default_app_package")]
    pub app_package: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            serial: None,
            wifi_ssid: None,
            device_name: default_device_name(),
            test_count: default_test_count(),
            app_package: default_app_package(),
        }
    }
}

fn default_device_name() -> String {
    "First light".to_string()
}
fn default_test_count() -> u32 {
    30
}
fn default_app_package() -> String {
    "com.amazon.dee.app".to_string()
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Page transition after a click
    #[serde(default = "default_step")]
    pub step_secs: u64,

    /// Each of the found / connecting / network-join waits
    #[serde(default = "default_long_poll")]
    pub long_poll_secs: u64,

    /// Final "new device found" page
    #[serde(default = "default_completion")]
    pub completion_secs: u64,

    /// Commissioning found-state wait
    #[serde(default = "default_found")]
    pub found_secs: u64,

    /// Extended wait while the "still looking" prompt is shown
    #[serde(default = "default_still_looking")]
    pub still_looking_secs: u64,

    /// Discovery variant device list polling budget
    #[serde(default = "default_discovery_poll")]
    pub discovery_poll_secs: u64,

    /// Interval between device list refreshes while polling
    #[serde(default = "default_discovery_refresh")]
    pub discovery_refresh_secs: u64,

    /// Device page load during cleanup
    #[serde(default = "default_settings_load")]
    pub settings_load_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step_secs: default_step(),
            long_poll_secs: default_long_poll(),
            completion_secs: default_completion(),
            found_secs: default_found(),
            still_looking_secs: default_still_looking(),
            discovery_poll_secs: default_discovery_poll(),
            discovery_refresh_secs: default_discovery_refresh(),
            settings_load_secs: default_settings_load(),
        }
    }
}

fn default_step() -> u64 {
    10
}
fn default_long_poll() -> u64 {
    150
}
fn default_completion() -> u64 {
    60
}
fn default_found() -> u64 {
    30
}
fn default_still_looking() -> u64 {
    30
}
fn default_discovery_poll() -> u64 {
    60
}
fn default_discovery_refresh() -> u64 {
    2
}
fn default_settings_load() -> u64 {
    60
}

impl Timeouts {
    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn long_poll(&self) -> Duration {
        Duration::from_secs(self.long_poll_secs)
    }

    pub fn completion(&self) -> Duration {
        Duration::from_secs(self.completion_secs)
    }

    pub fn found(&self) -> Duration {
        Duration::from_secs(self.found_secs)
    }

    pub fn still_looking(&self) -> Duration {
        Duration::from_secs(self.still_looking_secs)
    }

    pub fn discovery_poll(&self) -> Duration {
        Duration::from_secs(self.discovery_poll_secs)
    }

    pub fn discovery_refresh(&self) -> Duration {
        Duration::from_secs(self.discovery_refresh_secs)
    }

    pub fn settings_load(&self) -> Duration {
        Duration::from_secs(self.settings_load_secs)
    }
}

/// Kind of transition a settle delay follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    /// After the companion app has been restarted
    AppRestart,
    /// After moving between pages
    Navigation,
    /// After a pull-to-refresh on a list
    ListRefresh,
    /// Between a successful flow and the cleanup flow
    PostSuccess,
}

/// Settle delays in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct SettleDelays {
    #[serde(default = "default_app_restart")]
    pub app_restart_secs: u64,

    #[serde(default = "default_navigation")]
    pub navigation_secs: u64,

    #[serde(default = "default_list_refresh")]
    pub list_refresh_secs: u64,

    #[serde(default = "default_post_success")]
    pub post_success_secs: u64,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            app_restart_secs: default_app_restart(),
            navigation_secs: default_navigation(),
            list_refresh_secs: default_list_refresh(),
            post_success_secs: default_post_success(),
        }
    }
}

fn default_app_restart() -> u64 {
    6
}
fn default_navigation() -> u64 {
    2
}
fn default_list_refresh() -> u64 {
    3
}
fn default_post_success() -> u64 {
    3
}

impl SettleDelays {
    /// Delay configured for a transition kind
    pub fn delay(&self, kind: Settle) -> Duration {
        let secs = match kind {
            Settle::AppRestart => self.app_restart_secs,
            Settle::Navigation => self.navigation_secs,
            Settle::ListRefresh => self.list_refresh_secs,
            Settle::PostSuccess => self.post_success_secs,
        };
        Duration::from_secs(secs)
    }

    /// Sleep for the delay configured for `kind`
    pub async fn wait(&self, kind: Settle) {
        let delay = self.delay(kind);
        if !delay.is_zero() {
            tracing::debug!(?kind, secs = delay.as_secs(), "Settling");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Cleanup flow settings
#[derive(Debug, Deserialize, Clone)]
pub struct ResetConfig {
    /// Pull-to-refresh gestures before looking for the device entry
    #[serde(default = "default_refresh_swipes")]
    pub refresh_swipes: u32,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            refresh_swipes: default_refresh_swipes(),
        }
    }
}

fn default_refresh_swipes() -> u32 {
    2
}

/// UI driver transport settings
#[derive(Debug, Deserialize, Clone)]
pub struct DriverConfig {
    /// Explicit adb executable; searched on PATH when unset
    #[serde(default)]
    pub adb_path: Option<PathBuf>,

    /// Local port forwarded to the on-device automation server
    #[serde(default = "default_rpc_port")]
    pub local_port: u16,

    /// Port the automation server listens on inside the phone
    #[serde(default = "default_rpc_port")]
    pub device_port: u16,

    /// Interval between condition checks while waiting
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            adb_path: None,
            local_port: default_rpc_port(),
            device_port: default_rpc_port(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_rpc_port() -> u16 {
    9008
}
fn default_poll_interval() -> u64 {
    500
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Log output settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory receiving `log_<timestamp>.txt`; current directory when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if no file exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(Error::Config(format!(
                        "Config file '{}' does not exist",
                        explicit.display()
                    )));
                }
                Some(explicit.to_path_buf())
            }
            None => config_path().filter(|p| p.exists()),
        };

        match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(&path).map_err(|e| Error::file_read(&path, &e))?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_field_budgets() {
        let config = Config::default();
        assert_eq!(config.timeouts.long_poll(), Duration::from_secs(150));
        assert_eq!(config.timeouts.completion(), Duration::from_secs(60));
        assert_eq!(config.timeouts.found(), Duration::from_secs(30));
        assert_eq!(config.settle.delay(Settle::AppRestart), Duration::from_secs(6));
        assert_eq!(config.defaults.app_package, "com.amazon.dee.app");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::parse(
            r#"
[defaults]
wifi_ssid = "lab-net"
test_count = 5

[settle]
navigation_secs = 0
"#,
        )
        .unwrap();

        assert_eq!(config.defaults.wifi_ssid.as_deref(), Some("lab-net"));
        assert_eq!(config.defaults.test_count, 5);
        assert_eq!(config.defaults.device_name, "First light");
        assert_eq!(config.settle.delay(Settle::Navigation), Duration::ZERO);
        assert_eq!(config.settle.list_refresh_secs, 3);
        assert_eq!(config.driver.local_port, 9008);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::parse("[timeouts]\nstep_secs = \"ten\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
        assert!(err.is_config());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[reset]\nrefresh_swipes = 4\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.reset.refresh_swipes, 4);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(Some(&missing)), Err(Error::Config(_))));
    }
}
