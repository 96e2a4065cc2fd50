//! adb invocation and device session bootstrap

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{DriverConnector, DriverError, DriverResult, UiDriver, Uiautomator2Driver};
use crate::common::config::DriverConfig;
use crate::common::{Error, Result};

/// Thin wrapper over the adb executable for one phone
#[derive(Debug, Clone)]
pub struct Adb {
    program: PathBuf,
    serial: Option<String>,
}

impl Adb {
    /// Locate adb from config or PATH
    pub fn locate(config: &DriverConfig, serial: Option<String>) -> Result<Self> {
        let program = match &config.adb_path {
            Some(path) if path.exists() => path.clone(),
            Some(path) => return Err(Error::AdbNotFound(path.display().to_string())),
            None => which::which("adb").map_err(|_| Error::AdbNotFound("PATH".to_string()))?,
        };
        Ok(Self { program, serial })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `adb [-s serial] <args>` and return stdout
    pub async fn run(&self, args: &[&str]) -> DriverResult<String> {
        let mut cmd = Command::new(&self.program);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        let command = args.first().copied().unwrap_or("adb");

        let output = cmd
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| DriverError::adb(command, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::adb(
                command,
                format!("exit {:?}: {}", output.status.code(), stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a shell command on the phone
    pub async fn shell(&self, args: &[&str]) -> DriverResult<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.run(&full).await
    }

    /// Forward a local TCP port to a port on the phone
    pub async fn forward(&self, local: u16, remote: u16) -> DriverResult<()> {
        self.run(&["forward", &format!("tcp:{local}"), &format!("tcp:{remote}")])
            .await
            .map(|_| ())
    }

    /// Force-stop then relaunch an app through its launcher intent
    pub async fn restart_app(&self, package: &str) -> DriverResult<()> {
        self.shell(&["am", "force-stop", package]).await?;
        self.shell(&[
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await
        .map(|_| ())
    }

    /// Type text into the focused field
    pub async fn input_text(&self, text: &str) -> DriverResult<()> {
        // `input text` treats spaces as argument separators
        let escaped = text.replace(' ', "%s");
        self.shell(&["input", "text", &escaped]).await.map(|_| ())
    }
}

/// Connects to the phone over USB through adb port forwarding
pub struct AdbConnector {
    adb: Adb,
    config: DriverConfig,
}

impl AdbConnector {
    pub fn new(config: &DriverConfig, serial: Option<String>) -> Result<Self> {
        Ok(Self {
            adb: Adb::locate(config, serial)?,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl DriverConnector for AdbConnector {
    async fn connect(&mut self) -> DriverResult<Box<dyn UiDriver>> {
        tracing::info!(adb = %self.adb.program().display(), "Connecting to phone...");
        self.adb
            .forward(self.config.local_port, self.config.device_port)
            .await?;

        let mut driver = Uiautomator2Driver::new(
            self.adb.clone(),
            self.config.local_port,
            self.config.poll_interval(),
        )?;
        let info = driver.device_info().await?;
        tracing::info!(%info, "Connected to phone");

        Ok(Box::new(driver))
    }
}
