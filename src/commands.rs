//! CLI argument definitions
//!
//! Flag names keep the underscore spelling used by the existing lab
//! scripts (`--wifi_ssid`, `--test_count`, ...).

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Test mode. Valid values are: UGS, BCS, ZTS and Matter
    #[arg(long, default_value = "UGS")]
    pub mode: String,

    /// Serial number of the Android phone
    #[arg(long)]
    pub serial: Option<String>,

    /// SSID of the saved network the device should join (UGS)
    #[arg(long = "wifi_ssid")]
    pub wifi_ssid: Option<String>,

    /// Name of the device in the companion app
    #[arg(long = "device_name")]
    pub device_name: Option<String>,

    /// Number of test iterations to run
    #[arg(long = "test_count")]
    pub test_count: Option<u32>,

    /// 11-digit numeric setup code (Matter)
    #[arg(long = "pairing_code_11d")]
    pub pairing_code: Option<String>,

    /// Configuration file (default: platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the run log (default: current directory)
    #[arg(long = "log-dir")]
    pub log_dir: Option<PathBuf>,

    /// Run against a YAML screen script instead of a phone
    #[arg(long, value_name = "SCRIPT")]
    pub simulate: Option<PathBuf>,
}
