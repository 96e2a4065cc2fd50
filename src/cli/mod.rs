//! Run orchestration for the command line
//!
//! Resolves CLI flags against the config file into a [`RunPlan`], picks a
//! driver connector and prints the final report. All configuration errors
//! surface here, before any phone is contacted.

use colored::Colorize;

use crate::commands::RunArgs;
use crate::common::{Config, Error, Result};
use crate::driver::{AdbConnector, DriverConnector};
use crate::flow::{FlowParams, FlowVariant};
use crate::testing::{Harness, IterationFailure, RunTally, ScreenScript, ScriptedConnector};

/// Length of the numeric setup code used by commissioning
const PAIRING_CODE_LEN: usize = 11;

/// Fully validated run parameters
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub variant: FlowVariant,
    pub iterations: u32,
    pub serial: Option<String>,
    pub params: FlowParams,
}

impl RunPlan {
    /// Merge CLI flags over config defaults and validate them
    pub fn resolve(args: &RunArgs, config: &Config) -> Result<Self> {
        let variant: FlowVariant = args.mode.parse()?;
        let defaults = &config.defaults;

        let wifi_ssid = args.wifi_ssid.clone().or_else(|| defaults.wifi_ssid.clone());
        if variant == FlowVariant::Unguided && wifi_ssid.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config(
                "UGS mode requires --wifi_ssid or defaults.wifi_ssid".to_string(),
            ));
        }

        let pairing_code = match (variant, &args.pairing_code) {
            (FlowVariant::Commissioning, None) => return Err(Error::MissingPairingCode),
            (_, Some(code)) => {
                validate_pairing_code(code)?;
                Some(code.clone())
            }
            (_, None) => None,
        };

        Ok(Self {
            variant,
            iterations: args.test_count.unwrap_or(defaults.test_count),
            serial: args.serial.clone().or_else(|| defaults.serial.clone()),
            params: FlowParams {
                wifi_ssid,
                device_name: args
                    .device_name
                    .clone()
                    .unwrap_or_else(|| defaults.device_name.clone()),
                pairing_code,
                app_package: defaults.app_package.clone(),
            },
        })
    }
}

fn validate_pairing_code(code: &str) -> Result<()> {
    if code.len() == PAIRING_CODE_LEN && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(Error::InvalidPairingCode(code.to_string()))
    }
}

/// Outcome of a complete run
#[derive(Debug)]
pub struct RunReport {
    pub variant: FlowVariant,
    pub iterations: u32,
    pub tally: RunTally,
    pub failures: Vec<IterationFailure>,
}

/// Resolve the plan and run it against a phone or a screen script
pub async fn run(args: RunArgs, config: Config) -> Result<RunReport> {
    let plan = RunPlan::resolve(&args, &config)?;

    match &args.simulate {
        Some(path) => {
            let script = ScreenScript::load(path)?;
            tracing::info!(script = %path.display(), "Running against a scripted phone");
            Ok(execute(&plan, ScriptedConnector::new(script), config).await)
        }
        None => {
            let connector = AdbConnector::new(&config.driver, plan.serial.clone())?;
            Ok(execute(&plan, connector, config).await)
        }
    }
}

/// Resolve `args` and run them with a caller-supplied connector
///
/// Nothing is connected when the arguments do not resolve.
pub async fn run_with<C: DriverConnector>(
    args: &RunArgs,
    config: Config,
    connector: C,
) -> Result<RunReport> {
    let plan = RunPlan::resolve(args, &config)?;
    Ok(execute(&plan, connector, config).await)
}

/// Run a resolved plan with the given connector
pub async fn execute<C: DriverConnector>(plan: &RunPlan, connector: C, config: Config) -> RunReport {
    let mut harness = Harness::new(connector, config);
    let tally = harness.run(plan.variant, plan.iterations, &plan.params).await;
    RunReport {
        variant: plan.variant,
        iterations: plan.iterations,
        tally,
        failures: harness.failures().to_vec(),
    }
}

/// Print the final summary to stdout
pub fn print_report(report: &RunReport) {
    let tally = &report.tally;
    println!(
        "\n{} {} ({} / {} executed)",
        "Summary:".blue().bold(),
        report.variant.to_string().white().bold(),
        tally.attempted,
        report.iterations
    );
    println!("  {} {} succeeded", "✓".green(), tally.succeeded);
    println!("  {} {} failed", "✗".red(), tally.failed);
    if tally.resets_failed > 0 {
        println!(
            "  {} {} of {} cleanups failed",
            "!".yellow(),
            tally.resets_failed,
            tally.resets_attempted
        );
    }

    for failure in &report.failures {
        println!(
            "  {} #{}: {}",
            "✗".red(),
            failure.iteration,
            failure.summary.dimmed()
        );
        if let Some(diag) = &failure.diagnostics {
            println!("      {}", diag.dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: &str) -> RunArgs {
        RunArgs {
            mode: mode.to_string(),
            wifi_ssid: Some("lab-net".to_string()),
            ..RunArgs::default()
        }
    }

    #[test]
    fn test_invalid_mode_is_fatal() {
        let err = RunPlan::resolve(&args("FOO"), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidMode(_)));
    }

    #[test]
    fn test_matter_requires_eleven_digits() {
        let config = Config::default();
        assert!(matches!(
            RunPlan::resolve(&args("Matter"), &config),
            Err(Error::MissingPairingCode)
        ));

        let mut bad = args("Matter");
        bad.pairing_code = Some("1234-567-890".to_string());
        assert!(matches!(
            RunPlan::resolve(&bad, &config),
            Err(Error::InvalidPairingCode(_))
        ));

        let mut good = args("Matter");
        good.pairing_code = Some("34970112332".to_string());
        let plan = RunPlan::resolve(&good, &config).unwrap();
        assert_eq!(plan.variant, FlowVariant::Commissioning);
        assert_eq!(plan.params.pairing_code.as_deref(), Some("34970112332"));
    }

    #[test]
    fn test_unguided_requires_ssid() {
        let mut no_ssid = args("UGS");
        no_ssid.wifi_ssid = None;
        assert!(matches!(
            RunPlan::resolve(&no_ssid, &Config::default()),
            Err(Error::Config(_))
        ));

        // Barcode setup carries credentials in the code
        let barcode = RunArgs {
            mode: "BCS".to_string(),
            ..RunArgs::default()
        };
        assert!(RunPlan::resolve(&barcode, &Config::default()).is_ok());
    }

    #[test]
    fn test_flags_override_config_defaults() {
        let config = Config::parse(
            r#"
[defaults]
serial = "4fe9718b"
device_name = "Second light"
test_count = 7
"#,
        )
        .unwrap();

        let plan = RunPlan::resolve(&args("ZTS"), &config).unwrap();
        assert_eq!(plan.iterations, 7);
        assert_eq!(plan.serial.as_deref(), Some("4fe9718b"));
        assert_eq!(plan.params.device_name, "Second light");

        let mut overridden = args("ZTS");
        overridden.test_count = Some(2);
        overridden.device_name = Some("First light".to_string());
        let plan = RunPlan::resolve(&overridden, &config).unwrap();
        assert_eq!(plan.iterations, 2);
        assert_eq!(plan.params.device_name, "First light");
    }
}
