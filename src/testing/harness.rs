//! Repeated-run harness
//!
//! Runs one onboarding variant N times on a fresh driver session each time
//! and keeps a running tally. Only successful iterations are followed by
//! the cleanup flow; a failed iteration leaves the app as it was so the
//! failure can be inspected on the phone.

use crate::common::{Config, Settle};
use crate::driver::DriverConnector;
use crate::flow::{run_flow, FlowDefinition, FlowParams, FlowResult, FlowVariant};
use crate::reset::reset_device;

/// Success/failure counters for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Cleanup flows started after successful iterations
    pub resets_attempted: u32,
    /// Cleanup flows that could not remove the device
    pub resets_failed: u32,
}

impl RunTally {
    fn record(&mut self, success: bool) {
        self.attempted += 1;
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// A failed iteration kept for the final report
#[derive(Debug, Clone)]
pub struct IterationFailure {
    pub iteration: u32,
    pub summary: String,
    pub diagnostics: Option<String>,
}

pub struct Harness<C: DriverConnector> {
    connector: C,
    config: Config,
    failures: Vec<IterationFailure>,
}

impl<C: DriverConnector> Harness<C> {
    pub fn new(connector: C, config: Config) -> Self {
        Self {
            connector,
            config,
            failures: Vec::new(),
        }
    }

    /// Failed iterations of the last run, in order
    pub fn failures(&self) -> &[IterationFailure] {
        &self.failures
    }

    /// Run `variant` `iterations` times
    pub async fn run(
        &mut self,
        variant: FlowVariant,
        iterations: u32,
        params: &FlowParams,
    ) -> RunTally {
        let definition = FlowDefinition::for_variant(variant, params, &self.config);
        tracing::debug!(states = ?definition.states(), "Flow chain for {variant}");
        let mut tally = RunTally::default();
        self.failures.clear();

        for i in 1..=iterations {
            tracing::info!("=================== {variant} test {i}/{iterations} ===================");

            if let Err(failure) = self.run_iteration(i, &definition, params, &mut tally).await {
                tracing::error!("{variant} test {i} failed: {}", failure.summary);
                self.failures.push(failure);
            }

            log_summary(variant, &tally, iterations);
        }

        tally
    }

    async fn run_iteration(
        &mut self,
        iteration: u32,
        definition: &FlowDefinition,
        params: &FlowParams,
        tally: &mut RunTally,
    ) -> Result<(), IterationFailure> {
        let mut driver = match self.connector.connect().await {
            Ok(driver) => driver,
            Err(e) => {
                tally.record(false);
                return Err(IterationFailure {
                    iteration,
                    summary: format!("could not connect to phone: {e}"),
                    diagnostics: None,
                });
            }
        };

        let result: FlowResult = run_flow(driver.as_mut(), definition, &self.config).await;
        tally.record(result.success);

        if !result.success {
            return Err(IterationFailure {
                iteration,
                summary: result.summary(),
                diagnostics: result.diagnostics,
            });
        }

        self.config.settle.wait(Settle::PostSuccess).await;
        tally.resets_attempted += 1;
        if !reset_device(driver.as_mut(), &params.device_name, &self.config).await {
            tally.resets_failed += 1;
        }
        self.config.settle.wait(Settle::PostSuccess).await;

        Ok(())
    }
}

fn log_summary(variant: FlowVariant, tally: &RunTally, iterations: u32) {
    tracing::info!("=======================================================");
    tracing::info!(" Execute Summary:");
    tracing::info!(
        " Total executed {variant} times: {} / {iterations}",
        tally.attempted
    );
    tracing::info!(" Total successful {variant}: {}", tally.succeeded);
    tracing::info!(" Total failed {variant}: {}", tally.failed);
    if tally.resets_failed > 0 {
        tracing::warn!(" Failed cleanups: {}", tally.resets_failed);
    }
    tracing::info!("=======================================================");
}
