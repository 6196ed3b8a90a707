//! The execution engine - runs a plan and summarizes it.

use crate::composite::Node;
use crate::context::RunContext;
use crate::status::StepStatus;
use crate::step::Action;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Configuration for the execution engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Count degraded (`CAN_CONTINUE`) results as failures
    pub strict: bool,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Leaf steps in the plan
    pub planned: usize,
    /// Failed results
    pub failed: usize,
    /// Wall time
    pub elapsed: Duration,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl RunSummary {
    /// Whether nothing failed and nothing was interrupted.
    pub fn success(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} actions planned, {} failed, took {:.1?}",
            self.planned, self.failed, self.elapsed
        )?;
        if self.interrupted {
            f.write_str(" (interrupted)")?;
        }
        Ok(())
    }
}

/// The main execution engine.
///
/// Invokes the experiment nodes of a plan one after the other on the
/// calling task.
pub struct ExecutionEngine {
    ctx: RunContext,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Create a new execution engine.
    pub fn new(ctx: RunContext) -> Self {
        let config = EngineConfig {
            strict: ctx.settings().strict,
        };
        Self { ctx, config }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Context the plan runs in.
    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    fn is_failure(&self, status: StepStatus) -> bool {
        match status {
            StepStatus::Error => true,
            StepStatus::CanContinue => self.config.strict,
            StepStatus::Ok | StepStatus::Unset => false,
        }
    }

    /// Run every experiment of `plan` in order.
    ///
    /// Stops after the current experiment once the run is cancelled.
    pub async fn run(&self, plan: &[Node]) -> RunSummary {
        let start = Instant::now();
        let planned: usize = plan.iter().map(Action::count).sum();
        info!(planned, experiments = plan.len(), "Starting run");

        let mut failed = 0;
        for node in plan {
            if self.ctx.cancel().is_cancelled() {
                warn!(experiment = %node, "Skipped after interrupt");
                continue;
            }
            match node.invoke(&self.ctx).await {
                Ok(results) => {
                    failed += results.iter().filter(|s| self.is_failure(**s)).count();
                }
                Err(e) => {
                    error!(experiment = %node, error = %e, "Experiment failed");
                    failed += 1;
                }
            }
        }

        let summary = RunSummary {
            planned,
            failed,
            elapsed: start.elapsed(),
            interrupted: self.ctx.cancel().is_cancelled(),
        };
        info!(%summary, "Run finished");
        summary
    }
}
