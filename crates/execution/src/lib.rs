//! Execution layer - projects, steps, plans and the engine that runs them.

#![warn(missing_docs)]

pub mod status;
pub mod error;
pub mod cancel;
pub mod context;
pub mod project;
pub mod step;
pub mod composite;
pub mod experiment;
pub mod registry;
pub mod plan;
pub mod engine;

pub use status::{StatusCell, StepStatus};
pub use error::{PlanError, PluginError, StepError};
pub use cancel::CancellationToken;
pub use context::{ExperimentScope, Handoff, RunContext};
pub use project::{ProjectContext, ProjectDefinition, ProjectInstance};
pub use step::{Action, Scope, Step, StepKind};
pub use composite::{AnyOf, ExperimentStep, Node, RequireAll};
pub use experiment::{Experiment, Report};
pub use registry::{Discovery, DiscoveryState, Plugin, RegisterFn, Registries, Registry};
pub use plan::{parse_project_selector, Experimentator, ProjectSelection};
pub use engine::{EngineConfig, ExecutionEngine, RunSummary};
