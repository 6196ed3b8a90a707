//! Composite steps and the plan tree.

use crate::context::RunContext;
use crate::error::StepError;
use crate::project::ProjectInstance;
use crate::status::{StatusCell, StepStatus};
use crate::step::{clean_project, Action, Step};
use async_trait::async_trait;
use revbench_core::{ExperimentId, ExperimentRecord};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// A node of the plan tree.
pub enum Node {
    /// A leaf step
    Step(Step),
    /// Fail-fast sequence
    RequireAll(RequireAll),
    /// Best-effort sequence
    Any(AnyOf),
    /// Transactional experiment wrapper
    Experiment(ExperimentStep),
}

impl Node {
    fn action(&self) -> &dyn Action {
        match self {
            Node::Step(a) => a,
            Node::RequireAll(a) => a,
            Node::Any(a) => a,
            Node::Experiment(a) => a,
        }
    }

    fn children(&self) -> &[Node] {
        match self {
            Node::Step(_) => &[],
            Node::RequireAll(a) => &a.children,
            Node::Any(a) => &a.children,
            Node::Experiment(a) => &a.children,
        }
    }

    /// Whether this node runs after an experiment regardless of outcome.
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Node::Step(step) if step.is_cleanup())
    }

    /// Indented outline of this subtree, one node per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(out, "{:indent$}{}", "", self, indent = depth * 2);
        for child in self.children() {
            child.render_into(out, depth + 1);
        }
    }
}

impl From<Step> for Node {
    fn from(step: Step) -> Self {
        Node::Step(step)
    }
}

impl From<RequireAll> for Node {
    fn from(node: RequireAll) -> Self {
        Node::RequireAll(node)
    }
}

impl From<AnyOf> for Node {
    fn from(node: AnyOf) -> Self {
        Node::Any(node)
    }
}

impl From<ExperimentStep> for Node {
    fn from(node: ExperimentStep) -> Self {
        Node::Experiment(node)
    }
}

#[async_trait]
impl Action for Node {
    async fn invoke(&self, ctx: &RunContext) -> Result<Vec<StepStatus>, StepError> {
        self.action().invoke(ctx).await
    }

    async fn onerror(&self, ctx: &RunContext) {
        self.action().onerror(ctx).await
    }

    fn status(&self) -> StepStatus {
        self.action().status()
    }

    fn count(&self) -> usize {
        self.action().count()
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Step(a) => a.fmt(f),
            Node::RequireAll(a) => a.fmt(f),
            Node::Any(a) => a.fmt(f),
            Node::Experiment(a) => a.fmt(f),
        }
    }
}

/// Runs children in order and stops at the first failure.
///
/// The failing child's `onerror` runs before the sequence returns. An
/// interrupt also runs it and is then propagated.
pub struct RequireAll {
    name: String,
    project: Option<Arc<ProjectInstance>>,
    children: Vec<Node>,
    status: StatusCell,
}

impl RequireAll {
    /// Sequence named `name`.
    pub fn new(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            project: None,
            children,
            status: StatusCell::default(),
        }
    }

    /// The tree of one project instance.
    pub fn for_project(project: &Arc<ProjectInstance>, children: Vec<Node>) -> Self {
        Self {
            name: project.to_string(),
            project: Some(project.clone()),
            children,
            status: StatusCell::default(),
        }
    }

    /// The project instance this tree belongs to, if any.
    pub fn project(&self) -> Option<&Arc<ProjectInstance>> {
        self.project.as_ref()
    }

    /// Child nodes.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    async fn fail(&self, ctx: &RunContext, child: &Node) {
        self.status.set(StepStatus::Error);
        child.onerror(ctx).await;
        self.onerror(ctx).await;
    }
}

#[async_trait]
impl Action for RequireAll {
    async fn invoke(&self, ctx: &RunContext) -> Result<Vec<StepStatus>, StepError> {
        let mut results = Vec::with_capacity(self.children.len());

        for child in &self.children {
            match child.invoke(ctx).await {
                Ok(statuses) => {
                    let failed = statuses.contains(&StepStatus::Error);
                    results.extend(statuses);
                    if failed {
                        error!(step = %child, within = %self.name, "Step failed, stopping");
                        self.fail(ctx, child).await;
                        return Ok(results);
                    }
                }
                Err(StepError::Interrupted) => {
                    warn!(step = %child, within = %self.name, "Interrupted");
                    self.fail(ctx, child).await;
                    return Err(StepError::Interrupted);
                }
                Err(e) => {
                    error!(step = %child, within = %self.name, error = %e, "Step failed, stopping");
                    results.push(StepStatus::Error);
                    self.fail(ctx, child).await;
                    return Ok(results);
                }
            }
        }

        self.status.set(StepStatus::worst(&results));
        Ok(results)
    }

    async fn onerror(&self, ctx: &RunContext) {
        if let Some(project) = &self.project {
            if let Err(e) = clean_project(ctx, project).await {
                warn!(project = %project.name(), error = %e, "Cleanup failed");
            }
        }
    }

    fn status(&self) -> StepStatus {
        self.status.get()
    }

    fn count(&self) -> usize {
        self.children.iter().map(Action::count).sum()
    }
}

impl std::fmt::Display for RequireAll {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "require-all {}", self.name)
    }
}

/// Runs every child whatever happens to the others.
///
/// Returns one status per child: `Ok`, or `CanContinue` for a child that
/// failed. Interrupts are propagated immediately.
pub struct AnyOf {
    name: String,
    children: Vec<Node>,
    status: StatusCell,
}

impl AnyOf {
    /// Best-effort group named `name`.
    pub fn new(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            children,
            status: StatusCell::default(),
        }
    }
}

#[async_trait]
impl Action for AnyOf {
    async fn invoke(&self, ctx: &RunContext) -> Result<Vec<StepStatus>, StepError> {
        let mut results = Vec::with_capacity(self.children.len());

        for child in &self.children {
            let failed = match child.invoke(ctx).await {
                Ok(statuses) => statuses.iter().any(|s| *s > StepStatus::Ok),
                Err(StepError::Interrupted) => {
                    self.status.set(StepStatus::Error);
                    return Err(StepError::Interrupted);
                }
                Err(e) => {
                    warn!(step = %child, within = %self.name, error = %e, "Step failed, continuing");
                    true
                }
            };
            results.push(if failed {
                StepStatus::CanContinue
            } else {
                StepStatus::Ok
            });
        }

        self.status.set(StepStatus::worst(&results));
        Ok(results)
    }

    fn status(&self) -> StepStatus {
        self.status.get()
    }

    fn count(&self) -> usize {
        self.children.iter().map(Action::count).sum()
    }
}

impl std::fmt::Display for AnyOf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "any {}", self.name)
    }
}

/// Wraps the project trees of one experiment in a persisted transaction.
///
/// The begin record is written before the first child runs and the end
/// record exactly once afterwards, however the children fared. A child
/// error or an interrupt stops the remaining project trees; cleanup children
/// still run.
pub struct ExperimentStep {
    id: ExperimentId,
    name: String,
    description: String,
    children: Vec<Node>,
    status: StatusCell,
    finalized: AtomicBool,
}

impl ExperimentStep {
    /// Experiment step with a stable id.
    pub fn new(
        id: ExperimentId,
        name: impl Into<String>,
        description: impl Into<String>,
        children: Vec<Node>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            children,
            status: StatusCell::default(),
            finalized: AtomicBool::new(false),
        }
    }

    /// Experiment id.
    pub fn id(&self) -> ExperimentId {
        self.id
    }

    /// Experiment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Child nodes.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    async fn finalize(&self, ctx: &RunContext) -> Option<StepStatus> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return None;
        }
        match ctx.storage().end_experiment(self.id).await {
            Ok(record) => {
                info!(experiment = %self.name, id = %self.id, end = ?record.end, "Experiment finished");
                None
            }
            Err(e) => {
                error!(experiment = %self.name, error = %e, "Failed to end experiment");
                Some(StepStatus::Error)
            }
        }
    }
}

#[async_trait]
impl Action for ExperimentStep {
    async fn invoke(&self, ctx: &RunContext) -> Result<Vec<StepStatus>, StepError> {
        let record = ExperimentRecord::new(self.id, &self.name, &self.description);
        let mut results = Vec::new();
        let began = match ctx.storage().begin_experiment(&record).await {
            Ok(_) => {
                info!(experiment = %self.name, id = %self.id, "Experiment started");
                true
            }
            Err(e) => {
                error!(experiment = %self.name, error = %e, "Failed to begin experiment, only cleaning up");
                results.push(StepStatus::Error);
                false
            }
        };

        let ctx = ctx.for_experiment(self.id, &self.name);
        let mut stopped = !began;

        for child in &self.children {
            if !child.is_cleanup() && (stopped || ctx.cancel().is_cancelled()) {
                stopped = true;
                continue;
            }
            match child.invoke(&ctx).await {
                Ok(statuses) => results.extend(statuses),
                Err(StepError::Interrupted) => {
                    warn!(experiment = %self.name, step = %child, "Interrupted, finishing experiment");
                    results.push(StepStatus::Error);
                    stopped = true;
                }
                Err(e) => {
                    error!(experiment = %self.name, step = %child, error = %e, "Step failed, finishing experiment");
                    results.push(StepStatus::Error);
                    stopped = true;
                }
            }
        }

        if began {
            results.extend(self.finalize(&ctx).await);
        }
        self.status.set(StepStatus::worst(&results));
        Ok(results)
    }

    fn status(&self) -> StepStatus {
        self.status.get()
    }

    fn count(&self) -> usize {
        self.children.iter().map(Action::count).sum()
    }
}

impl std::fmt::Display for ExperimentStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "experiment {} ({})", self.name, self.id)
    }
}
