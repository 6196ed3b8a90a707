//! revbench CLI - build and benchmark projects across revisions.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use revbench_core::{ExperimentId, Settings};
use revbench_execution::{
    parse_project_selector, CancellationToken, Discovery, ExecutionEngine, Experimentator,
    ProjectSelection, Registries, RunContext,
};
use revbench_plugins::catalog;
use revbench_source::Source;
use revbench_storage::JsonStorage;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "revbench")]
#[command(about = "Run experiments over the revisions of software projects", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, global = true, default_value = "revbench.toml")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run experiments
    Run {
        /// Experiments to run
        #[arg(short = 'E', long = "experiment", required = true)]
        experiments: Vec<String>,
        /// Projects, as name or name@version
        #[arg(short = 'P', long = "project")]
        projects: Vec<String>,
        /// Add every project of this group
        #[arg(short = 'G', long)]
        group: Option<String>,
        /// Pin one revision by version strings
        #[arg(short = 'r', long = "revision")]
        revisions: Vec<String>,
        /// Print the plan without running it
        #[arg(long)]
        dry_run: bool,
        /// Count degraded results as failures
        #[arg(long)]
        strict: bool,
        /// Base id; experiments record under ids derived from it and their names
        #[arg(long)]
        experiment_id: Option<ExperimentId>,
    },
    /// List registered implementations
    List {
        #[arg(value_enum)]
        what: ListKind,
    },
    /// Show the revisions of a project
    Revisions {
        /// Project, as name or name@version
        #[arg(short = 'P', long = "project")]
        project: String,
        /// List every version of every source instead
        #[arg(long)]
        all: bool,
    },
    /// Print a report
    Report {
        /// Report name
        name: String,
        /// Only this experiment
        #[arg(long)]
        experiment: Option<ExperimentId>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Experiments,
    Projects,
    Reports,
    Plugins,
}

const EXIT_FAILED: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut settings = Settings::load_or_default(&cli.config)?;
    if let Commands::Run {
        strict,
        experiment_id,
        ..
    } = &cli.command
    {
        settings.strict |= *strict;
        if experiment_id.is_some() {
            settings.experiment_id = *experiment_id;
        }
    }

    let mut discovery = Discovery::new(catalog());
    for error in discovery.discover(&settings.plugins, &settings) {
        warn!(error = %error, "Plugin not loaded");
    }

    match cli.command {
        Commands::Run {
            experiments,
            projects,
            group,
            revisions,
            dry_run,
            ..
        } => {
            let settings = Arc::new(settings);
            let planner = Experimentator::from_registries(
                discovery.registries(),
                settings.clone(),
                &experiments,
                &projects,
                group.as_deref(),
                &revisions,
            )?;
            let plan = planner.plan().await?;

            if dry_run {
                for node in plan {
                    print!("{}", node.render());
                }
                return Ok(ExitCode::SUCCESS);
            }

            let storage = JsonStorage::new(&settings.storage_dir).await?;
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupted, cleaning up (press Ctrl-C again to quit now)");
                on_signal.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    error!("Interrupted twice, exiting without cleanup");
                    std::process::exit(i32::from(EXIT_INTERRUPTED));
                }
            });

            let ctx = RunContext::new(settings, Arc::new(storage), cancel);
            let summary = ExecutionEngine::new(ctx).run(plan).await;
            println!("{}", summary);

            if summary.interrupted {
                return Ok(ExitCode::from(EXIT_INTERRUPTED));
            }
            if !summary.success() {
                return Ok(ExitCode::from(EXIT_FAILED));
            }
        }
        Commands::List { what } => list(&discovery, what),
        Commands::Revisions { project, all } => {
            revisions(discovery.registries(), &project, all).await?;
        }
        Commands::Report { name, experiment } => {
            let report = discovery
                .registries()
                .reports
                .resolve(&name)
                .ok_or_else(|| anyhow!("Unknown report: {}", name))?;
            let storage = JsonStorage::new(&settings.storage_dir).await?;
            print!("{}", report.generate(&storage, experiment).await?);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn list(discovery: &Discovery, what: ListKind) {
    let registries = discovery.registries();
    match what {
        ListKind::Experiments => {
            println!("Experiments ({})", registries.experiments.len());
            for (name, experiment) in registries.experiments.all() {
                println!("  {:<12} {}", name, experiment.description());
            }
        }
        ListKind::Projects => {
            println!("Projects ({})", registries.projects.len());
            for (name, project) in registries.projects.all() {
                let sources: Vec<&str> = project.sources().iter().map(|s| s.local()).collect();
                println!("  {}/{} [{}]", project.group(), name, sources.join(", "));
            }
        }
        ListKind::Reports => {
            println!("Reports ({})", registries.reports.len());
            for (name, report) in registries.reports.all() {
                println!("  {:<12} {}", name, report.description());
            }
        }
        ListKind::Plugins => {
            let loaded: Vec<&str> = discovery.loaded().collect();
            println!("Plugins");
            for name in discovery.available() {
                let mark = if loaded.contains(&name) { "*" } else { " " };
                println!("  {} {}", mark, name);
            }
        }
    }
}

async fn revisions(registries: &Registries, selector: &str, all: bool) -> Result<()> {
    let (name, version) = parse_project_selector(selector);
    let definition = registries
        .projects
        .resolve(name)
        .ok_or_else(|| anyhow!("Unknown project: {}", name))?;

    if all {
        for source in definition.sources() {
            if !source.is_context_free() {
                println!("{}: depends on the chosen revision", source.local());
                continue;
            }
            println!("{}:", source.local());
            for v in source.versions().await? {
                match &v.detail {
                    Some(detail) => println!("  {} {}", v.label, detail),
                    None => println!("  {}", v.label),
                }
            }
        }
        return Ok(());
    }

    let mut selection = ProjectSelection::new(definition);
    if let Some(version) = version {
        selection = selection.version(version);
    }
    let revisions = selection.resolve().await?;
    info!(project = %name, count = revisions.len(), "Resolved");
    for revision in revisions {
        println!("{}", revision);
    }
    Ok(())
}
