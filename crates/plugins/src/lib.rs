//! Built-in plugins: experiments, declared projects and reports.
//!
//! [`catalog`] lists every plugin this crate ships; the settings choose
//! which of them are loaded.

#![warn(missing_docs)]

pub mod experiments;
pub mod projects;
pub mod reports;

pub use experiments::{Empty, OptLevels, Pgo, Raw};
pub use projects::{register_declared, CommandProject};
pub use reports::StatusReport;

use revbench_execution::Plugin;

/// Every built-in plugin.
pub fn catalog() -> Vec<Plugin> {
    vec![
        Plugin::new("revbench.experiments.empty", experiments::register_empty),
        Plugin::new("revbench.experiments.raw", experiments::register_raw),
        Plugin::new("revbench.experiments.opt-levels", experiments::register_opt_levels),
        Plugin::new("revbench.experiments.pgo", experiments::register_pgo),
        Plugin::new("revbench.projects.declared", projects::register_declared),
        Plugin::new("revbench.reports.status", reports::register_status),
    ]
}
