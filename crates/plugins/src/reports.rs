//! Built-in reports.

use async_trait::async_trait;
use revbench_core::{ExperimentId, RunStatus, Settings};
use revbench_execution::{PluginError, Registries, Report};
use revbench_storage::{Storage, StorageError};
use std::fmt::Write;
use std::sync::Arc;

/// Run counts per experiment, by status.
pub struct StatusReport;

#[derive(Default)]
struct Counts {
    ok: usize,
    failed: usize,
    running: usize,
}

#[async_trait]
impl Report for StatusReport {
    fn name(&self) -> &str {
        "status"
    }

    fn description(&self) -> &str {
        "Run counts per experiment"
    }

    async fn generate(
        &self,
        storage: &dyn Storage,
        experiment: Option<ExperimentId>,
    ) -> Result<String, StorageError> {
        let experiments = match experiment {
            Some(id) => vec![storage
                .load_experiment(id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("experiment {}", id)))?],
            None => storage.list_experiments().await?,
        };

        let mut out = String::new();
        for record in experiments {
            let mut counts = Counts::default();
            for run in storage.list_runs(Some(record.id)).await? {
                match run.status {
                    RunStatus::Ok => counts.ok += 1,
                    RunStatus::Failed => counts.failed += 1,
                    RunStatus::Running => counts.running += 1,
                }
            }

            let state = if record.end.is_some() { "finished" } else { "unfinished" };
            let _ = writeln!(out, "{} {} ({})", record.name, record.id, state);
            let _ = writeln!(
                out,
                "  ok: {}  failed: {}  running: {}",
                counts.ok, counts.failed, counts.running
            );
        }
        if out.is_empty() {
            out.push_str("no experiments recorded\n");
        }
        Ok(out)
    }
}

pub(crate) fn register_status(registries: &mut Registries, _: &Settings) -> Result<(), PluginError> {
    registries.reports.register("status", Arc::new(StatusReport));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use revbench_core::{ExperimentRecord, RunId, RunRecord};
    use revbench_storage::JsonStorage;

    fn run(experiment: ExperimentId, status: RunStatus) -> RunRecord {
        RunRecord {
            id: RunId::new(),
            project: "gzip".into(),
            group: "default".into(),
            experiment,
            experiment_name: "raw".into(),
            revision: "gzip@1a2b3c4d5e".into(),
            config: None,
            status,
            begin: chrono::Utc::now(),
            end: None,
        }
    }

    #[tokio::test]
    async fn test_status_counts() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        let first = storage
            .begin_experiment(&ExperimentRecord::new(ExperimentId::new(), "raw", ""))
            .await
            .unwrap();
        storage.end_experiment(first.id).await.unwrap();
        let second = storage
            .begin_experiment(&ExperimentRecord::new(ExperimentId::new(), "pgo", ""))
            .await
            .unwrap();

        for status in [RunStatus::Ok, RunStatus::Ok, RunStatus::Failed] {
            storage.persist_run(&run(first.id, status)).await.unwrap();
        }
        storage.persist_run(&run(second.id, RunStatus::Running)).await.unwrap();

        let all = StatusReport.generate(&storage, None).await.unwrap();
        assert!(all.contains(&format!("raw {} (finished)\n  ok: 2  failed: 1  running: 0", first.id)));
        assert!(all.contains(&format!("pgo {} (unfinished)\n  ok: 0  failed: 0  running: 1", second.id)));

        let one = StatusReport.generate(&storage, Some(second.id)).await.unwrap();
        assert_eq!(one.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_empty_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let out = StatusReport.generate(&storage, None).await.unwrap();
        assert_eq!(out, "no experiments recorded\n");
    }
}
