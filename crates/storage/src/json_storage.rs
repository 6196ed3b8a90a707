//! JSON file storage implementation.
//!
//! Stores one JSON file per experiment and per run below the storage root.

use std::path::{Path, PathBuf};
use chrono::Utc;
use revbench_core::{ExperimentId, ExperimentRecord, RunId, RunRecord};
use super::{Storage, StorageError, Result};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    // Serializes read-modify-write of experiment records.
    write: Mutex<()>,
}

impl JsonStorage {
    /// Create storage, creating the `experiments/` and `runs/` directories.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("experiments")).await?;
        fs::create_dir_all(root.join("runs")).await?;

        Ok(Self {
            root,
            write: Mutex::new(()),
        })
    }

    /// Storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn experiment_path(&self, id: ExperimentId) -> PathBuf {
        self.root.join("experiments").join(format!("{}.json", id))
    }
    fn run_path(&self, id: RunId) -> PathBuf {
        self.root.join("runs").join(format!("{}.json", id))
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn begin_experiment(&self, record: &ExperimentRecord) -> Result<ExperimentRecord> {
        let _guard = self.write.lock().await;
        let path = self.experiment_path(record.id);

        let stored = match read_json::<ExperimentRecord>(&path).await? {
            Some(existing) if existing.begin.is_some() => {
                debug!(experiment = %record.id, "Experiment already began");
                ExperimentRecord {
                    end: None,
                    ..existing
                }
            }
            _ => ExperimentRecord {
                begin: Some(Utc::now()),
                end: None,
                ..record.clone()
            },
        };

        write_json(&path, &stored).await?;
        Ok(stored)
    }

    async fn end_experiment(&self, id: ExperimentId) -> Result<ExperimentRecord> {
        let _guard = self.write.lock().await;
        let path = self.experiment_path(id);

        let mut record: ExperimentRecord = read_json(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("experiment {}", id)))?;
        record.end = Some(Utc::now());

        write_json(&path, &record).await?;
        Ok(record)
    }

    async fn load_experiment(&self, id: ExperimentId) -> Result<Option<ExperimentRecord>> {
        read_json(&self.experiment_path(id)).await
    }

    async fn list_experiments(&self) -> Result<Vec<ExperimentRecord>> {
        let mut experiments = list_dir(&self.root.join("experiments")).await?;
        experiments.sort_by(|a: &ExperimentRecord, b| a.begin.cmp(&b.begin));
        Ok(experiments)
    }

    async fn persist_run(&self, run: &RunRecord) -> Result<()> {
        write_json(&self.run_path(run.id), run).await
    }

    async fn list_runs(&self, experiment: Option<ExperimentId>) -> Result<Vec<RunRecord>> {
        let all = list_dir(&self.root.join("runs")).await?;
        let mut runs: Vec<RunRecord> = all
            .into_iter()
            .filter(|r: &RunRecord| experiment.map_or(true, |id| r.experiment == id))
            .collect();
        runs.sort_by(|a, b| a.begin.cmp(&b.begin));
        Ok(runs)
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json.as_bytes()).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}
