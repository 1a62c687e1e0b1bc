//! Run persistence - saved workflow results under the configured runs directory

use crate::core::WorkflowResult;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const LATEST: &str = "latest";

/// Directory of saved run reports, one JSON file per run
pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable file stem for a run: start timestamp plus short run id
    pub fn run_name(result: &WorkflowResult) -> String {
        let short: String = result.id.chars().take(8).collect();
        format!("{}-{}", result.started_at.format("%Y-%m-%d-%H-%M-%S"), short)
    }

    /// Save a run and point `latest.json` at it
    pub fn save(&self, result: &WorkflowResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let file_name = format!("{}.json", Self::run_name(result));
        let path = self.dir.join(&file_name);
        let json = serde_json::to_string_pretty(result)?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

        let latest_path = self.dir.join(format!("{}.json", LATEST));
        let _ = fs::remove_file(&latest_path); // Ignore if doesn't exist
        #[cfg(unix)]
        {
            use std::os::unix::fs as unix_fs;
            unix_fs::symlink(&file_name, &latest_path)?;
        }
        #[cfg(not(unix))]
        {
            fs::copy(&path, &latest_path)?;
        }

        log::debug!("Saved run {} to {}", result.id, path.display());
        Ok(path)
    }

    /// Load a run by name (see [`RunStore::list`])
    pub fn load(&self, name: &str) -> Result<WorkflowResult> {
        let path = self.dir.join(format!("{}.json", name));
        let content =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let result = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(result)
    }

    pub fn load_latest(&self) -> Result<WorkflowResult> {
        let latest_path = self.dir.join(format!("{}.json", LATEST));
        if !latest_path.exists() {
            anyhow::bail!("No saved runs in {}", self.dir.display());
        }
        self.load(LATEST)
    }

    /// Saved run names, most recent first
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem != LATEST {
                    runs.push(stem.to_string());
                }
            }
        }

        runs.sort();
        runs.reverse();
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobResult, JobType};

    fn result(workflow: &str) -> WorkflowResult {
        WorkflowResult::new(workflow, vec![JobResult::pending("a", "A", JobType::Task)])
    }

    #[test]
    fn test_save_and_load_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs"));

        let first = result("first");
        store.save(&first).unwrap();
        let second = result("second");
        let path = store.save(&second).unwrap();
        assert!(path.exists());

        let latest = store.load_latest().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.job_results.len(), 1);

        let runs = store.list().unwrap();
        assert_eq!(runs.len(), 2);
        assert!(!runs.contains(&"latest".to_string()));
        assert_eq!(store.load(&RunStore::run_name(&first)).unwrap().workflow, "first");
    }

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("missing"));
        assert!(store.list().unwrap().is_empty());
        assert!(store.load_latest().is_err());
    }
}
