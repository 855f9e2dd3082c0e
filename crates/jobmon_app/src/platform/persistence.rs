use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use jobmon_core::RunningJobSnapshot;
use jobmon_engine::{ensure_state_dir, AtomicFileWriter};
use jobmon_logging::{jobmon_error, jobmon_info, jobmon_warn};
use serde::{Deserialize, Serialize};

pub(crate) const STATE_FILENAME: &str = ".jobmon_state.ron";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedJob {
    job_id: String,
    playbook: String,
    #[serde(default)]
    hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedState {
    #[serde(default)]
    saved_utc: String,
    running: Vec<PersistedJob>,
}

pub(crate) fn load_running_jobs(state_dir: &Path) -> Vec<RunningJobSnapshot> {
    let path = state_dir.join(STATE_FILENAME);
    let content = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Vec::new();
        }
        Err(err) => {
            jobmon_warn!("Failed to read persisted state from {:?}: {}", path, err);
            return Vec::new();
        }
    };

    let state: PersistedState = match ron::from_str(&content) {
        Ok(state) => state,
        Err(err) => {
            jobmon_warn!("Failed to parse persisted state from {:?}: {}", path, err);
            return Vec::new();
        }
    };

    let running: Vec<RunningJobSnapshot> = state
        .running
        .into_iter()
        .map(|job| RunningJobSnapshot {
            job_id: job.job_id,
            playbook: job.playbook,
            hosts: job.hosts,
        })
        .collect();

    jobmon_info!(
        "Loaded {} running jobs from {:?} (saved {})",
        running.len(),
        path,
        state.saved_utc
    );
    running
}

/// Stores the jobs still running. An empty list removes the state file.
pub(crate) fn save_running_jobs(state_dir: &Path, running: &[RunningJobSnapshot]) {
    if let Err(err) = ensure_state_dir(state_dir) {
        jobmon_error!("Failed to ensure state dir {:?}: {}", state_dir, err);
        return;
    }

    let writer = AtomicFileWriter::new(PathBuf::from(state_dir));
    if running.is_empty() {
        if let Err(err) = writer.remove(STATE_FILENAME) {
            jobmon_error!("Failed to clear persisted state in {:?}: {}", state_dir, err);
        }
        return;
    }

    let state = PersistedState {
        saved_utc: Utc::now().to_rfc3339(),
        running: running
            .iter()
            .map(|job| PersistedJob {
                job_id: job.job_id.clone(),
                playbook: job.playbook.clone(),
                hosts: job.hosts.clone(),
            })
            .collect(),
    };

    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(&state, pretty) {
        Ok(text) => text,
        Err(err) => {
            jobmon_error!("Failed to serialize persisted state: {}", err);
            return;
        }
    };

    if let Err(err) = writer.write(STATE_FILENAME, &content) {
        jobmon_error!("Failed to write persisted state to {:?}: {}", state_dir, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(job_id: &str, hosts: &[&str]) -> RunningJobSnapshot {
        RunningJobSnapshot {
            job_id: job_id.to_string(),
            playbook: "site.yml".to_string(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn running_jobs_survive_a_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let jobs = vec![snapshot("job-1", &["web1"]), snapshot("job-2", &["web1", "db1"])];

        save_running_jobs(dir.path(), &jobs);
        assert!(dir.path().join(STATE_FILENAME).exists());
        assert_eq!(load_running_jobs(dir.path()), jobs);
    }

    #[test]
    fn saving_nothing_removes_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        save_running_jobs(dir.path(), &[snapshot("job-1", &[])]);
        save_running_jobs(dir.path(), &[]);

        assert!(!dir.path().join(STATE_FILENAME).exists());
        assert!(load_running_jobs(dir.path()).is_empty());
    }

    #[test]
    fn missing_state_dir_is_created_on_save() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested").join("state");
        save_running_jobs(&nested, &[snapshot("job-9", &["web1"])]);
        assert_eq!(load_running_jobs(&nested).len(), 1);
    }

    #[test]
    fn corrupt_state_loads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(STATE_FILENAME), "not ron at all {").expect("write");
        assert!(load_running_jobs(dir.path()).is_empty());
    }

    #[test]
    fn state_without_timestamp_or_hosts_still_loads() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(STATE_FILENAME),
            r#"(running: [(job_id: "job-3", playbook: "baseline.yml")])"#,
        )
        .expect("write");

        assert_eq!(load_running_jobs(dir.path()), vec![RunningJobSnapshot {
            job_id: "job-3".to_string(),
            playbook: "baseline.yml".to_string(),
            hosts: Vec::new(),
        }]);
    }
}
