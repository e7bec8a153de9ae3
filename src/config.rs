//! Run configuration.
//!
//! Values come from built-in defaults, optionally a JSON file, then
//! environment variables, then command-line flags (applied by the binary).
//!
//! # Environment Variables
//!
//! - `RBVAULT_REALTIME`: `0`/`false` disables real-time priorities
//! - `RBVAULT_COORDINATOR_PRIORITY`: coordinator priority (default: `90`)
//! - `RBVAULT_WORKER1_PRIORITY`: first worker priority (default: `80`)
//! - `RBVAULT_WORKER2_PRIORITY`: second worker priority (default: `70`)

use crate::error::{RbVaultError, Result};
use crate::sched::{MAX_PRIORITY, MIN_PRIORITY};
use crate::session::SESSION_COUNT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Thread scheduling parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Request `SCHED_FIFO` priorities at all.
    pub realtime: bool,
    pub coordinator_priority: i32,
    /// One priority per worker, each below the coordinator's.
    pub worker_priorities: [i32; SESSION_COUNT],
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            realtime: true,
            coordinator_priority: 90,
            worker_priorities: [80, 70],
        }
    }
}

impl SchedulingConfig {
    /// Scheduling without real-time priorities.
    pub fn disabled() -> Self {
        Self { realtime: false, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        let all = std::iter::once(self.coordinator_priority).chain(self.worker_priorities);
        for priority in all {
            if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
                return Err(RbVaultError::Config(format!(
                    "priority {} outside {}..={}",
                    priority, MIN_PRIORITY, MAX_PRIORITY
                )));
            }
        }
        if self.worker_priorities.iter().any(|p| *p >= self.coordinator_priority) {
            return Err(RbVaultError::Config(
                "worker priorities must be below the coordinator priority".to_string(),
            ));
        }
        if self.worker_priorities[0] == self.worker_priorities[1] {
            return Err(RbVaultError::Config(
                "worker priorities must be distinct".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything a run needs besides the two scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Result file per worker.
    pub outputs: [PathBuf; SESSION_COUNT],
    pub scheduling: SchedulingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            outputs: [PathBuf::from("output1"), PathBuf::from("output2")],
            scheduling: SchedulingConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: RunConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Override fields from `RBVAULT_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("RBVAULT_REALTIME") {
            self.scheduling.realtime = parse_bool("RBVAULT_REALTIME", &value)?;
        }
        if let Some(value) = lookup("RBVAULT_COORDINATOR_PRIORITY") {
            self.scheduling.coordinator_priority = parse_priority("RBVAULT_COORDINATOR_PRIORITY", &value)?;
        }
        if let Some(value) = lookup("RBVAULT_WORKER1_PRIORITY") {
            self.scheduling.worker_priorities[0] = parse_priority("RBVAULT_WORKER1_PRIORITY", &value)?;
        }
        if let Some(value) = lookup("RBVAULT_WORKER2_PRIORITY") {
            self.scheduling.worker_priorities[1] = parse_priority("RBVAULT_WORKER2_PRIORITY", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.outputs[0] == self.outputs[1] {
            return Err(RbVaultError::Config(
                "each worker needs its own output file".to_string(),
            ));
        }
        self.scheduling.validate()
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RbVaultError::Config(format!("invalid value for {}: {}", name, other))),
    }
}

fn parse_priority(name: &str, value: &str) -> Result<i32> {
    value
        .trim()
        .parse()
        .map_err(|_| RbVaultError::Config(format!("invalid value for {}: {}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scheduling.coordinator_priority, 90);
        assert_eq!(config.scheduling.worker_priorities, [80, 70]);
        assert_eq!(config.outputs[0], PathBuf::from("output1"));
    }

    #[test]
    fn test_collapsed_worker_priorities_rejected() {
        let scheduling = SchedulingConfig { worker_priorities: [70, 70], ..SchedulingConfig::default() };
        assert!(matches!(scheduling.validate(), Err(RbVaultError::Config(_))));

        let above = SchedulingConfig { worker_priorities: [95, 70], ..SchedulingConfig::default() };
        assert!(matches!(above.validate(), Err(RbVaultError::Config(_))));

        let out_of_range = SchedulingConfig { coordinator_priority: 120, ..SchedulingConfig::default() };
        assert!(matches!(out_of_range.validate(), Err(RbVaultError::Config(_))));
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"scheduling": {{"realtime": false, "worker_priorities": [60, 50]}}}}"#).unwrap();

        let config = RunConfig::from_file(file.path()).unwrap();
        assert!(!config.scheduling.realtime);
        assert_eq!(config.scheduling.worker_priorities, [60, 50]);
        assert_eq!(config.scheduling.coordinator_priority, 90);
        assert_eq!(config.outputs, RunConfig::default().outputs);
    }

    #[test]
    fn test_from_file_rejects_bad_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(RunConfig::from_file(file.path()), Err(RbVaultError::Serialization(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RBVAULT_REALTIME", "off"),
            ("RBVAULT_COORDINATOR_PRIORITY", "50"),
            ("RBVAULT_WORKER2_PRIORITY", " 20 "),
        ]
        .into_iter()
        .collect();

        let mut config = RunConfig::default();
        config.apply_vars(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert!(!config.scheduling.realtime);
        assert_eq!(config.scheduling.coordinator_priority, 50);
        assert_eq!(config.scheduling.worker_priorities, [80, 20]);
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        let bad = config.apply_vars(|name| (name == "RBVAULT_WORKER1_PRIORITY").then(|| "high".to_string()));
        assert!(matches!(bad, Err(RbVaultError::Config(_))));
    }
}
