//! Runtime configuration, loaded from an optional JSON file.

use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub topology: TopologyConfig,
    pub policy: PolicyConfig,
    pub plan: PlanConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub lsblk: String,
    pub findmnt: String,
    /// Prepended to kernel names to form device paths.
    pub device_prefix: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            lsblk: "lsblk".to_string(),
            findmnt: "findmnt".to_string(),
            device_prefix: "/dev/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Disks count as equal when `max - min <= min / tolerance_divisor`.
    pub tolerance_divisor: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { tolerance_divisor: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub partition_table: String,
    pub md_device: String,
    pub volume_group: String,
    pub logical_volume: String,
    pub filesystem: String,
    pub mount_target: String,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            partition_table: "gpt".to_string(),
            md_device: "/dev/md0".to_string(),
            volume_group: "ryvie".to_string(),
            logical_volume: "data".to_string(),
            filesystem: "btrfs".to_string(),
            mount_target: "/data".to_string(),
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, StorageError> {
        let config: Config = serde_json::from_str(text)
            .map_err(|e| StorageError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.policy.tolerance_divisor == 0 {
            return Err(StorageError::Configuration(
                "policy.tolerance_divisor must be positive".to_string(),
            ));
        }
        if self.topology.lsblk.trim().is_empty() || self.topology.findmnt.trim().is_empty() {
            return Err(StorageError::Configuration(
                "topology programs must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
