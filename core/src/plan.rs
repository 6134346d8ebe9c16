//! Provisioning stages and their forward-only state machine.
//!
//! Nothing here executes a stage. [`PlanStep`] describes what a stage would do
//! for a given proposal; [`PlanProgress`] tracks outcomes reported back by
//! whatever executes them, so a failed run can resume at the failed stage.

use crate::proposal::Tier;
use crate::StorageError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStage {
    Partition,
    Mdadm,
    Persist,
    Lvm,
    Format,
    Mount,
}

/// Allowed transitions: `(from, to)`. Each stage is entered from exactly one
/// predecessor and only after that predecessor succeeded.
const TRANSITIONS: [(PlanStage, PlanStage); 5] = [
    (PlanStage::Partition, PlanStage::Mdadm),
    (PlanStage::Mdadm, PlanStage::Persist),
    (PlanStage::Persist, PlanStage::Lvm),
    (PlanStage::Lvm, PlanStage::Format),
    (PlanStage::Format, PlanStage::Mount),
];

impl PlanStage {
    pub const ALL: [PlanStage; 6] = [
        PlanStage::Partition,
        PlanStage::Mdadm,
        PlanStage::Persist,
        PlanStage::Lvm,
        PlanStage::Format,
        PlanStage::Mount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStage::Partition => "partition",
            PlanStage::Mdadm => "mdadm",
            PlanStage::Persist => "persist",
            PlanStage::Lvm => "lvm",
            PlanStage::Format => "format",
            PlanStage::Mount => "mount",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    pub fn predecessor(&self) -> Option<PlanStage> {
        TRANSITIONS
            .iter()
            .find(|(_, to)| to == self)
            .map(|(from, _)| *from)
    }

    pub fn successor(&self) -> Option<PlanStage> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| from == self)
            .map(|(_, to)| *to)
    }
}

impl fmt::Display for PlanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive preview of one stage. Serialized with a `stage` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum PlanStep {
    Partition {
        disks: Vec<String>,
        table: String,
    },
    Mdadm {
        level: String,
        device: String,
        members: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tiers: Vec<Tier>,
    },
    Persist {
        files: Vec<String>,
    },
    Lvm {
        #[serde(rename = "volumeGroup")]
        volume_group: String,
        #[serde(rename = "logicalVolume")]
        logical_volume: String,
    },
    Format {
        filesystem: String,
    },
    Mount {
        target: String,
        options: Vec<String>,
    },
}

impl PlanStep {
    pub fn stage(&self) -> PlanStage {
        match self {
            PlanStep::Partition { .. } => PlanStage::Partition,
            PlanStep::Mdadm { .. } => PlanStage::Mdadm,
            PlanStep::Persist { .. } => PlanStage::Persist,
            PlanStep::Lvm { .. } => PlanStage::Lvm,
            PlanStep::Format { .. } => PlanStage::Format,
            PlanStep::Mount { .. } => PlanStage::Mount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StageOutcome {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub outcome: StageOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Outcomes reported for each stage of one provisioning run. Stages with no
/// record are pending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanProgress {
    stages: BTreeMap<PlanStage, StageRecord>,
}

impl PlanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self, stage: PlanStage) -> Option<&StageOutcome> {
        self.stages.get(&stage).map(|r| &r.outcome)
    }

    pub fn is_succeeded(&self, stage: PlanStage) -> bool {
        matches!(self.outcome(stage), Some(StageOutcome::Succeeded))
    }

    /// First stage that has not succeeded yet.
    pub fn next_stage(&self) -> Option<PlanStage> {
        PlanStage::ALL.into_iter().find(|s| !self.is_succeeded(*s))
    }

    pub fn is_complete(&self) -> bool {
        self.next_stage().is_none()
    }

    pub fn check_ready(&self, stage: PlanStage) -> Result<(), StorageError> {
        if self.is_succeeded(stage) {
            return Err(StorageError::StageNotReady {
                stage: stage.to_string(),
                reason: "stage already succeeded".to_string(),
            });
        }
        if let Some(prev) = stage.predecessor() {
            if !self.is_succeeded(prev) {
                return Err(StorageError::StageNotReady {
                    stage: stage.to_string(),
                    reason: format!("{} has not succeeded", prev),
                });
            }
        }
        Ok(())
    }

    pub fn record(&mut self, stage: PlanStage, outcome: StageOutcome) -> Result<(), StorageError> {
        self.check_ready(stage)?;
        log::debug!("stage {} -> {:?}", stage, outcome);
        self.stages.insert(
            stage,
            StageRecord {
                outcome,
                recorded_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Load saved progress; a missing file is a fresh run.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| StorageError::Configuration(format!("corrupt plan progress {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StorageError::Configuration(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }
}
