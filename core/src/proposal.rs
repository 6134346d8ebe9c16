//! Redundancy proposal: classify a disk selection into a scheme, estimate
//! usable capacity and describe the provisioning plan.
//!
//! The policy only ever proposes single-fault-tolerant layouts. No striping
//! without redundancy is offered and tolerance never exceeds one disk.

use crate::config::{Config, PlanConfig};
use crate::plan::{PlanStage, PlanStep};
use crate::topology::{TopologyReport, TopologySource};
use crate::StorageError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const DISK_IDS_FIELD: &str = "diskIds";

const PERSISTED_FILES: [&str; 2] = ["/etc/mdadm/mdadm.conf", "/etc/fstab"];
const MOUNT_OPTIONS: [&str; 2] = ["defaults", "nofail"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scheme {
    #[serde(rename = "raid1")]
    Raid1,
    #[serde(rename = "raid5")]
    Raid5,
    #[serde(rename = "shr-like")]
    ShrLike,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Raid1 => "raid1",
            Scheme::Raid5 => "raid5",
            Scheme::ShrLike => "shr-like",
        }
    }

    fn md_level(&self) -> &'static str {
        match self {
            Scheme::Raid1 => "raid1",
            Scheme::Raid5 => "raid5",
            Scheme::ShrLike => "tiered",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub scheme: Scheme,
    pub capacity_bytes: u64,
    pub fault_tolerance: u32,
}

/// Heuristic used to pick a scheme. The tolerance is policy, not a property
/// of the hardware, so it is a value rather than a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedundancyPolicy {
    tolerance_divisor: u64,
}

impl Default for RedundancyPolicy {
    fn default() -> Self {
        Self { tolerance_divisor: 20 }
    }
}

impl RedundancyPolicy {
    pub fn new(tolerance_divisor: u64) -> Self {
        Self {
            tolerance_divisor: tolerance_divisor.max(1),
        }
    }

    /// Sizes within `min / divisor` of the smallest disk (5% by default).
    pub fn roughly_equal(&self, min: u64, max: u64) -> bool {
        max - min <= min / self.tolerance_divisor
    }

    /// Classify at least two resolved sizes.
    pub fn classify(&self, sizes: &[u64]) -> Classification {
        let n = sizes.len() as u64;
        let min = sizes.iter().copied().min().unwrap_or(0);
        let max = sizes.iter().copied().max().unwrap_or(0);
        let sum = sizes.iter().fold(0u64, |acc, s| acc.saturating_add(*s));

        let (scheme, capacity_bytes) = if n == 2 {
            (Scheme::Raid1, min)
        } else if self.roughly_equal(min, max) {
            (Scheme::Raid5, n.saturating_sub(1).saturating_mul(min))
        } else {
            (Scheme::ShrLike, sum.saturating_sub(max))
        };

        log::debug!(
            "classified {} disks (min {}, max {}) as {}",
            n,
            min,
            max,
            scheme
        );
        Classification {
            scheme,
            capacity_bytes,
            fault_tolerance: 1,
        }
    }
}

/// One size tier of a heterogeneous pool: a slice carved from every member
/// at least as large as the tier boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    pub slice_bytes: u64,
    pub members: usize,
    pub level: String,
    pub capacity_bytes: u64,
}

pub fn size_tiers(sizes: &[u64]) -> Vec<Tier> {
    let mut boundaries: Vec<u64> = sizes.to_vec();
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut tiers = Vec::new();
    let mut previous = 0u64;
    for boundary in boundaries {
        let slice_bytes = boundary - previous;
        previous = boundary;
        if slice_bytes == 0 {
            continue;
        }
        let members = sizes.iter().filter(|s| **s >= boundary).count();
        let (level, capacity_bytes) = match members {
            0 | 1 => ("none", 0),
            2 => ("raid1", slice_bytes),
            m => ("raid5", slice_bytes.saturating_mul(m as u64 - 1)),
        };
        tiers.push(Tier {
            slice_bytes,
            members,
            level: level.to_string(),
            capacity_bytes,
        });
    }
    tiers
}

/// Caller-supplied disk identifiers, order and duplicates preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSelection {
    ids: Vec<String>,
}

impl DiskSelection {
    pub fn from_args(args: &Map<String, Value>) -> Result<Self, StorageError> {
        let value = args.get(DISK_IDS_FIELD).ok_or(StorageError::MissingDiskIds)?;
        let items = value.as_array().ok_or(StorageError::InvalidDiskIds)?;
        let ids = items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(StorageError::InvalidDiskIds)?;

        if ids.len() < 2 {
            return Err(StorageError::NeedAtLeastTwoDisks(ids.len()));
        }
        Ok(Self { ids })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

/// Disk sizes keyed by device path.
#[derive(Debug, Clone, Default)]
pub struct SizeLookup {
    sizes: HashMap<String, u64>,
}

impl SizeLookup {
    /// Only whole disks are resolvable. A device listed twice rejects the
    /// report, as it does for the inventory.
    pub fn from_report(report: &TopologyReport, device_prefix: &str) -> Result<Self, StorageError> {
        let mut sizes = HashMap::new();
        for disk in report.disks() {
            let id = disk.path(device_prefix);
            if sizes.insert(id.clone(), disk.size).is_some() {
                return Err(StorageError::TopologyParse(format!(
                    "duplicate device {} in size report",
                    id
                )));
            }
        }
        Ok(Self { sizes })
    }

    pub fn get(&self, id: &str) -> Option<u64> {
        self.sizes.get(id).copied()
    }

    /// Resolve every selected id or fail listing the unknown ones.
    pub fn resolve(&self, selection: &DiskSelection) -> Result<Vec<u64>, StorageError> {
        let mut unknown = Vec::new();
        let mut seen = HashSet::new();
        let mut sizes = Vec::with_capacity(selection.ids().len());

        for id in selection.ids() {
            match self.get(id) {
                Some(size) => sizes.push(size),
                None => {
                    if seen.insert(id.as_str()) {
                        unknown.push(id.clone());
                    }
                }
            }
        }

        if unknown.is_empty() {
            Ok(sizes)
        } else {
            Err(StorageError::UnknownDisks(unknown))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub selected_disks: Vec<String>,
    pub suggested: Scheme,
    pub capacity_bytes: u64,
    pub fault_tolerance: u32,
    pub plan_preview: Vec<PlanStep>,
}

pub fn build_proposal(
    selection: &DiskSelection,
    sizes: &[u64],
    policy: &RedundancyPolicy,
    plan: &PlanConfig,
) -> Proposal {
    let classification = policy.classify(sizes);
    let tiers = match classification.scheme {
        Scheme::ShrLike => size_tiers(sizes),
        Scheme::Raid1 | Scheme::Raid5 => Vec::new(),
    };

    let disks = selection.ids().to_vec();
    let plan_preview = PlanStage::ALL
        .into_iter()
        .map(|stage| match stage {
            PlanStage::Partition => PlanStep::Partition {
                disks: disks.clone(),
                table: plan.partition_table.clone(),
            },
            PlanStage::Mdadm => PlanStep::Mdadm {
                level: classification.scheme.md_level().to_string(),
                device: plan.md_device.clone(),
                members: disks.clone(),
                tiers: tiers.clone(),
            },
            PlanStage::Persist => PlanStep::Persist {
                files: PERSISTED_FILES.iter().map(|f| f.to_string()).collect(),
            },
            PlanStage::Lvm => PlanStep::Lvm {
                volume_group: plan.volume_group.clone(),
                logical_volume: plan.logical_volume.clone(),
            },
            PlanStage::Format => PlanStep::Format {
                filesystem: plan.filesystem.clone(),
            },
            PlanStage::Mount => PlanStep::Mount {
                target: plan.mount_target.clone(),
                options: MOUNT_OPTIONS.iter().map(|o| o.to_string()).collect(),
            },
        })
        .collect();

    Proposal {
        selected_disks: disks,
        suggested: classification.scheme,
        capacity_bytes: classification.capacity_bytes,
        fault_tolerance: classification.fault_tolerance,
        plan_preview,
    }
}

pub struct ProposalEngine<'a> {
    source: &'a dyn TopologySource,
    config: &'a Config,
}

impl<'a> ProposalEngine<'a> {
    pub fn new(source: &'a dyn TopologySource, config: &'a Config) -> Self {
        Self { source, config }
    }

    /// Validate the payload, then issue a fresh size query. The query is not
    /// tied to any earlier scan.
    pub async fn propose(&self, args: &Map<String, Value>) -> Result<Proposal, StorageError> {
        let selection = DiskSelection::from_args(args)?;
        let report = self.source.disk_sizes().await?;
        let lookup = SizeLookup::from_report(&report, &self.config.topology.device_prefix)?;
        let sizes = lookup.resolve(&selection)?;
        let policy = RedundancyPolicy::new(self.config.policy.tolerance_divisor);
        Ok(build_proposal(&selection, &sizes, &policy, &self.config.plan))
    }
}
