pub mod config;
pub mod disk;
pub mod error;
pub mod naming;
pub mod plan;
pub mod proposal;
pub mod scanner;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod topology;

pub use config::{Config, PlanConfig, PolicyConfig, TopologyConfig};
pub use disk::{human_size, Disk, Partition};
pub use error::StorageError;
pub use naming::{base_disk_path, device_family, DeviceFamily};
pub use plan::{PlanProgress, PlanStage, PlanStep, StageOutcome};
pub use proposal::{DiskSelection, Proposal, ProposalEngine, RedundancyPolicy, Scheme, SizeLookup};
pub use scanner::{build_inventory, DiskScanner};
pub use topology::{parse_lsblk_json, normalize_root_source, BlockDevice, DeviceKind, TopologyReport, TopologySource};
