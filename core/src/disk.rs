use serde::{Deserialize, Serialize};

/// One physical block device as presented to callers.
///
/// `id` is derived from the kernel device name and only stable for as long as
/// the kernel keeps its naming; `stable_id` carries the WWN or serial when the
/// topology source reports one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub id: String,
    pub stable_id: Option<String>,
    pub device: String,
    pub model: Option<String>,
    pub size_bytes: u64,
    pub size_human: String,
    pub is_system: bool,
    pub is_mounted: bool,
    pub mountpoint: String,
    pub health: String,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub path: String,
    pub size_bytes: u64,
    pub fs: String,
    #[serde(rename = "type")]
    pub kind: String,
}

pub const PARTITION_KIND: &str = "partition";
pub const HEALTH_UNKNOWN: &str = "unknown";

const UNIT_PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Binary-prefixed size string, e.g. `512 B`, `1.5 KiB`, `931.5 GiB`.
pub fn human_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut exp = 0;
    let mut value = bytes as f64 / UNIT as f64;
    // Step up while the one-decimal rendering would read 1024.0 or more.
    while (value * 10.0).round() >= (UNIT * 10) as f64 && exp < UNIT_PREFIXES.len() - 1 {
        value /= UNIT as f64;
        exp += 1;
    }
    format!("{:.1} {}iB", value, UNIT_PREFIXES[exp])
}
