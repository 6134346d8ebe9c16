//! Disk inventory: turns a raw topology report into [`Disk`] entries.

use crate::disk::{human_size, Disk, Partition, HEALTH_UNKNOWN, PARTITION_KIND};
use crate::naming::base_disk_path;
use crate::topology::{BlockDevice, DeviceKind, TopologyReport, TopologySource};
use crate::StorageError;
use std::collections::HashSet;

pub struct DiskScanner<'a> {
    source: &'a dyn TopologySource,
    device_prefix: String,
}

impl<'a> DiskScanner<'a> {
    pub fn new(source: &'a dyn TopologySource, device_prefix: impl Into<String>) -> Self {
        Self {
            source,
            device_prefix: device_prefix.into(),
        }
    }

    /// Query the topology source and build the inventory. Both queries must
    /// succeed; there is no partial result.
    pub async fn scan(&self) -> Result<Vec<Disk>, StorageError> {
        let report = self.source.block_devices().await?;
        let root = self.source.root_source().await?;
        log::debug!("root filesystem is backed by {}", root);
        build_inventory(&report, &root, &self.device_prefix)
    }
}

/// Build the disk list from an already fetched report.
pub fn build_inventory(
    report: &TopologyReport,
    root_source: &str,
    device_prefix: &str,
) -> Result<Vec<Disk>, StorageError> {
    let root_base = base_disk_path(root_source);
    let mut seen = HashSet::new();
    let mut disks = Vec::new();

    for device in report.disks() {
        let disk = build_disk(device, &root_base, device_prefix);
        if !seen.insert(disk.id.clone()) {
            return Err(StorageError::TopologyParse(format!(
                "duplicate device {} in topology report",
                disk.id
            )));
        }
        disks.push(disk);
    }

    // Roots on device-mapper, LVM or crypt volumes have no partition-style base
    // path; fall back to the disk whose subtree holds the root device.
    if !disks.iter().any(|d| d.is_system) {
        let owner = report
            .disks()
            .position(|d| d.contains_path(device_prefix, root_source));
        if let Some(idx) = owner {
            log::debug!("root {} resolved through device tree to {}", root_source, disks[idx].id);
            disks[idx].is_system = true;
        }
    }

    let skipped = report.devices.len() - disks.len();
    if skipped > 0 {
        log::debug!("skipped {} non-disk top-level devices", skipped);
    }
    Ok(disks)
}

fn build_disk(device: &BlockDevice, root_base: &str, device_prefix: &str) -> Disk {
    let id = device.path(device_prefix);

    let partitions: Vec<Partition> = device
        .children
        .iter()
        .filter(|child| child.kind == DeviceKind::Partition)
        .map(|child| Partition {
            path: child.path(device_prefix),
            size_bytes: child.size,
            fs: child.fstype.clone().unwrap_or_default(),
            kind: PARTITION_KIND.to_string(),
        })
        .collect();

    let first_mounted_child = device
        .children
        .iter()
        .filter(|child| child.kind == DeviceKind::Partition)
        .find_map(|child| child.mountpoint.clone());

    let mountpoint = device
        .mountpoint
        .clone()
        .or(first_mounted_child)
        .unwrap_or_default();

    Disk {
        is_system: base_disk_path(&id) == root_base,
        stable_id: device.wwn.clone().or_else(|| device.serial.clone()),
        device: device.name.clone(),
        model: device.model.clone(),
        size_bytes: device.size,
        size_human: human_size(device.size),
        is_mounted: !mountpoint.is_empty(),
        mountpoint,
        health: HEALTH_UNKNOWN.to_string(),
        partitions,
        id,
    }
}
