//! Raw block-device topology as reported by the host.
//!
//! The report is a tree: whole disks at the top, partitions and device-mapper
//! children beneath them. It mirrors `lsblk -J -b` output but is decoupled from
//! the tool so the scanner and proposal engine can be fed from tests.

use crate::StorageError;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    Disk,
    Partition,
    Other(String),
}

impl DeviceKind {
    pub fn from_lsblk(kind: &str) -> Self {
        match kind {
            "disk" => DeviceKind::Disk,
            "part" | "partition" => DeviceKind::Partition,
            other => DeviceKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    pub kname: String,
    pub size: u64,
    pub kind: DeviceKind,
    pub fstype: Option<String>,
    pub mountpoint: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub wwn: Option<String>,
    pub children: Vec<BlockDevice>,
}

impl BlockDevice {
    pub fn path(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.kname)
    }

    pub fn is_mounted(&self) -> bool {
        self.mountpoint.is_some()
    }

    /// True if `path` names this device or anything beneath it. Mapper
    /// devices are also reachable under `<prefix>mapper/<name>`.
    pub fn contains_path(&self, prefix: &str, path: &str) -> bool {
        self.path(prefix) == path
            || format!("{}{}", prefix, self.name) == path
            || format!("{}mapper/{}", prefix, self.name) == path
            || self.children.iter().any(|c| c.contains_path(prefix, path))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyReport {
    pub devices: Vec<BlockDevice>,
}

impl TopologyReport {
    pub fn disks(&self) -> impl Iterator<Item = &BlockDevice> {
        self.devices.iter().filter(|d| d.kind == DeviceKind::Disk)
    }
}

/// Source of block-device topology for one invocation.
///
/// Each call is an independent query; two calls are not guaranteed to observe
/// the same snapshot of the host.
#[async_trait::async_trait]
pub trait TopologySource: Send + Sync {
    /// Full device tree including partitions and mount points.
    async fn block_devices(&self) -> Result<TopologyReport, StorageError>;

    /// Source device of the filesystem mounted at `/`.
    async fn root_source(&self) -> Result<String, StorageError>;

    /// Top-level devices with sizes only.
    async fn disk_sizes(&self) -> Result<TopologyReport, StorageError>;
}

#[derive(Deserialize)]
struct RawReport {
    blockdevices: Option<Vec<RawDevice>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}

#[derive(Deserialize)]
struct RawDevice {
    name: Option<String>,
    kname: Option<String>,
    size: Option<RawSize>,
    #[serde(rename = "type")]
    kind: Option<String>,
    fstype: Option<String>,
    mountpoint: Option<String>,
    mountpoints: Option<Vec<Option<String>>>,
    model: Option<String>,
    serial: Option<String>,
    wwn: Option<String>,
    children: Option<Vec<RawDevice>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawDevice {
    fn into_device(self) -> Result<BlockDevice, StorageError> {
        let name = non_empty(self.name)
            .ok_or_else(|| StorageError::TopologyParse("device entry without a name".to_string()))?;
        let kname = non_empty(self.kname).unwrap_or_else(|| name.clone());

        let size = match self.size {
            Some(RawSize::Bytes(bytes)) => bytes,
            Some(RawSize::Text(text)) => text.trim().parse::<u64>().map_err(|_| {
                StorageError::TopologyParse(format!("device {} has non-integral size {:?}", name, text))
            })?,
            None => {
                return Err(StorageError::TopologyParse(format!(
                    "device {} has no size",
                    name
                )))
            }
        };

        // Newer util-linux reports every mount of a device; the first one wins.
        let mountpoint = non_empty(self.mountpoint).or_else(|| {
            self.mountpoints
                .unwrap_or_default()
                .into_iter()
                .find_map(non_empty)
        });

        let kind = self
            .kind
            .as_deref()
            .map(DeviceKind::from_lsblk)
            .unwrap_or_else(|| DeviceKind::Other(String::new()));

        let children = self
            .children
            .unwrap_or_default()
            .into_iter()
            .map(RawDevice::into_device)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BlockDevice {
            name,
            kname,
            size,
            kind,
            fstype: non_empty(self.fstype),
            mountpoint,
            model: non_empty(self.model),
            serial: non_empty(self.serial),
            wwn: non_empty(self.wwn),
            children,
        })
    }
}

/// Parse `lsblk -J` output. Any structural problem rejects the whole report.
pub fn parse_lsblk_json(bytes: &[u8]) -> Result<TopologyReport, StorageError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| StorageError::TopologyParse(format!("lsblk output is not UTF-8: {}", e)))?;
    let raw: RawReport = serde_json::from_str(text)
        .map_err(|e| StorageError::TopologyParse(format!("invalid lsblk JSON: {}", e)))?;
    let devices = raw
        .blockdevices
        .ok_or_else(|| StorageError::TopologyParse("no blockdevices in lsblk output".to_string()))?
        .into_iter()
        .map(RawDevice::into_device)
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!("parsed topology report with {} top-level devices", devices.len());
    Ok(TopologyReport { devices })
}

/// Normalise the `SOURCE` column findmnt prints for `/`.
///
/// btrfs roots carry their subvolume in brackets (`/dev/sda2[/@]`).
pub fn normalize_root_source(raw: &str) -> Result<String, StorageError> {
    let first = raw.lines().map(str::trim).find(|l| !l.is_empty());
    let Some(source) = first else {
        return Err(StorageError::query("findmnt", "no filesystem mounted at /"));
    };
    let source = match source.find('[') {
        Some(idx) => &source[..idx],
        None => source,
    };
    Ok(source.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "blockdevices": [
            {"name": "sda", "kname": "sda", "size": 500107862016, "type": "disk",
             "fstype": null, "mountpoint": null, "model": "WDC WD5000", "serial": "WD-123", "wwn": "0x50014ee2",
             "children": [
                {"name": "sda1", "kname": "sda1", "size": 536870912, "type": "part", "fstype": "vfat", "mountpoint": "/boot/efi"},
                {"name": "sda2", "kname": "sda2", "size": "499570991104", "type": "part", "fstype": "ext4", "mountpoint": "/"}
             ]},
            {"name": "loop0", "kname": "loop0", "size": 4096, "type": "loop", "fstype": "squashfs", "mountpoint": "/snap/core/1"}
        ]
    }"#;

    #[test]
    fn test_parse_sample_report() {
        let report = parse_lsblk_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.devices.len(), 2);

        let sda = &report.devices[0];
        assert_eq!(sda.kind, DeviceKind::Disk);
        assert_eq!(sda.size, 500107862016);
        assert_eq!(sda.wwn.as_deref(), Some("0x50014ee2"));
        assert_eq!(sda.children.len(), 2);
        assert_eq!(sda.children[1].size, 499570991104);
        assert_eq!(sda.children[1].kind, DeviceKind::Partition);

        assert_eq!(report.disks().count(), 1);
        assert_eq!(report.devices[1].kind, DeviceKind::Other("loop".to_string()));
    }

    #[test]
    fn test_mountpoints_array_is_used_when_mountpoint_missing() {
        let json = r#"{"blockdevices": [
            {"name": "nvme0n1", "size": 1000, "type": "disk", "mountpoints": [null, "", "/home"]}
        ]}"#;
        let report = parse_lsblk_json(json.as_bytes()).unwrap();
        let disk = &report.devices[0];
        assert_eq!(disk.kname, "nvme0n1");
        assert_eq!(disk.mountpoint.as_deref(), Some("/home"));
    }

    #[test]
    fn test_empty_strings_become_none() {
        let json = r#"{"blockdevices": [
            {"name": "sdb", "size": 10, "type": "disk", "fstype": "", "mountpoint": "  "}
        ]}"#;
        let report = parse_lsblk_json(json.as_bytes()).unwrap();
        assert!(report.devices[0].fstype.is_none());
        assert!(!report.devices[0].is_mounted());
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        let cases: [&[u8]; 6] = [
            b"not json",
            b"{}",
            br#"{"blockdevices": [{"size": 1, "type": "disk"}]}"#,
            br#"{"blockdevices": [{"name": "sda", "type": "disk"}]}"#,
            br#"{"blockdevices": [{"name": "sda", "size": "12G", "type": "disk"}]}"#,
            b"\xff\xfe",
        ];
        for case in cases {
            let err = parse_lsblk_json(case).unwrap_err();
            assert_eq!(err.tag(), "parse_failed", "payload {:?}", String::from_utf8_lossy(case));
        }
    }

    #[test]
    fn test_malformed_child_rejects_report() {
        let json = r#"{"blockdevices": [
            {"name": "sda", "size": 10, "type": "disk", "children": [{"name": "sda1", "size": -1, "type": "part"}]}
        ]}"#;
        assert!(parse_lsblk_json(json.as_bytes()).is_err());
    }

    #[test]
    fn test_normalize_root_source() {
        assert_eq!(normalize_root_source("/dev/sda2\n").unwrap(), "/dev/sda2");
        assert_eq!(normalize_root_source("/dev/nvme0n1p3[/@]").unwrap(), "/dev/nvme0n1p3");
        assert_eq!(normalize_root_source("\n  \n").unwrap_err().tag(), "lsblk_failed");
    }

    #[test]
    fn test_contains_path_walks_children() {
        let report = parse_lsblk_json(SAMPLE.as_bytes()).unwrap();
        let sda = &report.devices[0];
        assert!(sda.contains_path("/dev/", "/dev/sda2"));
        assert!(!sda.contains_path("/dev/", "/dev/sdb1"));
    }
}
