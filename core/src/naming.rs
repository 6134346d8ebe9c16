//! Kernel block-device naming rules.
//!
//! Partitions of disks whose name ends in a digit get a `p` separator
//! (`nvme0n1p3`, `mmcblk0p1`); everything else appends the partition number
//! directly (`sda2`). A blanket "strip trailing digits" would turn `nvme0n1`
//! into `nvme0n`, so the family has to be known first.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    /// `nvme0n1p2`, `mmcblk0p1`, `nbd0p1`, `loop0p1`, `md127p1`
    PSeparated,
    /// `sda2`, `vdb1`, `hdc3`, `xvda1`
    Traditional,
    /// device-mapper, zram and anything unrecognised
    Other,
}

const P_SEPARATED: [&str; 5] = ["nvme", "mmcblk", "nbd", "loop", "md"];
const TRADITIONAL: [&str; 4] = ["xvd", "sd", "vd", "hd"];

pub fn device_family(name: &str) -> DeviceFamily {
    let starts_with_letters = |prefix: &str| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_lowercase())
    };
    let starts_with_digit = |prefix: &str| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
    };

    if P_SEPARATED.iter().any(|p| starts_with_digit(p)) {
        DeviceFamily::PSeparated
    } else if TRADITIONAL.iter().any(|p| starts_with_letters(p)) {
        DeviceFamily::Traditional
    } else {
        DeviceFamily::Other
    }
}

/// Whole-disk device path underlying `path`.
///
/// A leading `/dev/` (or any directory part) is kept as-is; only the final
/// name component is rewritten.
pub fn base_disk_path(path: &str) -> String {
    let (dir, name) = match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    };
    format!("{}{}", dir, base_disk_name(name))
}

pub fn base_disk_name(name: &str) -> &str {
    match device_family(name) {
        DeviceFamily::PSeparated => strip_p_suffix(name),
        DeviceFamily::Traditional => name.trim_end_matches(|c: char| c.is_ascii_digit()),
        DeviceFamily::Other => name,
    }
}

fn strip_p_suffix(name: &str) -> &str {
    let without_digits = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if without_digits.len() == name.len() {
        return name;
    }
    match without_digits.strip_suffix('p') {
        Some(base) if base.ends_with(|c: char| c.is_ascii_digit()) => base,
        _ => name,
    }
}
