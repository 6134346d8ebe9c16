mod lsblk;

pub use lsblk::LsblkTopology;
