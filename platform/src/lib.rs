#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod unsupported;

#[cfg(target_os = "linux")]
pub use linux::LsblkTopology as PlatformTopology;

#[cfg(not(target_os = "linux"))]
pub use unsupported::UnsupportedTopology as PlatformTopology;
