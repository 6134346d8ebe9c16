use ryvie_core::{normalize_root_source, parse_lsblk_json, StorageError, TopologyConfig, TopologyReport, TopologySource};
use std::path::PathBuf;
use tokio::process::Command;

const TREE_ARGS: [&str; 4] = ["-J", "-b", "-o", "NAME,KNAME,SIZE,TYPE,FSTYPE,MOUNTPOINT,MODEL,SERIAL,WWN"];
const SIZE_ARGS: [&str; 5] = ["-J", "-b", "-d", "-o", "NAME,KNAME,SIZE,TYPE"];
const ROOT_ARGS: [&str; 4] = ["-n", "-o", "SOURCE", "/"];

/// Topology source backed by util-linux `lsblk` and `findmnt`.
///
/// Each query spawns the tool and waits for it; there is no timeout.
pub struct LsblkTopology {
    config: TopologyConfig,
}

impl LsblkTopology {
    pub fn new(config: TopologyConfig) -> Self {
        Self { config }
    }

    fn resolve(program: &str) -> Result<PathBuf, StorageError> {
        which::which(program)
            .map_err(|e| StorageError::query(program, format!("not found: {}", e)))
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, StorageError> {
        let path = Self::resolve(program)?;
        log::debug!("running {} {}", path.display(), args.join(" "));

        let output = Command::new(&path)
            .args(args)
            .output()
            .await
            .map_err(|e| StorageError::query(program, format!("failed to run: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(StorageError::query(program, message));
        }
        Ok(output.stdout)
    }
}

#[async_trait::async_trait]
impl TopologySource for LsblkTopology {
    async fn block_devices(&self) -> Result<TopologyReport, StorageError> {
        let stdout = self.run(&self.config.lsblk, &TREE_ARGS).await?;
        parse_lsblk_json(&stdout)
    }

    async fn root_source(&self) -> Result<String, StorageError> {
        let stdout = self.run(&self.config.findmnt, &ROOT_ARGS).await?;
        normalize_root_source(&String::from_utf8_lossy(&stdout))
    }

    async fn disk_sizes(&self) -> Result<TopologyReport, StorageError> {
        let stdout = self.run(&self.config.lsblk, &SIZE_ARGS).await?;
        parse_lsblk_json(&stdout)
    }
}
