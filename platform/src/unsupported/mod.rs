use ryvie_core::{StorageError, TopologyConfig, TopologyReport, TopologySource};

/// Stand-in for hosts without lsblk. Every query fails.
pub struct UnsupportedTopology {
    config: TopologyConfig,
}

impl UnsupportedTopology {
    pub fn new(config: TopologyConfig) -> Self {
        Self { config }
    }

    fn unsupported(&self) -> StorageError {
        StorageError::query(
            self.config.lsblk.as_str(),
            format!("block device topology is not available on {}", std::env::consts::OS),
        )
    }
}

#[async_trait::async_trait]
impl TopologySource for UnsupportedTopology {
    async fn block_devices(&self) -> Result<TopologyReport, StorageError> {
        Err(self.unsupported())
    }

    async fn root_source(&self) -> Result<String, StorageError> {
        Err(self.unsupported())
    }

    async fn disk_sizes(&self) -> Result<TopologyReport, StorageError> {
        Err(self.unsupported())
    }
}
