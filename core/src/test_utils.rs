/// Test doubles for the topology source - NEVER touches real hardware
use crate::topology::{BlockDevice, DeviceKind, TopologyReport, TopologySource};
use crate::StorageError;
use std::sync::{Arc, Mutex};

/// Whole-disk entry with no children.
pub fn disk(name: &str, size: u64) -> BlockDevice {
    BlockDevice {
        name: name.to_string(),
        kname: name.to_string(),
        size,
        kind: DeviceKind::Disk,
        fstype: None,
        mountpoint: None,
        model: None,
        serial: None,
        wwn: None,
        children: Vec::new(),
    }
}

pub fn partition(name: &str, size: u64, fstype: Option<&str>, mountpoint: Option<&str>) -> BlockDevice {
    BlockDevice {
        kind: DeviceKind::Partition,
        fstype: fstype.map(str::to_string),
        mountpoint: mountpoint.map(str::to_string),
        ..disk(name, size)
    }
}

impl BlockDevice {
    pub fn with_children(mut self, children: Vec<BlockDevice>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Clone, Debug)]
enum Failure {
    Query { tool: String, message: String },
    Parse(String),
}

impl Failure {
    fn to_error(&self) -> StorageError {
        match self {
            Failure::Query { tool, message } => StorageError::query(tool.clone(), message.clone()),
            Failure::Parse(msg) => StorageError::TopologyParse(msg.clone()),
        }
    }
}

/// In-memory topology source with canned answers.
pub struct MockTopology {
    report: TopologyReport,
    size_report: Option<TopologyReport>,
    root: String,
    failure: Option<Failure>,
    call_count: Arc<Mutex<usize>>,
}

impl MockTopology {
    pub fn new(report: TopologyReport, root: &str) -> Self {
        Self {
            report,
            size_report: None,
            root: root.to_string(),
            failure: None,
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Answer size queries from a different report, as if the host changed
    /// between two queries.
    pub fn with_size_report(mut self, report: TopologyReport) -> Self {
        self.size_report = Some(report);
        self
    }

    /// Every query fails with an error of the same class as `err`.
    pub fn failing_with(mut self, err: StorageError) -> Self {
        self.failure = Some(match err {
            StorageError::TopologyQuery { tool, message } => Failure::Query { tool, message },
            StorageError::TopologyParse(msg) => Failure::Parse(msg),
            other => Failure::Parse(other.to_string()),
        });
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    fn enter(&self) -> Result<(), StorageError> {
        *self.call_count.lock().unwrap() += 1;
        match &self.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl TopologySource for MockTopology {
    async fn block_devices(&self) -> Result<TopologyReport, StorageError> {
        self.enter()?;
        Ok(self.report.clone())
    }

    async fn root_source(&self) -> Result<String, StorageError> {
        self.enter()?;
        Ok(self.root.clone())
    }

    async fn disk_sizes(&self) -> Result<TopologyReport, StorageError> {
        self.enter()?;
        if let Some(report) = &self.size_report {
            return Ok(report.clone());
        }
        let devices = self
            .report
            .devices
            .iter()
            .map(|d| BlockDevice {
                children: Vec::new(),
                ..d.clone()
            })
            .collect();
        Ok(TopologyReport { devices })
    }
}
