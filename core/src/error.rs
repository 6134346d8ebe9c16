use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{tool} failed: {message}")]
    TopologyQuery { tool: String, message: String },

    #[error("Unparseable topology data: {0}")]
    TopologyParse(String),

    #[error("diskIds is required")]
    MissingDiskIds,

    #[error("diskIds must be an array of strings")]
    InvalidDiskIds,

    #[error("At least two disks are required, got {0}")]
    NeedAtLeastTwoDisks(usize),

    #[error("Unknown disks in selection: {}", .0.join(", "))]
    UnknownDisks(Vec<String>),

    #[error("Command not implemented: {0}")]
    NotImplemented(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid argument payload: {0}")]
    ArgsParse(String),

    #[error("Stage {stage} is not ready: {reason}")]
    StageNotReady { stage: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    pub fn query(tool: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::TopologyQuery {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Stable tag carried in the `error` field of a response envelope.
    pub fn tag(&self) -> &'static str {
        match self {
            StorageError::TopologyQuery { .. } => "lsblk_failed",
            StorageError::TopologyParse(_) => "parse_failed",
            StorageError::MissingDiskIds => "missing_diskIds",
            StorageError::InvalidDiskIds => "invalid_diskIds",
            StorageError::NeedAtLeastTwoDisks(_) => "need_at_least_two_disks",
            StorageError::UnknownDisks(_) => "unknown_disks_in_selection",
            StorageError::NotImplemented(_) => "not_implemented",
            StorageError::UnknownCommand(_) => "unknown_command",
            StorageError::ArgsParse(_) => "parse_error",
            StorageError::StageNotReady { .. } => "stage_not_ready",
            StorageError::Configuration(_) => "config_error",
            StorageError::IoError(_) => "io_error",
        }
    }

    /// Underlying message worth surfacing next to the tag, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            StorageError::TopologyQuery { tool, message } => Some(format!("{}: {}", tool, message)),
            StorageError::TopologyParse(msg)
            | StorageError::ArgsParse(msg)
            | StorageError::Configuration(msg) => Some(msg.clone()),
            StorageError::UnknownDisks(ids) => Some(ids.join(",")),
            StorageError::StageNotReady { reason, .. } => Some(reason.clone()),
            StorageError::IoError(e) => Some(e.to_string()),
            StorageError::MissingDiskIds
            | StorageError::InvalidDiskIds
            | StorageError::NeedAtLeastTwoDisks(_)
            | StorageError::NotImplemented(_)
            | StorageError::UnknownCommand(_) => None,
        }
    }
}
