use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by job and step executions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Execution record created, nothing has run yet
    #[default]
    Starting,
    /// Execution is running (master: partition planning has begun)
    Started,
    /// Execution finished successfully
    Completed,
    /// Execution finished with an error
    Failed,
}

impl BatchStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Combine two statuses, keeping the worse one
    ///
    /// Used when rolling partition results into a master status: any FAILED wins,
    /// otherwise an unfinished partition keeps the aggregate unfinished.
    pub fn upgrade_to(self, other: BatchStatus) -> BatchStatus {
        self.max(other)
    }

    fn severity(&self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Starting => 1,
            Self::Started => 2,
            Self::Failed => 3,
        }
    }

    fn max(self, other: BatchStatus) -> BatchStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "STARTING"),
            Self::Started => write!(f, "STARTED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STARTING" => Ok(Self::Starting),
            "STARTED" => Ok(Self::Started),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid batch status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(!BatchStatus::Starting.is_terminal());
        assert!(!BatchStatus::Started.is_terminal());
    }

    #[test]
    fn test_upgrade_keeps_failure() {
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Failed),
            BatchStatus::Failed
        );
        assert_eq!(
            BatchStatus::Failed.upgrade_to(BatchStatus::Completed),
            BatchStatus::Failed
        );
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Completed),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::Completed.upgrade_to(BatchStatus::Started),
            BatchStatus::Started
        );
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(BatchStatus::Completed.to_string(), "COMPLETED");
        assert_eq!("failed".parse::<BatchStatus>().unwrap(), BatchStatus::Failed);
        assert!("unknown".parse::<BatchStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&BatchStatus::Started).unwrap();
        assert_eq!(json, "\"STARTED\"");

        let parsed: BatchStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, BatchStatus::Started);
    }
}
