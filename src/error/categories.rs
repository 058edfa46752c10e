use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    // Sync pass errors
    Timeout,

    // Collaborator errors
    EventSource,
    Store,

    // Write rejections
    NotFound,
    Rejected,

    InternalError,
}

impl ErrorCategory {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout => "SYNC_TIMEOUT",
            Self::EventSource => "EVENT_SOURCE_ERROR",
            Self::Store => "STORE_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Rejected => "WRITE_REJECTED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Transient categories clear on a later pass without caller action;
    /// the engine re-polls the event source every sync.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::EventSource | Self::Store)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error_code())
    }
}
