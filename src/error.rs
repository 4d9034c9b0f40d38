//! Error types for the tracker

use thiserror::Error;

/// Errors that can occur while talking to the spreadsheet or handling tasks
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spreadsheet API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error(
        "The Google Drive API is not enabled for this project. Enable it at https://console.cloud.google.com/apis/library/drive.googleapis.com"
    )]
    DriveApiDisabled,

    #[error("Spreadsheet '{0}' not found. Check the name and that it is shared with the service account email")]
    SpreadsheetNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Field '{0}' does not exist in the spreadsheet")]
    UnknownField(String),

    #[error("Conflict detected: {0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Spreadsheet has no header row")]
    MissingHeaders,

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Chart rendering failed: {0}")]
    Chart(String),

    #[error("Template error: {0}")]
    Template(String),
}

impl TrackerError {
    /// Whether the remote API asked us to slow down
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, TrackerError::RateLimited(_))
    }

    /// Errors that no amount of retrying will fix
    ///
    /// Client-side API failures (4xx) count as permanent; 429 arrives as
    /// [`TrackerError::RateLimited`] and keeps being retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            TrackerError::Api { status, .. } => (400..500).contains(status) && *status != 429,
            TrackerError::Config(_)
            | TrackerError::Auth(_)
            | TrackerError::DriveApiDisabled
            | TrackerError::SpreadsheetNotFound(_)
            | TrackerError::NotFound(_)
            | TrackerError::UnknownField(_)
            | TrackerError::Validation(_) => true,
            _ => false,
        }
    }
}

/// Result type alias for tracker operations
pub type TrackerResult<T> = Result<T, TrackerError>;
