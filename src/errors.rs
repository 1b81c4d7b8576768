use thiserror::Error;

/// Everything that can go wrong between Garmin and the output files.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected or expired credentials. Fatal; the user must re-authenticate.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Transport-level failure talking to Garmin. Not retried automatically;
    /// the next scheduled run will pick up where the history left off.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A fetched record is missing a key field.
    #[error("malformed leaderboard record: {0}")]
    DataFormat(String),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
