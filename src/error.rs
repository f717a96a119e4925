use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while moving INE data from the API to DuckDB.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("request to {url} failed with status {status}")]
    RequestFailed { url: String, status: StatusCode },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request had missing data: {0}")]
    DataMissing(String),

    #[error("response contained a null record")]
    NullRecord,

    #[error("invalid arguments: {0}")]
    ArgumentInvalid(String),

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duckdb error: {0}")]
    Db(#[from] duckdb::Error),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl EtlError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EtlError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = EtlError> = std::result::Result<T, E>;
