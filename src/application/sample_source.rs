// Port the polling engine reads telemetry through
use crate::domain::sample::RawRecord;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("backend answered with HTTP {0}")]
    Status(u16),
    #[error("backend reported an error: {0}")]
    Backend(String),
    #[error("could not decode backend response: {0}")]
    Decode(String),
}

/// Result of asking the realtime endpoint for samples newer than a cursor
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeBatch {
    /// New records, newest first as the backend sends them
    NewData(Vec<RawRecord>),
    /// Nothing new; the backend may echo its current record
    Unchanged(Option<RawRecord>),
}

#[async_trait]
pub trait SampleSource: Send + Sync {
    /// Fetch records with an id greater than `cursor`
    async fn fetch_realtime(&self, cursor: i64) -> Result<RealtimeBatch, SourceError>;

    /// Fetch the single most recent record (bootstrap / fallback path)
    async fn fetch_latest(&self) -> Result<Option<RawRecord>, SourceError>;

    /// Fetch up to `limit` recent records, newest first
    async fn fetch_history(&self, limit: usize) -> Result<Vec<RawRecord>, SourceError>;
}
