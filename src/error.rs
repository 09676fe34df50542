//! Typed error taxonomy.
//!
//! Each component gets its own error enum so callers can match on *kind*
//! (e.g. the processor's ack-vs-nack decision) rather than downcasting an
//! opaque `anyhow::Error`. Root causes are kept as `#[source]` so logging and
//! `anyhow` context chains at the dispatcher still show the full story.

use thiserror::Error;

/// Errors surfaced by the database connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The connector has been shut down, or no connection has ever been
    /// established and the supervising context was cancelled while waiting.
    #[error("database connections unavailable: {0}")]
    Unavailable(String),

    /// `reconnect()` was called after the dialer task already terminated.
    #[error("no connection worker is running")]
    NoWorker,
}

/// Errors decoding a bus payload into a canonical [`crate::scan::Scan`].
#[derive(Debug, Error)]
pub enum DataError {
    #[error("malformed scan payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported data_version: {0}")]
    UnsupportedVersion(i64),

    #[error("data_version {0} is missing its `{1}` field")]
    MissingField(i64, &'static str),

    #[error("response_bytes_utf8 is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("decoded response is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("invalid ip address: {0}")]
    InvalidIp(#[from] std::net::AddrParseError),
}

/// Errors from the scan-entry repository (upsert, schema bootstrap).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("connector: {0}")]
    Connector(#[from] ConnectorError),

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] tokio_postgres::Error),

    #[error("scan entry upsert failed: {0}")]
    ScanEntry(#[source] tokio_postgres::Error),

    #[error("schema bootstrap failed: {0}")]
    Schema(#[source] tokio_postgres::Error),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] tokio_postgres::Error),
}

/// Errors talking to the message bus.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus client error: {0}")]
    Client(String),

    #[error("topic {0} does not exist")]
    TopicMissing(String),
}

/// Fatal errors for the processor's subscription lifecycle.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("connector: {0}")]
    Connector(#[from] ConnectorError),

    #[error("bus: {0}")]
    Bus(#[from] BusError),

    #[error("repository: {0}")]
    Repository(#[from] RepositoryError),
}

/// Fatal errors for the `schema` subcommand.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{0}")]
    Repository(#[from] RepositoryError),
}
