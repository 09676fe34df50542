//! Ingestion worker library: bus-delivered host-scan records to a relational store.
//!
//! See `connector` for the self-healing database connection, `processor` for the
//! message-driven pipeline, and `repository` for the persisted schema.

pub mod bus;
pub mod config;
pub mod connector;
pub mod constants;
pub mod error;
pub mod logging;
pub mod processor;
pub mod repository;
pub mod scan;
pub mod transaction;

pub use config::{Config, LoggingConfig, PostgresConfig, PubsubConfig};
pub use connector::Connector;
pub use error::{BusError, ConnectorError, DataError, ProcessorError, RepositoryError, SchemaError};
pub use processor::Processor;
pub use repository::{ScanEntry, ScanEntryRepository};
pub use scan::Scan;
pub use transaction::TransactionRunner;
