//! Transaction runner.
//!
//! The original threaded a callback through `RunTransaction(ctx, body)` and
//! relied on a deferred rollback if `body` didn't commit. `tokio_postgres`'s
//! `Transaction` already rolls back on `Drop`, so the idiomatic equivalent
//! here is RAII: `begin()` hands back a transaction id and a held client
//! guard, and the caller either commits or lets the guard fall out of scope.

use tokio::sync::OwnedMutexGuard;
use tokio_postgres::Client;
use uuid::Uuid;

use crate::connector::Connector;
use crate::error::ConnectorError;

/// Produces transaction-scoped client borrows against a [`Connector`].
#[derive(Clone)]
pub struct TransactionRunner {
    connector: Connector,
}

impl TransactionRunner {
    pub fn new(connector: Connector) -> Self {
        TransactionRunner { connector }
    }

    /// Borrows the current connection and assigns a transaction id for
    /// logging/correlation. Callers begin the actual SQL transaction against
    /// the returned guard, since `tokio_postgres::Transaction<'_>` borrows
    /// from it and can't be returned from this function alongside the guard
    /// it borrows from.
    pub async fn begin(&self) -> Result<(Uuid, OwnedMutexGuard<Client>), ConnectorError> {
        let client = self.connector.borrow().await?;
        let guard = client.lock_owned().await;
        Ok((Uuid::new_v4(), guard))
    }
}
