//! Application-wide constants.
//!
//! Centralizes the few magic numbers the ingestion pipeline depends on, so the
//! reconnect/backoff/timeout behavior documented in the design notes has a
//! single source of truth.

use std::time::Duration;

// ============================================================================
// Connector
// ============================================================================

/// Fixed backoff between failed dial attempts. Deliberately not exponential:
/// operators watching the logs should see a predictable retry cadence.
pub const DIAL_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// How long `Connector::borrow` waits for a connection to appear before it
/// triggers a reconnect and waits again.
pub const BORROW_WAIT: Duration = Duration::from_secs(1);

// ============================================================================
// Processor
// ============================================================================

/// Number of concurrent workers draining the subscription's message channel.
///
/// The bus client is permitted to deliver concurrently and no per-message
/// mutable state is shared, so a small worker pool is safe; this bounds how
/// many upserts can be in flight at once.
pub const PROCESSOR_WORKER_COUNT: usize = 4;

/// Channel capacity between the bus adapter and the processor's worker pool.
pub const PROCESSOR_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Message bus
// ============================================================================

/// Delay before retrying a `pull` that returned zero messages. An empty pull
/// is a routine idle poll, not a subscription closure; this just avoids a
/// busy loop against the bus client.
pub const PUBSUB_EMPTY_PULL_BACKOFF: Duration = Duration::from_millis(500);
