// ============================================================================
// Stock -> Index Synchronization
// ============================================================================
//
// Inline path: IndexSynchronizer tries the mirror right after a stock change
// and parks failures in the outbox.
// Background path: OutboxRelay drains the outbox with backoff and a DLQ.
//
// ============================================================================

mod relay;
mod synchronizer;

pub use relay::{OutboxRelay, RelayConfig, RelayStats};
pub use synchronizer::{IndexSynchronizer, SyncOutcome};
