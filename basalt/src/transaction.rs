use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_TRANSACTION_ID: AtomicU32 = AtomicU32::new(1);

/// An opaque 32-bit transaction identifier, minted from a process-global
/// monotonic counter. Lifecycle: begin, then commit or abort, driven by the
/// buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u32);

impl TransactionId {
    /// Mint a fresh identifier.
    #[allow(clippy::new_without_default)]
    pub fn new() -> TransactionId {
        TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Rebuild an identifier from its wire form (log decoding).
    pub fn from_u32(raw: u32) -> TransactionId {
        TransactionId(raw)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
