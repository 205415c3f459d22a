use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation id carried in the `sync` header field.
pub type RequestId = u64;

/// Issues increasing request ids. The counter wraps on overflow; skipping ids
/// that are still in flight is the job of the pending table.
#[derive(Debug, Default)]
pub struct RequestIdCounter {
    next: AtomicU64,
}

impl RequestIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(id: RequestId) -> Self {
        Self {
            next: AtomicU64::new(id),
        }
    }

    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
