// ID Provider Port (for deterministic workspace names in tests)

use std::sync::atomic::{AtomicU64, Ordering};

/// ID provider interface
pub trait IdProvider: Send + Sync {
    /// Generate a new unique ID, safe to embed in a directory name
    fn generate_id(&self) -> String;
}

/// Random UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Counter-based provider: "0", "1", "2", ...
#[derive(Default)]
pub struct SequentialIdProvider {
    next: AtomicU64,
}

impl SequentialIdProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdProvider for SequentialIdProvider {
    fn generate_id(&self) -> String {
        self.next.fetch_add(1, Ordering::SeqCst).to_string()
    }
}
