// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod process_invoker;
pub mod time_provider;

// Re-exports
pub use id_provider::{IdProvider, SequentialIdProvider, UuidProvider};
pub use process_invoker::{ProcessInvoker, ProcessOutput};
pub use time_provider::{SteppingTimeProvider, SystemTimeProvider, TimeProvider};

#[cfg(any(test, feature = "mocks"))]
pub use process_invoker::MockProcessInvoker;
