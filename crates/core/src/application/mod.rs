// Application Layer - The container execution adapter

pub mod constants;
pub mod resolver;
pub mod runner;
pub mod session;
pub mod translator;
pub mod workspace;

// Re-exports
pub use resolver::ImageResolver;
pub use runner::SingularityRunner;
pub use session::Session;
pub use translator::CommandTranslator;
pub use workspace::WorkspaceManager;
