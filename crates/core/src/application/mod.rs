// Application Layer - Use Cases and Business Logic

pub mod dispatcher;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod shutdown;

// Re-exports
pub use dispatcher::NotificationDispatcher;
pub use orchestrator::{
    OrchestratorConfig, OrchestratorDeps, ProcessingOrchestrator, UploadedFile,
};
pub use queue::{Job, JobHandler, JobQueue, QueueConfig};
pub use registry::{ConnectionHandle, ConnectionRegistry, HandshakeRejection};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
