pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod telemetry;
pub mod transcript;
pub mod transport;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::error::{ErrorKind, SendOutcome};
    pub use crate::models::{ChatMessage, ProviderId};
    pub use crate::orchestrator::{RequestOrchestrator, RetryPolicy};
    pub use crate::session::Session;
    pub use crate::{llm, server, telemetry};
}
