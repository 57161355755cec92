//! unified-ci core library
//!
//! Everything the orchestrator process needs before and around the checks
//! themselves: configuration, log sinks, the working mode, the mode plan and
//! the supervisor that runs the plan, plus the outbound transport and GitHub
//! App authentication shared by the check adapters.

pub mod config;
pub mod error;
pub mod github_auth;
pub mod mode;
pub mod obs;
pub mod plan;
pub mod queue;
pub mod supervisor;
pub mod task_group;
pub mod telemetry;
pub mod transport;

pub use config::{Config, CoreConfig, GitHubConfig, LogConfig, Secret};
pub use error::{Result, UciError};
pub use github_auth::AppAuth;
pub use mode::{set_working_mode, working_mode, Mode};
pub use plan::{plan, TaskKind};
pub use queue::{init_message_queue, CheckRequest, InMemoryQueue, MessageQueue};
pub use supervisor::{
    shutdown_signal, ShutdownPolicy, ShutdownReason, Supervisor, SupervisorReport, Workers,
};
pub use task_group::{TaskGroup, TaskResult};
pub use telemetry::init_logs;
pub use transport::build_client;

/// Product name sent in banners and `User-Agent` headers.
pub const PRODUCT: &str = "unified-ci";

/// `unified-ci/<version>`
pub fn user_agent() -> String {
    format!("{}/{}", PRODUCT, env!("CARGO_PKG_VERSION"))
}
