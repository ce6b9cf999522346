//! Executor/reviewer agent duet built on the `conversation` engine.
//!
//! - [`agents`]: rig backends, retrying and dry-run agents, the agent factory
//! - [`prompts`]: role, task-type and JSON-contract prompt construction
//! - [`tools`]: sandboxed file and command tools
//! - [`config`]: layered configuration and validation
//! - [`transcript`]: JSON and plain-text transcript files
//! - [`telemetry`]: tracing setup and run reporting
//! - [`session`]: one end-to-end run

pub mod agents;
pub mod config;
pub mod prompts;
pub mod session;
pub mod telemetry;
pub mod tools;
pub mod transcript;

pub use agents::AgentFactory;
pub use config::{ConfigError, DuetConfig, Overrides, ProviderConfig};
pub use session::{run_session, SessionReport};
pub use tools::LocalSandbox;
pub use transcript::TranscriptWriter;
