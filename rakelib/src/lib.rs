mod actors;
pub mod command;
pub mod config;
pub mod encoding;
pub mod env;
pub mod error;
mod events;
pub mod listener;
pub mod sink;
pub mod types;

// re-export the supervisor handle as if it is the supervisor itself.
pub use actors::process::ProcessHandle;
pub use actors::supervisor::SupervisorHandle as ProcessSupervisor;
pub use config::{BuildConfig, RunContext};
pub use events::{JobStatus, Output, SupervisorState};
pub use listener::ProcessListener;
pub use sink::{BufferSink, OutputSink, ResultPatterns};
