use crate::actors::process::ProcessHandle;
use crate::config::{BuildConfig, RunContext};
use crate::events::Output;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum SupervisorMessage {
    Run {
        config: BuildConfig,
        context: RunContext,
        response: oneshot::Sender<()>,
    },
    Data {
        job: Arc<ProcessHandle>,
        output: Output,
    },
    Finished {
        job: Arc<ProcessHandle>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}
