mod actor;
mod messages;

use self::{actor::Supervisor, messages::SupervisorMessage};
use crate::config::{BuildConfig, RunContext};
use crate::error::{Error, Result};
use crate::events::SupervisorState;
use crate::sink::OutputSink;
use tokio::sync::{mpsc, oneshot, watch};

/// A `ProcessSupervisor` runs the build tool, streams its output into an
/// [`OutputSink`], and cancels it on request. At most one job is current.
///
/// This struct is actually an actor handle. The actor spawned by
/// `SupervisorHandle::spawn` is the single context that owns the sink and the
/// current-job slot; output from the stream pumps is posted to it as messages
/// rather than applied inline. The handle can be cloned freely.
#[derive(Clone)]
pub struct SupervisorHandle {
    sender: mpsc::UnboundedSender<SupervisorMessage>,
    state: watch::Receiver<SupervisorState>,
}

impl SupervisorHandle {
    /// Spawn a new supervisor writing into `sink`. Must be called from within
    /// a tokio runtime.
    pub fn spawn(sink: impl OutputSink + 'static) -> Self {
        let (sender, inbox) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SupervisorState::Idle);
        Supervisor::new(inbox, sender.clone(), Box::new(sink), state_tx).spawn();
        Self { sender, state }
    }

    /// Start a new job, or cancel the current one when `config.kill` is set.
    ///
    /// Returns once the job has been started (or failed to start); failures
    /// are reported in the sink, not here. Only one `run` may be in flight
    /// per process, since it changes the process working directory and PATH.
    pub async fn run(&self, config: BuildConfig, context: RunContext) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorMessage::Run {
                config,
                context,
                response: tx,
            })
            .map_err(|_| Error::SupervisorExited)?;
        rx.await.map_err(|_| Error::SupervisorExited)
    }

    /// Cancel the current job, if any.
    pub async fn cancel(&self) -> Result<()> {
        self.run(BuildConfig::cancel(), RunContext::default()).await
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Wait until the latest job has finished, been cancelled, or failed to start.
    pub async fn wait_settled(&self) -> SupervisorState {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow_and_update();
            if current.is_settled() {
                return current;
            }
            if state.changed().await.is_err() {
                return *state.borrow();
            }
        }
    }

    /// Kill the current job and stop the supervisor.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorMessage::Shutdown { response: tx })
            .map_err(|_| Error::SupervisorExited)?;
        rx.await.map_err(|_| Error::SupervisorExited)
    }
}
