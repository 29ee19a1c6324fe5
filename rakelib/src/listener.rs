use crate::actors::process::ProcessHandle;
use crate::events::Output;
use std::sync::Arc;

/// Receives the output of a running [`ProcessHandle`].
///
/// Both methods are called directly from the stream pump tasks, so an
/// implementation that touches shared or single-threaded state must hand the
/// event off (e.g. post it to a channel) instead of acting inline.
pub trait ProcessListener: Send + Sync {
    fn on_data(&self, job: &Arc<ProcessHandle>, output: Output);

    /// Called once stdout has closed and the exit status had a chance to be reaped.
    fn on_finished(&self, job: &Arc<ProcessHandle>);
}
