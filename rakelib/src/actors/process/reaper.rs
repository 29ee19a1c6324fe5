use super::terminate;
use crate::events::JobStatus;
use crate::types::JobId;

use futures::future::FutureExt;
use std::process::ExitStatus;
use tokio::{
    process::Child,
    select,
    sync::{oneshot, watch},
};
use tracing::{debug, warn};

/// Owns the OS child: waits for it to exit, and terminates it on request.
pub struct Reaper;

impl Reaper {
    pub fn spawn(
        job_id: JobId,
        mut child: Child,
        kill_rx: oneshot::Receiver<()>,
        status_tx: watch::Sender<JobStatus>,
    ) {
        tokio::spawn(async move {
            let mut kill_rx = kill_rx.fuse();
            loop {
                select! {
                    // a dropped sender is not a kill request
                    Ok(()) = &mut kill_rx => {
                        if let Err(e) = terminate::terminate(&mut child).await {
                            warn!(%job_id, error = %e, "failed to terminate process");
                        }
                    }
                    // wait for the child to finish and clean up its resources
                    exit_status = child.wait() => {
                        let status = match exit_status {
                            Ok(exit_status) => job_status(exit_status),
                            Err(e) => {
                                warn!(%job_id, error = %e, "failed to wait for process");
                                JobStatus::Lost
                            }
                        };
                        debug!(%job_id, ?status, "process reaped");
                        let _ = status_tx.send(status);
                        break;
                    }
                }
            }
        });
    }
}

fn job_status(exit_status: ExitStatus) -> JobStatus {
    if let Some(code) = exit_status.code() {
        return JobStatus::Exited { code };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = exit_status.signal() {
            return JobStatus::Killed { signal };
        }
    }
    JobStatus::Lost
}
