use crate::types::{JobId, OutputBlob};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Exited { code: i32 },
    Killed { signal: i32 },
    /// The exit status could not be collected.
    Lost,
}

impl JobStatus {
    /// The exit code; a process terminated by a signal reports the negated
    /// signal number. `None` while running or when the status was lost.
    pub fn code(&self) -> Option<i32> {
        match self {
            JobStatus::Exited { code } => Some(*code),
            JobStatus::Killed { signal } => Some(-signal),
            JobStatus::Running | JobStatus::Lost => None,
        }
    }
}

/// A chunk of raw bytes read from one of the child's output streams.
#[derive(Clone, Debug)]
pub enum Output {
    Stdout(OutputBlob),
    Stderr(OutputBlob),
}

impl Output {
    pub fn bytes(&self) -> &OutputBlob {
        match self {
            Output::Stdout(blob) | Output::Stderr(blob) => blob,
        }
    }

    pub(crate) fn stream_index(&self) -> usize {
        match self {
            Output::Stdout(_) => 0,
            Output::Stderr(_) => 1,
        }
    }
}

/// Lifecycle of a supervisor's current job slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running { job_id: JobId },
    Finished { job_id: JobId, exit_code: Option<i32> },
    Cancelled { job_id: JobId },
    /// The last run never produced a process.
    Failed,
}

impl SupervisorState {
    /// True once the latest run is no longer in progress.
    pub fn is_settled(&self) -> bool {
        !matches!(self, SupervisorState::Running { .. })
    }
}
