mod pump;
mod reaper;
mod terminate;

use crate::error::{Error, Result};
use crate::events::JobStatus;
use crate::listener::ProcessListener;
use crate::types::{EnvMap, JobId};
use pump::{Stream, StreamPump};
use reaper::Reaper;
use std::{
    io,
    path::Path,
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Instant,
};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

/// A `ProcessHandle` owns exactly one child process.
///
/// The OS child itself lives in a reaper task which waits for it to exit and
/// performs termination; stdout and stderr are drained by two stream pumps
/// which report to the listener. The handle is shared (`Arc`) between the
/// pumps and whoever started it.
pub struct ProcessHandle {
    id: JobId,
    pid: Option<u32>,
    started_at: Instant,
    killed: AtomicBool,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    status: watch::Receiver<JobStatus>,
    listener: Mutex<Option<Arc<dyn ProcessListener>>>,
}

impl ProcessHandle {
    /// Start `argv` with `env` applied over the inherited environment.
    ///
    /// Must be called from within a tokio runtime. Fails with [`Error::Spawn`]
    /// if the executable cannot be found or launched.
    pub fn start(
        argv: &[String],
        env: &EnvMap,
        working_dir: Option<&Path>,
        use_shell: bool,
        listener: Arc<dyn ProcessListener>,
    ) -> Result<Arc<Self>> {
        let mut command = build_command(argv, use_shell)?;
        command
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        terminate::configure(&mut command);

        let mut child = tokio::process::Command::from(command).spawn()?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (kill_tx, kill_rx) = oneshot::channel();
        let (status_tx, status_rx) = watch::channel(JobStatus::Running);
        let handle = Arc::new(Self {
            id: uuid::Uuid::new_v4(),
            pid,
            started_at: Instant::now(),
            killed: AtomicBool::new(false),
            kill_tx: Mutex::new(Some(kill_tx)),
            status: status_rx,
            listener: Mutex::new(Some(listener)),
        });
        info!(job_id = %handle.id, pid = ?pid, argv = ?argv, "process started");

        Reaper::spawn(handle.id, child, kill_rx, status_tx);
        if let Some(stdout) = stdout {
            StreamPump::spawn(handle.clone(), stdout, Stream::Stdout);
        }
        if let Some(stderr) = stderr {
            StreamPump::spawn(handle.clone(), stderr, Stream::Stderr);
        }
        Ok(handle)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// True until an exit status has been observed.
    pub fn is_alive(&self) -> bool {
        self.status() == JobStatus::Running
    }

    /// `None` while running or when the status was lost; `-signal` when the
    /// process was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.status().code()
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Wait for the process to be reaped.
    pub async fn wait(&self) -> JobStatus {
        let mut status = self.status.clone();
        loop {
            let current = *status.borrow_and_update();
            if current != JobStatus::Running {
                return current;
            }
            if status.changed().await.is_err() {
                return *status.borrow();
            }
        }
    }

    /// Terminate the process tree and detach the listener.
    ///
    /// Only the first call does anything; it returns `true`, later calls
    /// return `false`.
    pub fn kill(&self) -> bool {
        if self.killed.swap(true, Ordering::SeqCst) {
            return false;
        }
        lock(&self.listener).take();
        if let Some(kill_tx) = lock(&self.kill_tx).take() {
            // the reaper is gone once the process has been reaped
            let _ = kill_tx.send(());
        }
        debug!(job_id = %self.id, "kill requested");
        true
    }

    pub(crate) fn listener(&self) -> Option<Arc<dyn ProcessListener>> {
        lock(&self.listener).clone()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("status", &self.status())
            .field("killed", &self.is_killed())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn build_command(argv: &[String], use_shell: bool) -> Result<std::process::Command> {
    if use_shell {
        #[cfg(windows)]
        let (shell, flag) = ("cmd", "/C");
        #[cfg(not(windows))]
        let (shell, flag) = ("sh", "-c");
        let mut command = std::process::Command::new(shell);
        command.arg(flag).arg(argv.join(" "));
        return Ok(command);
    }

    let (program, args) = argv.split_first().ok_or_else(|| {
        Error::Spawn(io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))
    })?;
    let mut command = std::process::Command::new(program);
    command.args(args);
    Ok(command)
}
