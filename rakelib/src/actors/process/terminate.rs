//! Platform backends for stopping a child together with its descendants.

use std::io;
use tokio::process::Child;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Prepares a command so that [`terminate`] can reach everything it spawns.
#[cfg(unix)]
pub fn configure(command: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    // own process group, so the group can be signalled as a whole
    command.process_group(0);
}

#[cfg(windows)]
pub fn configure(command: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;
    command.creation_flags(CREATE_NO_WINDOW);
}

/// Sends SIGTERM to the child's process group, falling back to the child
/// alone if the group cannot be signalled.
#[cfg(unix)]
pub async fn terminate(child: &mut Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // already reaped
        return Ok(());
    };
    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => {
            tracing::warn!(pid, error = %e, "killpg failed, killing the process only");
            child.start_kill()
        }
    }
}

/// Runs `taskkill /T /F`, which takes the whole tree down; terminating the
/// child alone would leave anything started through `cmd.exe` running.
#[cfg(windows)]
pub async fn terminate(child: &mut Child) -> io::Result<()> {
    use std::process::Stdio;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let status = tokio::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .creation_flags(CREATE_NO_WINDOW)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if !status.success() {
        tracing::warn!(pid, ?status, "taskkill failed, killing the process only");
        child.start_kill()?;
    }
    Ok(())
}
