use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::CommandError;

/// Combined stdout/stderr of a finished command, trimmed, plus its exit status.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub text: String,
    pub status: ExitStatus,
}

impl CommandOutput {
    /// Turn a non-zero exit into [`CommandError::ProcessExitedNonZero`].
    pub fn checked(self) -> Result<String, CommandError> {
        if self.status.success() {
            Ok(self.text)
        } else {
            Err(CommandError::ProcessExitedNonZero {
                code: self.status.code(),
                output: self.text,
            })
        }
    }
}

/// Run `sh -c <command>` and wait for it, at most `timeout` unless that is zero.
///
/// A non-zero exit status is not an error here; callers that need to tell
/// success from failure use [`CommandOutput::checked`].
pub fn run_shell(command: &str, timeout: Duration) -> Result<CommandOutput, CommandError> {
    debug!(command, timeout_ms = timeout.as_millis() as u64, "run command");

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);

    // Own process group, so a timeout can take down everything the shell started.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CommandError::SpawnFailed(e.to_string()))?;

    let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);

    // Readers are detached, never joined: a background process can hold the
    // pipes open long after `sh` exits. Killing the group closes them.
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        thread::spawn(move || read_chunks(out, tx));
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        thread::spawn(move || read_chunks(err, tx));
    }
    drop(tx);

    let mut merged = Vec::new();
    loop {
        let chunk = match deadline {
            Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match chunk {
            Ok(bytes) => merged.extend_from_slice(&bytes),
            Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => return Err(timed_out(&mut child, timeout)),
        }
    }

    let status = wait_until(&mut child, deadline, timeout)?;
    let text = String::from_utf8_lossy(&merged).trim().to_string();
    if !status.success() {
        debug!(command, %status, "command exited non-zero");
    }
    Ok(CommandOutput { text, status })
}

// Output is fully drained at this point; only the exit itself is left to wait for.
fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
    timeout: Duration,
) -> Result<ExitStatus, CommandError> {
    let Some(at) = deadline else {
        return child
            .wait()
            .map_err(|e| CommandError::SpawnFailed(format!("wait failed: {e}")));
    };
    match child.wait_timeout(at.saturating_duration_since(Instant::now())) {
        Ok(Some(status)) => Ok(status),
        Ok(None) => Err(timed_out(child, timeout)),
        Err(e) => Err(CommandError::SpawnFailed(format!("wait failed: {e}"))),
    }
}

fn timed_out(child: &mut Child, timeout: Duration) -> CommandError {
    kill_process_group(child);
    let _ = child.wait();
    CommandError::CommandTimedOut(timeout)
}

fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        // Negative PID targets the whole process group.
        let rc = unsafe { libc::kill(-(child.id() as i32), libc::SIGKILL) };
        if rc == 0 {
            return;
        }
        warn!(
            pid = child.id(),
            error = %std::io::Error::last_os_error(),
            "failed to kill process group after timeout"
        );
    }
    if let Err(e) = child.kill() {
        warn!(pid = child.id(), error = %e, "failed to kill command after timeout");
    }
}

fn read_chunks<R: Read>(mut reader: R, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        }
    }
}
