//! Child process supervision
//!
//! Spawns a runtime against a workspace, waits for it under a wall-clock
//! bound and captures its output.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, instrument, warn};

use crate::types::ExecutionOutcome;

/// Run a command inside `workspace` and wait at most `limit` for it
///
/// The child gets a null stdin and piped output streams and leads a fresh
/// process group. Once the wait ends, by exit or by the bound expiring, the
/// whole group is killed so nothing the program started outlives the call.
#[instrument(skip(env, workspace))]
pub async fn run_child(
    command: Vec<String>,
    env: &HashMap<String, String>,
    workspace: &Path,
    limit: Duration,
) -> ExecutionOutcome {
    let Some(program) = command.first() else {
        return ExecutionOutcome::internal_error("empty run command");
    };

    let child = Command::new(program)
        .args(&command[1..])
        .envs(env)
        .current_dir(workspace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(program = %program, error = %e, "failed to spawn runtime");
            }
            return ExecutionOutcome::launch_failure(program.clone());
        }
    };

    debug!(pid = child.id(), "child spawned");
    let _group = ProcessGroup::of(&child);

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let code = exit_code(output.status);
            debug!(code, "child exited");
            ExecutionOutcome::exited(
                code,
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            )
        }
        Ok(Err(e)) => ExecutionOutcome::internal_error(format!("failed to wait for child: {e}")),
        Err(_) => {
            debug!(?limit, "child timed out and was killed");
            ExecutionOutcome::timed_out(limit)
        }
    }
}

/// Kills a child's process group when dropped
struct ProcessGroup(Option<libc::pid_t>);

impl ProcessGroup {
    /// The child was spawned with `process_group(0)`, so its pid is the
    /// group id
    fn of(child: &Child) -> Self {
        Self(child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()))
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(pgid) = self.0 else {
            return;
        };
        // SAFETY: killpg only sends a signal; an emptied group yields ESRCH
        let killed = unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0;
        if killed {
            debug!(pgid, "killed leftover process group");
        }
    }
}

/// Exit code of a finished child; a signal-terminated child reports `-signal`
fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => -signal,
        (None, None) => -1,
    }
}
