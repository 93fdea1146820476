use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::unistd::getpid;

/// Switches the calling process to `SCHED_RR` at `priority`.
pub fn set_round_robin(priority: i32) -> Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` is a valid sched_param that outlives the call.
    let res = unsafe { libc::sched_setscheduler(getpid().as_raw(), libc::SCHED_RR, &param) };
    Errno::result(res).context("sched_setscheduler")?;

    tracing::debug!(priority, "switched to SCHED_RR");
    Ok(())
}
