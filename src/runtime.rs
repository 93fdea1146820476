use crate::capabilities::Capabilities;
use crate::cli::{Action, Invocation};
use crate::process::{self, Detach};
use anyhow::{Context, Result};
use nix::unistd::execvp;
use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;

/// Where the pipeline left this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// All actions ran; go on to exec.
    Continue,
    /// We are the parent of the detach fork and must exit successfully.
    ParentExit,
}

/// Runs the requested actions in order, stopping at the first failure.
/// Nothing already done is undone.
pub fn prepare<W: Write>(
    invocation: &Invocation,
    caps: &dyn Capabilities,
    out: &mut W,
) -> Result<Step> {
    for action in invocation.actions() {
        tracing::debug!(?action, caps = caps.name(), "running action");
        match action {
            Action::CloseFds => process::close_inherited_fds()?,
            Action::Detach => {
                if process::detach()? == Detach::ParentShouldExit {
                    return Ok(Step::ParentExit);
                }
            }
            Action::CreateNamespaces => caps.create_namespaces()?,
            Action::AttachNamespaces(pid) => caps.attach_namespaces(*pid)?,
            Action::JoinCgroup(group) => caps.join_cgroup(group)?,
            Action::RealtimeScheduling(priority) => caps.set_realtime_scheduling(*priority)?,
            Action::AnnouncePid => process::announce_pid(out)?,
        }
    }
    Ok(Step::Continue)
}

fn to_cstrings(command: &[OsString]) -> Result<Vec<CString>> {
    command
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes())
                .with_context(|| format!("{}: argument contains a NUL byte", arg.to_string_lossy()))
        })
        .collect()
}

/// Replaces the process image with `command`, searching `PATH` for
/// `command[0]`. Only returns on failure.
pub fn exec_command(command: &[OsString]) -> Result<Infallible> {
    let args = to_cstrings(command)?;
    let Some(program) = args.first() else {
        anyhow::bail!("exec: no command given");
    };
    tracing::debug!(?args, "exec");
    let Err(e) = execvp(program, &args);
    Err(e).with_context(|| command[0].to_string_lossy().into_owned())
}
