use anyhow::{Context, Result};
use nix::sys::resource::{Resource, getrlimit};
use nix::unistd::{ForkResult, close, fork, getpgrp, getpid, setsid};
use std::io::Write;
use std::os::fd::RawFd;

/// Upper bound on the close loop, also used when `RLIMIT_NOFILE` is
/// unlimited (the kernel's default `fs.nr_open`).
const UNLIMITED_FD_TABLE: RawFd = 1 << 20;

/// Prefix of the pid line, so a reader can pick it out of other output.
pub const PID_SENTINEL: char = '\x01';

/// Which side of the detach fork we ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detach {
    ParentShouldExit,
    ChildContinues,
}

fn table_size_for(soft: libc::rlim_t) -> RawFd {
    if soft == libc::RLIM_INFINITY {
        return UNLIMITED_FD_TABLE;
    }
    RawFd::try_from(soft).map_or(UNLIMITED_FD_TABLE, |size| size.min(UNLIMITED_FD_TABLE))
}

fn fd_table_size() -> Result<RawFd> {
    let (soft, _hard) = getrlimit(Resource::RLIMIT_NOFILE).context("getrlimit")?;
    Ok(table_size_for(soft))
}

/// Closes every descriptor above stderr.
pub fn close_inherited_fds() -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        // Kernels before 5.9 lack close_range and fall through to the loop.
        // SAFETY: close_range only touches the descriptor table.
        let res = unsafe {
            libc::syscall(
                libc::SYS_close_range,
                3 as libc::c_uint,
                libc::c_uint::MAX,
                0 as libc::c_uint,
            )
        };
        if nix::errno::Errno::result(res).is_ok() {
            tracing::debug!("closed inherited descriptors with close_range");
            return Ok(());
        }
    }

    let size = fd_table_size()?;
    for fd in (3..size).rev() {
        // Most of these were never open.
        let _ = close(fd);
    }
    tracing::debug!(size, "closed inherited descriptors");
    Ok(())
}

/// Forks if we lead our process group, since a group leader cannot call
/// `setsid`, then starts a new session in whichever process continues.
pub fn detach() -> Result<Detach> {
    if getpgrp() == getpid() {
        // SAFETY: nothing here spawns threads, so the child is a plain copy.
        match unsafe { fork() }.context("fork")? {
            ForkResult::Parent { child } => {
                tracing::debug!(%child, "forked detached child");
                return Ok(Detach::ParentShouldExit);
            }
            ForkResult::Child => {}
        }
    }

    // Best effort, as setsid(1) does.
    if let Err(e) = setsid() {
        tracing::debug!(error = %e, "setsid failed");
    }
    Ok(Detach::ChildContinues)
}

/// Writes `^A<pid>\n` and flushes so the caller sees it before we exec.
pub fn announce_pid<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "{}{}", PID_SENTINEL, getpid()).context("write pid")?;
    out.flush().context("flush pid")?;
    Ok(())
}
