use anyhow::{Context, Result};
use nix::mount::{MsFlags, mount};
use nix::sched::{CloneFlags, setns, unshare};
use nix::unistd::{chdir, chroot};
use std::fs::File;
use std::path::{Path, PathBuf};

/// How the mount namespace of the target was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachPlan {
    /// `setns` into the target's mount namespace.
    MountNamespace,
    /// `chroot` into the target's root as seen through procfs.
    ChrootFallback,
}

pub fn proc_path(pid: i32, entry: &str) -> PathBuf {
    Path::new("/proc").join(pid.to_string()).join(entry)
}

/// Moves this process into fresh network and mount namespaces.
///
/// The three steps are not rolled back: if the remount or the sysfs mount
/// fails, the process stays in the new namespaces and the error is returned.
pub fn contain() -> Result<()> {
    unshare(CloneFlags::CLONE_NEWNET | CloneFlags::CLONE_NEWNS).context("unshare")?;

    // Keep our mounts from propagating to other processes.
    mount(
        Some("none"),
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .context("remount")?;

    // sysfs has to be remounted to show the new network namespace.
    mount(
        Some("sysfs"),
        "/sys",
        Some("sysfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .context("mount")?;

    tracing::debug!("created network and mount namespaces");
    Ok(())
}

/// Joins the network and mount namespaces of `pid`.
///
/// The network namespace is mandatory. For the mount namespace, a failed
/// open or `setns` falls back to a chroot into `/proc/<pid>/root`. Either way
/// the working directory in effect before the call is restored afterwards.
pub fn attach(pid: i32) -> Result<AttachPlan> {
    let cwd = std::env::current_dir().context("getcwd")?;

    let net_path = proc_path(pid, "ns/net");
    let net = File::open(&net_path).with_context(|| net_path.display().to_string())?;
    setns(&net, CloneFlags::CLONE_NEWNET).context("setns")?;

    match join_mount_namespace(pid) {
        Ok(()) => {
            restore_cwd(&cwd)?;
            Ok(AttachPlan::MountNamespace)
        }
        Err(e) => {
            tracing::debug!(pid, error = %format!("{:#}", e), "mount namespace join failed, using chroot");
            chroot_into(pid, &cwd)?;
            Ok(AttachPlan::ChrootFallback)
        }
    }
}

fn restore_cwd(cwd: &Path) -> Result<()> {
    chdir(cwd).with_context(|| cwd.display().to_string())?;
    Ok(())
}

fn join_mount_namespace(pid: i32) -> Result<()> {
    let mnt_path = proc_path(pid, "ns/mnt");
    let mnt = File::open(&mnt_path).with_context(|| mnt_path.display().to_string())?;
    setns(&mnt, CloneFlags::CLONE_NEWNS).context("setns")?;
    Ok(())
}

/// Plan B of [`attach`]: chroot into `/proc/<pid>/root`, then re-enter
/// `cwd` as seen from the new root.
pub fn chroot_into(pid: i32, cwd: &Path) -> Result<()> {
    let root = proc_path(pid, "root");
    chroot(&root).with_context(|| root.display().to_string())?;
    chdir("/").context("chdir")?;
    restore_cwd(cwd)
}
