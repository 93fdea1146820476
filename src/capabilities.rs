//! Platform capability seam.
//!
//! Namespace, cgroup and real-time scheduling support only exists on Linux.
//! Everything platform specific sits behind [`Capabilities`] so the option
//! parser and the pipeline stay the same on every target.

use anyhow::Result;

/// The OS configuration steps that depend on platform support.
#[cfg_attr(test, mockall::automock)]
pub trait Capabilities {
    /// Short name of the variant, used in log lines.
    fn name(&self) -> &'static str;

    /// Whether `-n`, `-a`, `-g` and `-r` are offered at all.
    fn supports_isolation(&self) -> bool;

    fn create_namespaces(&self) -> Result<()>;

    fn attach_namespaces(&self, pid: i32) -> Result<()>;

    fn join_cgroup(&self, group: &str) -> Result<()>;

    fn set_realtime_scheduling(&self, priority: i32) -> Result<()>;
}

/// Full-featured variant backed by namespaces, cgroups and `SCHED_RR`.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone)]
pub struct LinuxCapabilities {
    cgroup_root: std::path::PathBuf,
}

#[cfg(target_os = "linux")]
impl Default for LinuxCapabilities {
    fn default() -> Self {
        Self {
            cgroup_root: crate::cgroup::CGROUP_ROOT.into(),
        }
    }
}

#[cfg(target_os = "linux")]
impl Capabilities for LinuxCapabilities {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn supports_isolation(&self) -> bool {
        true
    }

    fn create_namespaces(&self) -> Result<()> {
        crate::namespace::contain()
    }

    fn attach_namespaces(&self, pid: i32) -> Result<()> {
        let plan = crate::namespace::attach(pid)?;
        tracing::debug!(pid, ?plan, "attached to namespaces");
        Ok(())
    }

    fn join_cgroup(&self, group: &str) -> Result<()> {
        let pid = nix::unistd::getpid().as_raw();
        let joined = crate::cgroup::join(&self.cgroup_root, group, pid)?;
        tracing::debug!(group, joined, "joined cgroup controllers");
        Ok(())
    }

    fn set_realtime_scheduling(&self, priority: i32) -> Result<()> {
        crate::sched::set_round_robin(priority)
    }
}

/// Variant for targets without namespaces or cgroups. Every step succeeds
/// without doing anything; the parser refuses the flags beforehand.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCapabilities;

impl Capabilities for NoopCapabilities {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn supports_isolation(&self) -> bool {
        false
    }

    fn create_namespaces(&self) -> Result<()> {
        Ok(())
    }

    fn attach_namespaces(&self, _pid: i32) -> Result<()> {
        Ok(())
    }

    fn join_cgroup(&self, _group: &str) -> Result<()> {
        Ok(())
    }

    fn set_realtime_scheduling(&self, _priority: i32) -> Result<()> {
        Ok(())
    }
}

/// Picks the variant for the platform this binary was built for.
pub fn select() -> Box<dyn Capabilities> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxCapabilities::default())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NoopCapabilities)
    }
}
