use anyhow::{Result, bail};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Controllers tried in order. A group only needs one of them.
pub const CONTROLLERS: [&str; 3] = ["cpu", "cpuacct", "cpuset"];

/// Accepts names like `foo1/bar2/baz`. Anything else could escape the
/// controller directory once spliced into the task file path.
pub fn validate(group: &str) -> Result<()> {
    if !group.chars().all(|c| c.is_ascii_alphanumeric() || c == '/') {
        bail!("invalid path: {}", group);
    }
    Ok(())
}

pub fn tasks_path(root: &Path, controller: &str, group: &str) -> PathBuf {
    root.join(controller).join(group).join("tasks")
}

/// Task files parse every write(2) separately, so the line goes out in one
/// call.
pub fn write_pid<W: Write>(tasks: &mut W, pid: i32) -> std::io::Result<()> {
    tasks.write_all(format!("{}\n", pid).as_bytes())
}

/// Writes `pid` into the task file of every controller that has `group`.
/// A controller counts once its task file opens. Returns how many
/// controllers were reached; zero is an error.
pub fn join(root: &Path, group: &str, pid: i32) -> Result<usize> {
    validate(group)?;

    let mut joined = 0;
    for controller in CONTROLLERS {
        let path = tasks_path(root, controller, group);
        let mut tasks = match fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping controller");
                continue;
            }
        };

        joined += 1;
        if let Err(e) = write_pid(&mut tasks, pid) {
            tracing::debug!(path = %path.display(), error = %e, "controller refused pid");
        }
    }

    if joined == 0 {
        bail!("cgroup: could not add to cgroup {}", group);
    }
    Ok(joined)
}
