pub mod capabilities;
pub mod cgroup;
pub mod cli;
#[cfg(target_os = "linux")]
pub mod namespace;
pub mod process;
pub mod runtime;
#[cfg(target_os = "linux")]
pub mod sched;

// Re-export main types and functions for easier testing
pub use capabilities::{Capabilities, NoopCapabilities};
pub use cli::{Action, Invocation, Request, parse_from, usage};
pub use process::Detach;
pub use runtime::{Step, exec_command, prepare};
