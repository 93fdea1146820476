use crate::capabilities::Capabilities;
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};
use std::ffi::OsString;

pub const VERSION: &str = match option_env!("MNEXEC_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

#[derive(Parser, Debug)]
#[command(name = "mnexec")]
#[command(about = "Execution utility for Mininet")]
#[command(disable_help_flag = true, disable_version_flag = true)]
#[command(args_override_self = true)]
pub struct Cli {
    /// Close all file descriptors except stdin/out/error
    #[arg(short = 'c', action = ArgAction::SetTrue)]
    pub close_fds: bool,

    /// Detach from tty by calling setsid()
    #[arg(short = 'd', action = ArgAction::SetTrue)]
    pub detach: bool,

    /// Print ^A + pid
    #[arg(short = 'p', action = ArgAction::SetTrue)]
    pub print_pid: bool,

    /// Print version
    #[arg(short = 'v', action = ArgAction::SetTrue)]
    pub version: bool,

    /// Print usage
    #[arg(short = 'h', action = ArgAction::SetTrue)]
    pub help: bool,

    /// Run in new network and mount namespaces
    #[arg(short = 'n', action = ArgAction::SetTrue)]
    pub contain: bool,

    /// Attach to pid's network and mount namespaces
    #[arg(short = 'a', value_name = "PID")]
    pub attach: Option<i32>,

    /// Add to cgroup
    #[arg(short = 'g', value_name = "GROUP", action = ArgAction::Append)]
    pub cgroups: Vec<String>,

    /// Run with SCHED_RR
    #[arg(short = 'r', value_name = "RTPRIO", allow_negative_numbers = true)]
    pub rtprio: Option<i32>,

    /// Command to execute and its arguments
    #[arg(value_name = "CMD", trailing_var_arg = true)]
    pub command: Vec<OsString>,
}

/// One OS configuration step, listed in the order the pipeline runs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CloseFds,
    Detach,
    CreateNamespaces,
    AttachNamespaces(i32),
    JoinCgroup(String),
    RealtimeScheduling(i32),
    AnnouncePid,
}

impl Action {
    fn stage(&self) -> u8 {
        match self {
            Action::CloseFds => 0,
            Action::Detach => 1,
            Action::CreateNamespaces => 2,
            Action::AttachNamespaces(_) => 3,
            Action::JoinCgroup(_) => 4,
            Action::RealtimeScheduling(_) => 5,
            Action::AnnouncePid => 6,
        }
    }
}

/// The actions to perform and the command to exec afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    actions: Vec<Action>,
    command: Vec<OsString>,
}

impl Invocation {
    /// Actions are reordered into pipeline order; repeated actions of the
    /// same kind keep their relative order.
    pub fn new(mut actions: Vec<Action>, command: Vec<OsString>) -> Self {
        actions.sort_by_key(Action::stage);
        Self { actions, command }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn command(&self) -> &[OsString] {
        &self.command
    }
}

impl From<Cli> for Invocation {
    fn from(cli: Cli) -> Self {
        let mut actions = Vec::new();
        if cli.close_fds {
            actions.push(Action::CloseFds);
        }
        if cli.detach {
            actions.push(Action::Detach);
        }
        if cli.contain {
            actions.push(Action::CreateNamespaces);
        }
        if let Some(pid) = cli.attach {
            actions.push(Action::AttachNamespaces(pid));
        }
        actions.extend(cli.cgroups.into_iter().map(Action::JoinCgroup));
        if let Some(priority) = cli.rtprio {
            actions.push(Action::RealtimeScheduling(priority));
        }
        if cli.print_pid {
            actions.push(Action::AnnouncePid);
        }
        Invocation::new(actions, cli.command)
    }
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Help,
    Version,
    Run(Invocation),
}

/// Parses `args` (program name first) against the flag set `caps` offers.
pub fn parse_from<I, T>(args: I, caps: &dyn Capabilities) -> Result<Request, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;

    if !caps.supports_isolation() {
        let used = [
            ('n', cli.contain),
            ('a', cli.attach.is_some()),
            ('g', !cli.cgroups.is_empty()),
            ('r', cli.rtprio.is_some()),
        ];
        if let Some((flag, _)) = used.iter().find(|(_, set)| *set) {
            return Err(Cli::command().error(
                ErrorKind::UnknownArgument,
                format!("unexpected argument '-{}' found", flag),
            ));
        }
    }

    if cli.help {
        return Ok(Request::Help);
    }
    if cli.version {
        return Ok(Request::Version);
    }
    Ok(Request::Run(cli.into()))
}

/// First line of a clap error, without the `error: ` prefix.
pub fn diagnostic(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let line = rendered.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).to_string()
}

pub fn usage(prog: &str, caps: &dyn Capabilities) -> String {
    let mut text = String::from("Execution utility for Mininet\n\n");
    if caps.supports_isolation() {
        text.push_str(&format!(
            "Usage: {} [-cdnp] [-a pid] [-g group] [-r rtprio] cmd args...\n\n",
            prog
        ));
    } else {
        text.push_str(&format!("Usage: {} [-cdp] cmd args...\n\n", prog));
    }
    text.push_str(
        "Options:\n  \
         -c: close all file descriptors except stdin/out/error\n  \
         -d: detach from tty by calling setsid()\n  \
         -p: print ^A + pid\n  \
         -v: print version\n",
    );
    if caps.supports_isolation() {
        text.push_str(
            "  -n: run in new network and mount namespaces\n  \
             -a pid: attach to pid's network and mount namespaces\n  \
             -g group: add to cgroup\n  \
             -r rtprio: run with SCHED_RR (usually requires -g)\n",
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{MockCapabilities, NoopCapabilities};

    fn full() -> MockCapabilities {
        let mut caps = MockCapabilities::new();
        caps.expect_supports_isolation().return_const(true);
        caps
    }

    fn run(args: &[&str]) -> Invocation {
        match parse_from(args.iter().copied(), &full()).unwrap() {
            Request::Run(invocation) => invocation,
            other => panic!("expected run request, got {:?}", other),
        }
    }

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_clustered_flags_with_trailing_value() {
        let invocation = run(&["mnexec", "-g", "h1", "-da", "1234", "ifconfig"]);
        assert_eq!(
            invocation.actions(),
            &[
                Action::Detach,
                Action::AttachNamespaces(1234),
                Action::JoinCgroup("h1".into()),
            ]
        );
        assert_eq!(invocation.command(), os(&["ifconfig"]).as_slice());
    }

    #[test]
    fn test_attached_option_value() {
        let invocation = run(&["mnexec", "-a42", "-r5", "true"]);
        assert_eq!(
            invocation.actions(),
            &[Action::AttachNamespaces(42), Action::RealtimeScheduling(5)]
        );
    }

    #[test]
    fn test_scanning_stops_at_first_command_token() {
        let invocation = run(&["mnexec", "-c", "ls", "-p", "-x", "-a"]);
        assert_eq!(invocation.actions(), &[Action::CloseFds]);
        assert_eq!(invocation.command(), os(&["ls", "-p", "-x", "-a"]).as_slice());
    }

    #[test]
    fn test_double_dash_ends_options() {
        let invocation = run(&["mnexec", "-p", "--", "-c"]);
        assert_eq!(invocation.actions(), &[Action::AnnouncePid]);
        assert_eq!(invocation.command(), os(&["-c"]).as_slice());
    }

    #[test]
    fn test_actions_follow_pipeline_order() {
        let invocation = run(&["mnexec", "-p", "-r", "10", "-g", "a", "-n", "-d", "-c", "-g", "b"]);
        assert_eq!(
            invocation.actions(),
            &[
                Action::CloseFds,
                Action::Detach,
                Action::CreateNamespaces,
                Action::JoinCgroup("a".into()),
                Action::JoinCgroup("b".into()),
                Action::RealtimeScheduling(10),
                Action::AnnouncePid,
            ]
        );
    }

    #[test]
    fn test_repeated_flags_are_harmless() {
        let invocation = run(&["mnexec", "-cc", "-pp", "true"]);
        assert_eq!(invocation.actions(), &[Action::CloseFds, Action::AnnouncePid]);
    }

    #[test]
    fn test_no_command_is_not_an_error() {
        let invocation = run(&["mnexec", "-c"]);
        assert!(invocation.command().is_empty());
    }

    #[test]
    fn test_help_and_version_win_over_other_flags() {
        let caps = full();
        assert_eq!(parse_from(["mnexec", "-c", "-h", "ls"], &caps).unwrap(), Request::Help);
        assert_eq!(parse_from(["mnexec", "-dv"], &caps).unwrap(), Request::Version);
        assert_eq!(parse_from(["mnexec", "-v", "-h"], &caps).unwrap(), Request::Help);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let err = parse_from(["mnexec", "-c", "-x", "ls"], &full()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert!(diagnostic(&err).contains("-x"), "{}", diagnostic(&err));
    }

    #[test]
    fn test_missing_option_argument_is_rejected() {
        for flag in ["-a", "-g", "-r"] {
            let err = parse_from(["mnexec", flag], &full()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidValue, "flag {}", flag);
        }
    }

    #[test]
    fn test_malformed_numbers_are_rejected() {
        let caps = full();
        for args in [["mnexec", "-r", "high"], ["mnexec", "-a", "12x"]] {
            let err = parse_from(args, &caps).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_negative_priority_reaches_the_kernel() {
        let invocation = run(&["mnexec", "-r", "-1", "true"]);
        assert_eq!(invocation.actions(), &[Action::RealtimeScheduling(-1)]);
    }

    #[test]
    fn test_reduced_flag_set_without_isolation() {
        for args in [
            vec!["mnexec", "-n", "true"],
            vec!["mnexec", "-a", "1", "true"],
            vec!["mnexec", "-g", "h1", "true"],
            vec!["mnexec", "-r", "1", "true"],
        ] {
            let err = parse_from(args.clone(), &NoopCapabilities).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnknownArgument);
            assert_eq!(diagnostic(&err), format!("unexpected argument '{}' found", args[1]));
        }

        let request = parse_from(["mnexec", "-cdp", "true"], &NoopCapabilities).unwrap();
        assert!(matches!(request, Request::Run(_)));
    }

    #[test]
    fn test_usage_lists_active_flag_set() {
        let text = usage("mnexec", &full());
        assert!(text.contains("Usage: mnexec [-cdnp] [-a pid] [-g group] [-r rtprio] cmd args..."));
        assert!(text.contains("-g group: add to cgroup"));

        let text = usage("mnexec", &NoopCapabilities);
        assert!(text.contains("Usage: mnexec [-cdp] cmd args..."));
        assert!(!text.contains("-a pid"));
    }
}
