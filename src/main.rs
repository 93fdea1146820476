use mnexec::cli::{self, Request};
use mnexec::runtime::{self, Step};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_env("MNEXEC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_logging();

    let caps = mnexec::capabilities::select();
    let args: Vec<_> = std::env::args_os().collect();
    let prog = args
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mnexec".to_string());

    let invocation = match cli::parse_from(&args, caps.as_ref()) {
        Ok(Request::Run(invocation)) => invocation,
        Ok(Request::Help) => {
            print!("{}", cli::usage(&prog, caps.as_ref()));
            return ExitCode::SUCCESS;
        }
        Ok(Request::Version) => {
            println!("{}", cli::VERSION);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}: {}", prog, cli::diagnostic(&e));
            print!("{}", cli::usage(&prog, caps.as_ref()));
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout();
    match runtime::prepare(&invocation, caps.as_ref(), &mut stdout) {
        Ok(Step::Continue) => {}
        Ok(Step::ParentExit) => return ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    }

    if invocation.command().is_empty() {
        print!("{}", cli::usage(&prog, caps.as_ref()));
        return ExitCode::SUCCESS;
    }

    let Err(e) = runtime::exec_command(invocation.command());
    eprintln!("{:#}", e);
    ExitCode::FAILURE
}
