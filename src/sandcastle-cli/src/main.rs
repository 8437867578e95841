//! Sandcastle CLI - Main entry point.
//!
//! Runs a command under a sandbox policy:
//!
//! ```text
//! sandcastle [--config PATH] [--control-fd FD] [--shell SHELL] -- command args...
//! ```

use std::process::ExitCode;

use clap::Parser;

use sandcastle_cli::cli::Cli;
use sandcastle_cli::logging::{DEBUG_ENV, init_logging};
use sandcastle_cli::supervisor::{EXIT_FAILURE, Supervisor};

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors exit 1; help and version output exit 0.
            return if e.use_stderr() {
                ExitCode::from(EXIT_FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let debug = cli.debug_enabled();
    if debug {
        // SAFETY: Environment variable mutations happen early before threads spawn
        unsafe { std::env::set_var(DEBUG_ENV, "1") };
    }
    init_logging(debug);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let mut supervisor = Supervisor::new(cli.into_options());
    let code = runtime.block_on(supervisor.run());

    // Do not wait on a control-channel read that may block forever.
    runtime.shutdown_background();
    ExitCode::from(code)
}
