mod arg_parser;
mod terminal_sink;

use arg_parser::ArgParser;
use terminal_sink::TerminalSink;

use clap::Parser;
use rakelib::{ProcessSupervisor, SupervisorState};
use std::{error, process};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();

    // RUST_LOG=rakelib=debug to see spawn and kill events
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.build_config()?;
    let supervisor = ProcessSupervisor::spawn(TerminalSink::new());
    supervisor.run(config, args.run_context()).await?;

    let state = tokio::select! {
        state = supervisor.wait_settled() => state,
        _ = tokio::signal::ctrl_c() => {
            supervisor.cancel().await?;
            println!();
            supervisor.state()
        }
    };
    supervisor.shutdown().await?;

    let code = match state {
        // a job killed by a signal reports the negated signal number
        SupervisorState::Finished {
            exit_code: Some(code),
            ..
        } if code < 0 => 128 - code,
        SupervisorState::Finished { exit_code, .. } => exit_code.unwrap_or(0),
        SupervisorState::Cancelled { .. } => 130,
        SupervisorState::Failed => 127,
        SupervisorState::Idle | SupervisorState::Running { .. } => 0,
    };
    process::exit(code)
}
