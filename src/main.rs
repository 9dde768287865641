use std::process::ExitCode;

use clap::Parser;
use video_mcp_server::cli::{self, Cli, Command};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) => return cli::report_parse_error(err, args.iter().any(|a| a == "--json")),
    };

    video_mcp_server::init_tracing(cli.command == Command::Start);
    cli::run(cli)
}
