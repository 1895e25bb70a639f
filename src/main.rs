use clap::Parser;
use patterntrader::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
