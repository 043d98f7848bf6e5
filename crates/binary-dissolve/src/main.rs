mod check;
mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Check(args)) => check::check(args),
        Some(Command::PrintConfig(args)) => run::print_config(args),
        None => run::run(cli.effect),
    }
}
