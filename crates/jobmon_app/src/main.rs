mod cli;
mod platform;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let all_completed = platform::run_app(cli)?;
    if !all_completed {
        std::process::exit(1);
    }
    Ok(())
}
