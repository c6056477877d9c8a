use crate::Result;
use clap::Parser;

mod ctl;
mod run;

#[derive(Debug, clap::Parser)]
#[clap(name = "shepherd", version, about = "lightweight service supervisor")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    Run(run::Run),
    Ctl(ctl::Ctl),
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    match args.command {
        Command::Run(run) => run.run().await,
        Command::Ctl(ctl) => ctl.run().await,
    }
}
