use clap::Parser;
use std::process::ExitCode;
use tagflow::config::Cli;
use tagflow::error::StartupError;
use tagflow_logging::{init_logging, LogConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig {
        app_name: "tagflow",
        verbose: cli.verbose,
    }) {
        eprintln!("Warning: logging unavailable: {:#}", err);
    }

    match tagflow::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<StartupError>() {
            Some(startup) => {
                eprint!("{}", startup.to_helpful());
                ExitCode::from(2)
            }
            None => {
                eprintln!("{:?}", err);
                ExitCode::from(1)
            }
        },
    }
}
