use clap::Parser;

use tenfold::cli::{Cli, Command, ConfigCommand};
use tenfold::config::Settings;
use tenfold::{cli, server, telemetry};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Start) => {
            let settings = match Settings::from_env() {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    std::process::exit(1);
                }
            };
            telemetry::init_tracing(&settings);
            if let Err(e) = server::serve(settings).await {
                tracing::error!(error = %e, "server exited with error");
                std::process::exit(1);
            }
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let settings = match Settings::from_env() {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    std::process::exit(1);
                }
            };
            if let Err(e) = cli::handle_config_show(&settings) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Some(Command::Status { host, port }) => {
            let port = port.unwrap_or_else(|| {
                Settings::from_env().map(|s| s.port).unwrap_or(8000)
            });
            if let Err(e) = cli::handle_status(&host, port).await {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        Some(Command::Version) => cli::handle_version(),
    }
}
