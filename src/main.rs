use anyhow::Result;
use clap::{CommandFactory, Parser};
use pink_transcriber::app::{self, DaemonOverrides};
use pink_transcriber::cli::{Cli, Commands};
use pink_transcriber::logging::init_logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Commands::Daemon {
            model,
            language,
            drain_grace,
            max_pending,
        } => {
            let config = app::load_config(cli.config.as_deref())?;
            let config = app::apply_daemon_overrides(
                config,
                DaemonOverrides {
                    socket: cli.socket,
                    model,
                    language,
                    drain_grace,
                    max_pending,
                },
            );

            let code = match app::run_daemon_command(config).await {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("pink-transcriber: {}", e);
                    1
                }
            };
            // A job abandoned at the grace deadline can still be running on a
            // blocking thread; exit without waiting for it.
            std::process::exit(code);
        }
        Commands::Health => {
            let socket = client_socket(&cli)?;
            Ok(app::run_health_command(&socket).await)
        }
        Commands::Transcribe { ref file } => {
            let socket = client_socket(&cli)?;
            Ok(app::run_transcribe_command(&socket, file).await)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "pink-transcriber",
                &mut std::io::stdout(),
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Socket path for client commands: `--socket`, else configuration.
fn client_socket(cli: &Cli) -> Result<std::path::PathBuf> {
    if let Some(socket) = &cli.socket {
        return Ok(socket.clone());
    }
    let config = app::load_config(cli.config.as_deref())?;
    Ok(config.server.socket_path)
}
