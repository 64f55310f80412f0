use aria_pilot::cli::commands::{cmd_classify, cmd_observe, cmd_run};
use aria_pilot::cli::config::{Cli, Commands, load_config, verbosity_filter};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Run {
            url,
            script,
            max_turns,
            yes,
            format,
            output,
        } => {
            let completed = cmd_run(
                &config,
                &url,
                script.as_deref(),
                max_turns,
                yes,
                format,
                output.as_deref(),
            )
            .await?;
            if !completed {
                std::process::exit(1);
            }
        }
        Commands::Observe { url, json } => {
            cmd_observe(&config, &url, json).await?;
        }
        Commands::Classify { description } => {
            if cmd_classify(&description) {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
