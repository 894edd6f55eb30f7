use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use mouthpiece::cli::{Cli, Commands, ConfigAction, ServeArgs};
use mouthpiece::config::Config;
use mouthpiece::diagnostics::check_dependencies;
use mouthpiece::server::{build_orchestrator, serve};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        None => run_server(cli.config.as_deref(), ServeArgs::default()).await?,
        Some(Commands::Serve(args)) => run_server(cli.config.as_deref(), args).await?,
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            if !check_dependencies(&config) {
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "mouthpiece",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `-q`/`-v`.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mouthpiece={level},tower_http={level}").into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("Failed to load config from {}", path.display()))?
    } else {
        // Try default path, fall back to defaults
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides()?)
}

async fn run_server(custom_path: Option<&Path>, args: ServeArgs) -> Result<()> {
    let mut config = load_config(custom_path)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(provider) = args.provider {
        config.backend.provider = provider;
    }
    config.validate()?;

    tracing::info!(version = %mouthpiece::version_string(), "starting mouthpiece");
    let orchestrator = Arc::new(build_orchestrator(&config)?);
    serve(&config, orchestrator).await?;
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Path => {
            let path = custom_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let mut config = load_config(custom_path)?;
            if let Some(key) = config.backend.openai_api_key.as_mut() {
                *key = "<redacted>".to_string();
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
