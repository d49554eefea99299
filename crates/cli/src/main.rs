use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    sandpit_config::{SandpitConfig, discover_and_load, load_config},
    sandpit_playground::Playground,
    sandpit_runtime::{DEFAULT_SOURCE, SessionManager},
};

#[derive(Parser)]
#[command(name = "sandpit", about = "Sandpit — browser code playground")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in cwd and the user config dir).
    #[arg(long, global = true, env = "SANDPIT_CONFIG")]
    config: Option<PathBuf>,

    // Serve arguments (used when no subcommand is provided, or with `serve`)
    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Open the playground in the default browser once listening.
    #[arg(long, global = true, default_value_t = false)]
    open: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the playground server (default when no subcommand is provided).
    Serve,
    /// Print the effective configuration and exit.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_effective_config(cli: &Cli) -> anyhow::Result<SandpitConfig> {
    match &cli.config {
        Some(path) => load_config(path),
        None => Ok(discover_and_load()),
    }
}

/// Editor seed: the configured source file, or the built-in sample.
fn initial_source(config: &SandpitConfig) -> anyhow::Result<String> {
    match &config.project.source {
        Some(path) => std::fs::read_to_string(path).map_err(|err| {
            anyhow::anyhow!("failed to read project source {}: {err}", path.display())
        }),
        None => Ok(DEFAULT_SOURCE.to_string()),
    }
}

async fn serve(cli: Cli) -> anyhow::Result<()> {
    let config = load_effective_config(&cli)?;

    // CLI args override config values.
    let bind = cli.bind.unwrap_or(config.server.bind.clone());
    let port = cli.port.unwrap_or(config.server.port);

    let source = initial_source(&config)?;
    let manager = SessionManager::with_node_backend(config.runtime);
    let playground = Playground::new(manager, source);

    if cli.open {
        let url = format!("http://{bind}:{port}/");
        tokio::spawn(async move {
            // Give the listener a moment to bind before the browser hits it.
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            if let Err(err) = open::that(&url) {
                tracing::warn!(%url, error = %err, "failed to open browser");
            }
        });
    }

    sandpit_web::start_server(&bind, port, playground).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();

    init_telemetry(&cli);
    info!(version = env!("CARGO_PKG_VERSION"), "sandpit starting");

    match cli.command.take() {
        None | Some(Commands::Serve) => serve(cli).await,
        Some(Commands::Config) => {
            let config = load_effective_config(&cli)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        },
    }
}
