use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chimera")]
#[command(about = "Chimera Telegram bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: CHIMERA_CONFIG_PATH or ~/.chimera/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot: Telegram connector, answer forwarding, and the HTTP health/webhook server.
    Run {
        /// Config file path (default: CHIMERA_CONFIG_PATH or ~/.chimera/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("chimera {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run_bot(config, port).await {
                log::error!("bot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(chimera::config::default_config_path);
    let dir = chimera::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_bot(config_path: Option<std::path::PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = chimera::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting chimera on {}:{}", config.gateway.bind, config.gateway.port);
    chimera::gateway::run_gateway(config, path).await
}
