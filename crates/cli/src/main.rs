use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "faqrelay")]
#[command(about = "FAQ bot with operator relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory with a default config.json and the bundled catalog.yaml.
    Init {
        /// Config file path (default: FAQRELAY_CONFIG_PATH or ~/.faqrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Validate the config, token, operator ids and catalog without starting the bot.
    Check {
        /// Config file path (default: FAQRELAY_CONFIG_PATH or ~/.faqrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the bot: Telegram long-poll (or webhook when channels.telegram.webhookUrl is set) plus the HTTP listener.
    Run {
        /// Config file path (default: FAQRELAY_CONFIG_PATH or ~/.faqrelay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port for health and webhook (default from config or 15152)
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
            println!("faqrelay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config) {
                log::error!("check failed: {:#}", e);
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
    let path = config_path.unwrap_or_else(faqrelay::config::default_config_path);
    let dir = faqrelay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn run_check(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let (config, path) = faqrelay::config::load_config(config_path)?;
    let startup = faqrelay::gateway::Startup::load(&config, &path)?;
    println!("config: {}", path.display());
    println!(
        "catalog: {} categories, {} questions",
        startup.catalog.categories().len(),
        startup.catalog.question_count()
    );
    for category in startup.catalog.categories() {
        println!("  {} ({})", category.name, category.questions.len());
    }
    if startup.destinations.is_empty() {
        println!("operator destinations: none (questions will get the apology)");
    } else {
        println!("operator destinations: {:?}", startup.destinations);
    }
    println!("operator allowlist: {} ids", startup.allowlist.len());
    let mode = match config.channels.telegram.webhook_url {
        Some(ref url) => format!("webhook {}", url),
        None => "long-poll".to_string(),
    };
    println!("telegram: {}", mode);
    Ok(())
}

async fn run_bot(config_path: Option<std::path::PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = faqrelay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting faqrelay on {}:{}", config.gateway.bind, config.gateway.port);
    faqrelay::gateway::run_gateway(config, path).await
}
