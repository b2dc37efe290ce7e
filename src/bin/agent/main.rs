mod face;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tabpilot::{
    ActionExecutor, BackendKind, Backends, BrowserHost, ChromeHost, CommandProcessor, Config,
    PageAutomation,
};

#[derive(Parser)]
#[command(name = "agent", version, about = "Turn plain-language commands into browser actions")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "TABPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Language-model backend used to interpret commands.
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single command, e.g. `agent run search for react hooks`.
    Run {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// Open a page and let the model plan and perform interactions on it.
    Interact {
        #[arg(long)]
        url: String,
        #[arg(required = true)]
        goal: Vec<String>,
    },
    /// Serve the command endpoint for a UI.
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(kind) = cli.backend {
        config.backend = kind;
    }

    // Launching Chrome blocks; keep it off the runtime threads.
    let browser_config = config.browser.clone();
    let host = tokio::task::spawn_blocking(move || ChromeHost::launch(&browser_config))
        .await
        .context("browser launch panicked")??;
    tracing::info!("browser ready");
    let host: Arc<dyn BrowserHost> = Arc::new(host);

    let automation = PageAutomation::new(Arc::clone(&host), config.automation.clone());
    let processor = CommandProcessor::new(ActionExecutor::new(host, automation))
        .with_parse_retries(config.parse_retries);
    let backends = Backends::from_config(&config);

    match cli.command {
        Command::Run { text } => {
            let backend = backends.get(config.backend)?;
            match processor.process_command(&text.join(" "), backend.as_ref()).await {
                Ok(message) if message.is_empty() => {}
                Ok(message) => println!("{message}"),
                Err(err) => {
                    tracing::error!(error = %err, "command failed");
                    eprintln!("{}", err.user_message());
                    std::process::exit(1);
                }
            }
        }
        Command::Interact { url, goal } => {
            let backend = backends.get(config.backend)?;
            let report = processor
                .process_interaction(&url, &goal.join(" "), backend.as_ref())
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message()))?;
            println!(
                "{} of {} steps completed",
                report.completed,
                report.attempted()
            );
            for failure in &report.failures {
                println!("  step {} ({}): {}", failure.index + 1, failure.action, failure.reason);
            }
        }
        Command::Serve { addr } => {
            let state = face::AppState::new(processor, backends, config.backend);
            face::serve(&addr, state).await?;
        }
    }

    Ok(())
}
