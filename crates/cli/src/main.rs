//! Tripwire command-line client.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tripwire_cli::{ApiClient, TagRequest, Tagger, resolve_username};
use tripwire_core::config::AppConfig;
use tripwire_core::{BeaconUrl, DocumentType, document};
use tripwire_notify::{Notification, NotificationChannel, NotificationLog};
use tripwire_storage::MediaKind;

/// Tripwire - document beaconing client
#[derive(Parser, Debug)]
#[command(name = "tripwire")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "TRIPWIRE_CONFIG",
        default_value = "tripwire.toml"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Beacon a Word document and report the tag, or upload a PDF/image
    Tag {
        path: PathBuf,
        /// Username recorded on the tag (defaults to $USER)
        #[arg(long)]
        username: Option<String>,
        /// Client correlation key (overrides config)
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Upload a file to the configured storage backend
    Upload {
        /// pdf, image or html
        kind: MediaKind,
        path: PathBuf,
        /// Correlation id sent with each chunk
        #[arg(long)]
        id: Option<String>,
    },
    /// List stored artifacts of one kind
    List { kind: MediaKind },
    /// Stream live notifications until interrupted
    Listen {
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Check connectivity to the tagging API
    Probe,
    /// Show the detected document type and basic metadata
    Classify { path: PathBuf },
}

fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        tracing::debug!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("TRIPWIRE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(cli.command, &cli.config).await
}

/// Dispatch a subcommand. Configuration is loaded only by commands that use it.
async fn run(command: Commands, config_path: &str) -> Result<()> {
    match command {
        Commands::Classify { path } => {
            classify(&path);
            Ok(())
        }
        Commands::Tag {
            path,
            username,
            client_id,
        } => {
            let config = load_config(config_path)?;
            let api = ApiClient::from_config(&config.api)?;
            let mut tagger = Tagger::new(api, BeaconUrl::new(config.beacon_base()));
            if matches!(
                DocumentType::infer(&path),
                DocumentType::Pdf | DocumentType::Image
            ) {
                let storage = tripwire_storage::from_config(&config.storage)
                    .await
                    .context("failed to initialize storage")?;
                tagger = tagger.with_storage(storage);
            }

            let request = TagRequest {
                path,
                username: username.or(config.identity.username.clone()),
                client_id: client_id.unwrap_or(config.identity.client_id.clone()),
            };
            let outcome = tagger.tag_document(request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if let Some(err) = &outcome.api_error {
                eprintln!("warning: tag was not recorded by the API: {err}");
            }
            Ok(())
        }
        Commands::Upload { kind, path, id } => {
            let config = load_config(config_path)?;
            let storage = tripwire_storage::from_config(&config.storage)
                .await
                .context("failed to initialize storage")?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("path has no file name")?;
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let location = storage
                .save(kind, Bytes::from(data), &name, id.as_deref())
                .await
                .with_context(|| format!("failed to upload {name}"))?;
            println!("{location}");
            Ok(())
        }
        Commands::List { kind } => {
            let config = load_config(config_path)?;
            let storage = tripwire_storage::from_config(&config.storage)
                .await
                .context("failed to initialize storage")?;
            let names = storage.list(kind).await?;
            if names.is_empty() {
                println!("No {kind} artifacts found.");
            }
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Listen { duration_secs } => {
            let config = load_config(config_path)?;
            let username = resolve_username(config.identity.username.as_deref());
            let registration = Notification::registration(&config.identity.client_id, &username);
            let channel = NotificationChannel::from_config(&config.notify, registration)?;
            listen(channel, duration_secs.map(Duration::from_secs)).await
        }
        Commands::Probe => {
            let config = load_config(config_path)?;
            let api = ApiClient::from_config(&config.api)?;
            if api.probe_access().await? {
                println!("Connected to {}", api.base_url());
                Ok(())
            } else {
                anyhow::bail!("API at {} refused access", api.base_url())
            }
        }
    }
}

fn classify(path: &Path) {
    for (key, value) in document::describe(path) {
        println!("{key}: {value}");
    }
}

async fn listen(channel: NotificationChannel, duration: Option<Duration>) -> Result<()> {
    let log = NotificationLog::new();
    let session = channel.spawn(log.clone());
    let mut state = session.subscribe();
    let mut printed = 0;

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(deadline, interrupted);
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut interrupted => break,
            changed = state.changed() => {
                let current = *state.borrow_and_update();
                if changed.is_err() || current.is_terminal() {
                    break;
                }
                tracing::info!(state = %current, "notification channel state changed");
            }
            _ = tick.tick() => {}
        }
        printed += print_since(&log, printed).await;
    }

    let final_state = session.shutdown().await?;
    print_since(&log, printed).await;
    tracing::info!(state = %final_state, "notification channel stopped");
    Ok(())
}

async fn print_since(log: &NotificationLog, offset: usize) -> usize {
    let fresh = log.since(offset).await;
    for notification in &fresh {
        println!("{}", notification.value());
    }
    fresh.len()
}
