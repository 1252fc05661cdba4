use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spool_core::app::{Driver, DriverIntervals};
use spool_core::domain::{BatchId, DataPacket, PurgeCount, TransactionResult};
use spool_core::impls::JsonLinesSender;
use spool_core::ports::{AttributePrioritizer, TransactionSender, TransferError};
use spool_core::{ClientBuilder, QueueConfig, QueuedSiteToSiteClient, SiteToSiteService};

#[derive(Parser)]
#[command(name = "spool")]
#[command(about = "Store-and-forward queue for site-to-site transfers")]
struct Cli {
    /// Queue store directory
    #[arg(long)]
    store: PathBuf,

    /// JSON config: queue limits plus an optional `prioritizer` section
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue one packet (payload from --file, the argument, or stdin)
    Enqueue {
        /// Packet attribute, repeatable
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        text: Option<String>,
    },
    /// Send the next batch to a JSON lines file
    Process {
        #[arg(long)]
        out: PathBuf,

        /// Keep sending until the queue is empty
        #[arg(long)]
        all: bool,
    },
    /// Delete sent and expired packets
    Cleanup,
    /// Print per-state totals as JSON
    Status,
    /// Process and clean up on a timer until Ctrl-C
    Drive {
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value_t = 1000)]
        process_millis: u64,

        #[arg(long, default_value_t = 30_000)]
        cleanup_millis: u64,
    },
}

#[derive(Debug, Default, Deserialize)]
struct CliConfig {
    #[serde(flatten)]
    queue: QueueConfig,

    #[serde(default)]
    prioritizer: Option<AttributePrioritizer>,
}

fn parse_attribute(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got `{raw}`")),
    }
}

fn load_config(path: Option<&Path>) -> Result<QueueConfig> {
    let Some(path) = path else {
        return Ok(QueueConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let parsed: CliConfig = serde_json::from_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;

    let mut config = parsed.queue;
    if let Some(prioritizer) = parsed.prioritizer {
        config = config.with_prioritizer(prioritizer);
    }
    config.validate()?;
    Ok(config)
}

/// Senders are only needed by commands that transmit; the rest get one that refuses.
struct NoSender;

impl TransactionSender for NoSender {
    fn send(
        &self,
        _batch_id: BatchId,
        _packets: &[DataPacket],
    ) -> std::result::Result<TransactionResult, TransferError> {
        Err(TransferError::Unavailable("no output configured".to_string()))
    }
}

fn open_client(
    store: &Path,
    config: QueueConfig,
    sender: Arc<dyn TransactionSender>,
) -> Result<QueuedSiteToSiteClient> {
    let client = ClientBuilder::new(sender)
        .config(config)
        .file_store(store)
        .build()
        .with_context(|| format!("opening store {}", store.display()))?;
    Ok(client)
}

fn read_payload(file: Option<PathBuf>, text: Option<String>) -> Result<Vec<u8>> {
    if let Some(path) = file {
        return std::fs::read(&path).with_context(|| format!("reading {}", path.display()));
    }
    if let Some(text) = text {
        return Ok(text.into_bytes());
    }
    let mut payload = Vec::new();
    std::io::stdin().read_to_end(&mut payload)?;
    Ok(payload)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Enqueue {
            attributes,
            file,
            text,
        } => {
            let mut packet = DataPacket::from_payload(read_payload(file, text)?);
            for (key, value) in attributes {
                packet = packet.with_attribute(key, value);
            }
            let client = open_client(&cli.store, config, Arc::new(NoSender))?;
            client.enqueue(packet)?;
            print_json(&client.status()?)?;
        }
        Commands::Process { out, all } => {
            let sender = JsonLinesSender::open(&out)?;
            let client = open_client(&cli.store, config, Arc::new(sender))?;
            let mut sent = 0usize;
            loop {
                let outcome = client.process()?;
                if !outcome.sent {
                    break;
                }
                sent += outcome.packet_count;
                print_json(&outcome)?;
                if !all {
                    break;
                }
            }
            info!(packets = sent, out = %out.display(), "process finished");
        }
        Commands::Cleanup => {
            let client = open_client(&cli.store, config, Arc::new(NoSender))?;
            let purge: PurgeCount = client.cleanup()?;
            print_json(&purge)?;
        }
        Commands::Status => {
            let client = open_client(&cli.store, config, Arc::new(NoSender))?;
            print_json(&client.status()?)?;
        }
        Commands::Drive {
            out,
            process_millis,
            cleanup_millis,
        } => {
            if process_millis == 0 || cleanup_millis == 0 {
                bail!("intervals must be >= 1ms");
            }
            let sender = JsonLinesSender::open(&out)?;
            let client = open_client(&cli.store, config, Arc::new(sender))?;
            let service = SiteToSiteService::new(Arc::new(client));
            let driver = Driver::spawn(
                service.clone(),
                DriverIntervals {
                    process: std::time::Duration::from_millis(process_millis),
                    cleanup: std::time::Duration::from_millis(cleanup_millis),
                },
            );
            info!(out = %out.display(), "driving queue, Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            driver.shutdown_and_join().await;
            print_json(&service.status().await?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_needs_key_and_equals() {
        assert_eq!(
            parse_attribute("priority=3").unwrap(),
            ("priority".to_string(), "3".to_string())
        );
        assert_eq!(
            parse_attribute("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_attribute("=3").is_err());
        assert!(parse_attribute("priority").is_err());
    }

    #[test]
    fn config_file_with_prioritizer_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.json");
        std::fs::write(
            &path,
            r#"{
                "preferred_batch_count": 7,
                "prioritizer": { "priority_attribute": "prio", "default_ttl_millis": 5000 }
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.preferred_batch_count, 7);
        let packet = DataPacket::from_payload(b"x".to_vec()).with_attribute("prio", "-2");
        assert_eq!(config.prioritizer().priority_for(&packet), -2);
        assert_eq!(
            config.prioritizer().ttl_for(&packet),
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn invalid_limits_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.json");
        std::fs::write(&path, r#"{ "max_queued_packet_size": 0 }"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
