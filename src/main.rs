//! Entry point dispatcher: `server` (run the processor) and `schema`
//! (bootstrap tables), both sharing the same connector construction.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use scan_ingest::bus::pubsub::PubsubBus;
use scan_ingest::config::{Config, LoggingConfig, PostgresConfig, PubsubConfig};
use scan_ingest::{logging, Connector, Processor, ScanEntryRepository, TransactionRunner};

#[derive(Parser)]
#[command(name = "scan-ingest", about = "Host-scan ingestion worker")]
struct Cli {
    #[arg(long, env = "POSTGRES_HOST")]
    pghost: String,

    #[arg(long, env = "POSTGRES_PORT", default_value_t = 5432)]
    pgport: u16,

    #[arg(long, env = "POSTGRES_USER")]
    pguser: String,

    #[arg(long, env = "POSTGRES_PASSWORD")]
    pgpass: String,

    #[arg(long, env = "POSTGRES_DB")]
    pgdb: String,

    #[arg(short = 'P', long, env = "PUBSUB_PROJECT_ID", default_value = "test-project")]
    pubsub_project: String,

    #[arg(short = 'T', long, env = "PUBSUB_TOPIC_ID", default_value = "scan-topic")]
    pubsub_topic: String,

    #[arg(short = 'D', long)]
    debug: bool,

    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion processor until shutdown.
    Server,
    /// Bootstrap the persisted schema and exit.
    Schema,
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Config {
            postgres: PostgresConfig {
                host: cli.pghost.clone(),
                port: cli.pgport,
                user: cli.pguser.clone(),
                password: cli.pgpass.clone(),
                database: cli.pgdb.clone(),
            },
            pubsub: PubsubConfig {
                project_id: cli.pubsub_project.clone(),
                topic_id: cli.pubsub_topic.clone(),
            },
            logging: LoggingConfig {
                debug: cli.debug,
                pretty: cli.pretty,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from(&cli);

    if let Err(err) = logging::init(&config.logging) {
        eprintln!("failed to initialize logger: {err}");
    }

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let result = match cli.command {
        Command::Server => run_server(config, cancel).await,
        Command::Schema => run_schema(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("fatal: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Config, cancel: CancellationToken) -> anyhow::Result<()> {
    log::info!("connecting to {}", config.postgres.redacted_url());
    let connector = Connector::spawn(config.postgres.clone());
    let runner = TransactionRunner::new(connector.clone());
    let repository = ScanEntryRepository::new(runner);

    let bus = PubsubBus::connect(&config.pubsub.project_id).await?;
    let processor = Processor::new(bus, config.pubsub.topic_id.clone(), repository, cancel);

    let outcome = processor.run().await;
    connector.close().await;
    outcome.map_err(anyhow::Error::from)
}

async fn run_schema(config: Config) -> anyhow::Result<()> {
    log::info!("connecting to {}", config.postgres.redacted_url());
    let connector = Connector::spawn(config.postgres.clone());
    let runner = TransactionRunner::new(connector.clone());
    let repository = ScanEntryRepository::new(runner);

    let outcome = repository.initialize_schema().await;
    connector.close().await;
    outcome.map_err(anyhow::Error::from)
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("received SIGINT, shutting down");
            }
            _ = terminate.recv() => {
                log::info!("received SIGTERM, shutting down");
            }
        }
        cancel.cancel();
    });
}
