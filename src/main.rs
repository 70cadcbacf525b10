use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use shipflow::application::{QuoteOutcome, ShipmentOrchestrator, Stores, WebhookReceiver};
use shipflow::config::Settings;
use shipflow::domain::ports::ProcessedEventStoreBox;
use shipflow::infrastructure::fedex::FedExGateway;
use shipflow::infrastructure::in_memory::InMemoryProcessedEventStore;
use shipflow::infrastructure::notifier::LogNotifier;
use shipflow::infrastructure::paypal::PayPalGateway;
#[cfg(feature = "storage-rocksdb")]
use shipflow::infrastructure::rocksdb::RocksDBStore;
use shipflow::interfaces::csv::rate_writer::RateWriter;
use shipflow::interfaces::csv::shipment_reader::ShipmentReader;
use shipflow::interfaces::http::{AppState, create_router};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(flatten)]
    settings: Settings,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and webhook endpoint.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
        bind: String,
    },
    /// Quote every shipping request in a CSV file and print the rates as CSV.
    Quote {
        /// Input shipping requests CSV file
        input: PathBuf,
    },
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(Stores, ProcessedEventStoreBox)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        let stores = Stores {
            shipments: Box::new(store.clone()),
            rates: Box::new(store.clone()),
            payments: Box::new(store.clone()),
            tracking: Box::new(store.clone()),
        };
        return Ok((stores, Box::new(store)));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok((
        Stores::in_memory(),
        Box::new(InMemoryProcessedEventStore::new()),
    ))
}

fn build_orchestrator(settings: &Settings, stores: Stores) -> Result<ShipmentOrchestrator> {
    let timeout = settings.http_timeout();
    let carrier = FedExGateway::new(&settings.carrier, timeout).into_diagnostic()?;
    let payments = PayPalGateway::new(&settings.payment, timeout).into_diagnostic()?;
    Ok(ShipmentOrchestrator::new(
        stores,
        Box::new(carrier),
        Box::new(payments),
        Box::new(LogNotifier),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let (stores, processed) = open_stores(cli.db_path)?;
    let orchestrator = build_orchestrator(&cli.settings, stores)?;

    match cli.command {
        Command::Serve { bind } => {
            let orchestrator = Arc::new(orchestrator);
            let webhooks = WebhookReceiver::new(
                orchestrator.clone(),
                processed,
                cli.settings.webhook_event_ttl(),
            );
            let app = create_router(Arc::new(AppState {
                orchestrator,
                webhooks,
            }));

            let listener = tokio::net::TcpListener::bind(&bind).await.into_diagnostic()?;
            info!(%bind, "listening");
            axum::serve(listener, app).await.into_diagnostic()?;
        }
        Command::Quote { input } => {
            let file = File::open(input).into_diagnostic()?;
            let reader = ShipmentReader::new(file);
            let stdout = io::stdout();
            let mut writer = RateWriter::new(stdout.lock());
            writer.write_header().into_diagnostic()?;

            for (line, request) in reader.shipments().enumerate() {
                let request = match request {
                    Ok(request) => request,
                    Err(e) => {
                        eprintln!("Error reading shipment on row {}: {}", line + 1, e);
                        continue;
                    }
                };
                match orchestrator.request_quote(request).await {
                    Ok(QuoteOutcome::Rates { rates, .. }) => {
                        writer.write_rates(&rates).into_diagnostic()?;
                    }
                    Ok(QuoteOutcome::Failed {
                        shipment, message, ..
                    }) => {
                        eprintln!("Quote failed for shipment {}: {}", shipment.id, message);
                    }
                    Err(e) => {
                        eprintln!("Error quoting row {}: {}", line + 1, e);
                    }
                }
            }
        }
    }

    Ok(())
}
