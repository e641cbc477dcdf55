// src/main.rs - kobra-mockd entry point: mock server and log tail CLI
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};

use kobra_mock::config::Config;
use kobra_mock::logmock::{self, LogStore};
use kobra_mock::logtail::{LogTailer, TailConfig};
use kobra_mock::printer::channel;
use kobra_mock::printer::files;
use kobra_mock::printer::simulator::Simulator;
use kobra_mock::web::api::{self, AppStateInner, SystemDiag};

#[derive(Parser)]
#[command(name = "kobra-mockd", about = "Mock backend for the Kobra printer console")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "kobra-mock.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the mock printer backend.
    Serve {
        /// Override the bind address, e.g. 127.0.0.1:9090.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Tail a Range-capable remote log endpoint.
    Tail {
        /// URL of the log endpoint, e.g. http://localhost:8080/files/log.
        url: String,

        /// Keep polling for new content.
        #[arg(short, long)]
        follow: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Tail { url, follow } => tail(config, url, follow).await,
    }
}

async fn serve(
    config: Config,
    bind: Option<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing::info!("Starting Kobra mock backend");

    let log = LogStore::new(&config.log_mock);
    let growth = logmock::spawn_growth(
        log.clone(),
        Duration::from_secs(config.log_mock.growth_interval_secs),
    );

    let simulator = Simulator::new(config.simulator.clone());
    tracing::info!("Simulated printer id: {}", simulator.printer_id());

    let (printer_tx, printer_rx) = mpsc::channel(16);
    let (updates, _) = broadcast::channel(64);
    let tick = Duration::from_secs(config.simulator.tick_secs);
    tokio::spawn(channel::run(simulator, printer_rx, updates.clone(), tick));

    let state = std::sync::Arc::new(AppStateInner {
        printer_tx,
        updates,
        log,
        files: files::generate_listing(),
        system: Mutex::new(SystemDiag {
            started_at: Instant::now(),
            ssh_status: 2,
        }),
    });
    let app = api::router(state);

    let addr = bind.unwrap_or_else(|| {
        format!("{}:{}", config.server.bind_address, config.server.port)
    });
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Mock API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    growth.abort();
    Ok(())
}

async fn tail(
    config: Config,
    url: String,
    follow: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let mut tailer = LogTailer::new(TailConfig::from_settings(url, &config.tail));
    tailer.load().await?;
    for entry in tailer.entries() {
        print_entry(entry);
    }

    if !follow {
        return Ok(());
    }
    loop {
        tokio::time::sleep(tailer.poll_interval()).await;
        for entry in &tailer.poll().await {
            print_entry(entry);
        }
    }
}

fn print_entry(entry: &kobra_mock::logtail::LogEntry) {
    if entry.count > 1 {
        println!("{} (x{})", entry.line, entry.count);
    } else {
        println!("{}", entry.line);
    }
}
