//! Locus - location tracking, morning weather notifications and map viewer.
//!
//! Run with: `cargo run -p locus-service -- run`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::{Parser, Subcommand};
use time::{Date, OffsetDateTime, Time};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use locus_service::{AppState, Config, Scheduler, Secrets, Services, Task, api, map, run_task};
use locus_store::{ExportOptions, Store, export_history, import_history};
use locus_types::parse_date;

/// Locus - location tracking and morning weather notifications.
#[derive(Parser, Debug)]
#[command(name = "locus")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Tracked device (overrides config and FOLLOWMEE_DEVICE_ID).
    #[arg(long, global = true)]
    device_id: Option<String>,

    /// Log debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run {
        /// Serve HTTP only, without the background jobs.
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Run a single job and print its result as JSON.
    Task {
        /// Job name: `location` or `weather`.
        name: String,
    },

    /// Export a device's history to CSV.
    Export {
        /// First day to export (YYYY-MM-DD, UTC).
        #[arg(long)]
        start: Option<String>,

        /// Last day to export (YYYY-MM-DD, UTC), inclusive.
        #[arg(long)]
        end: Option<String>,

        /// Overwrite the file instead of merging into it.
        #[arg(long)]
        replace: bool,

        /// Output file (defaults to the configured export directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a history CSV into the database.
    Import {
        /// CSV file with `Date,Latitude,Longitude` columns.
        file: PathBuf,
    },

    /// Serve the map viewer for a history file.
    Map {
        /// CSV file (defaults to the device's export).
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let secrets = Secrets::from_env();
    let config = load_config(&args, &secrets)?;

    match args.command {
        Some(Command::Run { no_scheduler }) => run_server(config, secrets, no_scheduler).await,
        None => run_server(config, secrets, false).await,
        Some(Command::Task { name }) => run_once(config, secrets, &name).await,
        Some(Command::Export {
            start,
            end,
            replace,
            output,
        }) => export(config, start, end, replace, output),
        Some(Command::Import { file }) => import(config, file),
        Some(Command::Map { file }) => serve_map(config, file).await,
    }
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = if args.quiet {
        "warn"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("locus_service={level}").parse()?)
                .add_directive(format!("locus_core={level}").parse()?)
                .add_directive(format!("locus_store={level}").parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();
    Ok(())
}

fn load_config(args: &Args, secrets: &Secrets) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Ignoring default config: {}", e);
            Config::default()
        }),
    };

    // Override config with CLI args
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    if let Some(device_id) = &args.device_id {
        config.tracking.device_id = Some(device_id.clone());
    }
    if config.tracking.device_id.is_none() {
        config.tracking.device_id = secrets.followmee_device_id.clone();
    }

    config.validate()?;
    Ok(config)
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    info!("Opening database at {:?}", config.storage.path);
    Ok(Store::open(&config.storage.path)?)
}

fn require_device(config: &Config) -> anyhow::Result<String> {
    config
        .tracking
        .device_id
        .clone()
        .context("no device configured: pass --device-id or set FOLLOWMEE_DEVICE_ID")
}

async fn run_server(config: Config, secrets: Secrets, no_scheduler: bool) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let services = Services::from_secrets(&secrets, &config);
    let state = AppState::new(store, config.clone(), services);

    if no_scheduler {
        info!("Background jobs disabled");
    } else {
        Scheduler::new(Arc::clone(&state)).start().await;
    }

    // Build the router
    let mut app = Router::new().merge(api::router());
    match &config.tracking.device_id {
        Some(device_id) => app = app.merge(map::router(config.export_path(device_id))),
        None => info!("Map viewer disabled: no device configured"),
    }
    let app = with_layers(app).with_state(state);

    serve(&config.server.bind, app).await
}

fn with_layers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

async fn serve(bind: &str, app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = bind.parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_once(config: Config, secrets: Secrets, name: &str) -> anyhow::Result<()> {
    let task: Task = name.parse()?;
    let store = open_store(&config)?;
    let services = Services::from_secrets(&secrets, &config);
    let state = AppState::new(store, config, services);

    let outcome = run_task(&state, task).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
    Ok(())
}

fn day_start(value: &str) -> anyhow::Result<OffsetDateTime> {
    Ok(day(value)?.midnight().assume_utc())
}

fn day_end(value: &str) -> anyhow::Result<OffsetDateTime> {
    Ok(day(value)?.with_time(Time::MAX).assume_utc())
}

fn day(value: &str) -> anyhow::Result<Date> {
    Ok(parse_date(value)?)
}

fn export(
    config: Config,
    start: Option<String>,
    end: Option<String>,
    replace: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let device_id = require_device(&config)?;
    let store = open_store(&config)?;

    let mut options = ExportOptions::new(&device_id)
        .append(config.export.append && !replace)
        .path(output.unwrap_or_else(|| config.export_path(&device_id)));
    if let Some(start) = start {
        options = options.start(day_start(&start)?);
    }
    if let Some(end) = end {
        options = options.end(day_end(&end)?);
    }

    let summary = export_history(&store, &options)?;
    println!(
        "Wrote {} row(s) to {} ({} existing, {} queried)",
        summary.written_rows,
        summary.path.display(),
        summary.existing_rows,
        summary.queried_rows
    );
    Ok(())
}

fn import(config: Config, file: PathBuf) -> anyhow::Result<()> {
    let device_id = require_device(&config)?;
    let store = open_store(&config)?;

    let imported = import_history(&store, &device_id, &file)?;
    println!("Imported {} row(s) for device {}", imported, device_id);
    Ok(())
}

async fn serve_map(config: Config, file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match file {
        Some(path) => path,
        None => config.export_path(&require_device(&config)?),
    };
    if !path.exists() {
        warn!("The CSV file {} does not exist yet", path.display());
    }

    let app = with_layers(map::router(path));
    serve(&config.server.bind, app).await
}
