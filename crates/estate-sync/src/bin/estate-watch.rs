//! estate-watch: mount a live view of one catalog collection and log it.
//!
//! Usage:
//!   estate-watch flat --size 5 --sort price --desc
//!   estate-watch house --filter name=Tower
//!   estate-watch approvals
//!
//! Connection settings come from the environment (`.env` is loaded):
//!   ESTATE_API_URL, ESTATE_WS_URL, ESTATE_TOKEN, ESTATE_LOGIN,
//!   ESTATE_HTTP_TIMEOUT, ESTATE_WS_RECONNECT_SECS
//!
//! Without ESTATE_TOKEN, ESTATE_LOGIN and ESTATE_PASSWORD are used to sign in.
//!
//! Logging:
//!   LOG_FORMAT  - "json" or "text" (default: "text")
//!   LOG_FILE    - path to log file (optional, daily rotation)
//!   LOG_ANSI    - "true"/"false" override ANSI colors
//!   RUST_LOG    - env filter (default: "estate_sync=debug,estate_client=debug")

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use estate_client::{config as client_config, ClientConfig, EntityFetcher, RestClient};
use estate_core::{
    defaults, ApprovalRequest, Entity, EntityKind, Flat, House, Query, SortDirection, UploadRecord,
};
use estate_sync::{CollectionView, LiveView, PushConfig, PushHub, Severity, WsConnector};

#[derive(Parser)]
#[command(name = "estate-watch")]
#[command(about = "Watch a live page of the estate catalog")]
#[command(version)]
struct Cli {
    /// Collection to watch: flat, house, upload-history, approvals
    #[arg(default_value = "flat")]
    entity: EntityKind,

    /// Zero-based page index
    #[arg(long, default_value_t = defaults::FIRST_PAGE)]
    page: u32,

    /// Rows per page
    #[arg(long, default_value_t = defaults::PAGE_SIZE)]
    size: u32,

    /// Sort column
    #[arg(long, default_value = defaults::SORT_COLUMN)]
    sort: String,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Filter as column=value (repeatable)
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Backend base URL (overrides ESTATE_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Push endpoint (overrides ESTATE_WS_URL)
    #[arg(long)]
    ws_url: Option<String>,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected column=value, got '{}'", s))?;
    Ok((column.trim().to_string(), value.to_string()))
}

fn init_logging() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "estate_sync=debug,estate_client=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("estate-watch.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();
    let cli = Cli::parse();

    let mut client_cfg = ClientConfig::from_env();
    if let Some(url) = cli.api_url {
        client_cfg.base_url = url.trim_end_matches('/').to_string();
    }
    let session = client_config::session_from_env();
    let mut client = RestClient::new(client_cfg, session).context("Failed to build REST client")?;
    if !client.session().is_authenticated() {
        match (std::env::var("ESTATE_LOGIN"), std::env::var("ESTATE_PASSWORD")) {
            (Ok(login), Ok(password)) => {
                let session = client
                    .sign_in(&login, &password)
                    .await
                    .with_context(|| format!("Sign-in failed for {}", login))?;
                client = client.with_session(session);
            }
            _ => warn!("ESTATE_TOKEN is not set, requests will be anonymous"),
        }
    }
    let client = Arc::new(client);

    let mut push_cfg = PushConfig::from_env();
    if let Some(url) = cli.ws_url {
        push_cfg.ws_url = url;
    }
    let hub = PushHub::new(WsConnector::new(push_cfg.ws_url.clone()), push_cfg);

    let direction = if cli.desc {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    };
    let mut query = Query::new()
        .with_page_size(cli.size)
        .with_sort(cli.sort, direction);
    query.set_page(cli.page);
    for (column, value) in cli.filters {
        query
            .filters
            .add(column, value)
            .context("Invalid --filter")?;
    }
    query
        .validate(cli.entity)
        .with_context(|| format!("Invalid query for {}", cli.entity))?;

    info!(entity = %cli.entity, sort = %query.sort_param(), page = query.page, "Starting watch");
    match cli.entity {
        EntityKind::Flat => watch::<Flat>(client, hub, query).await,
        EntityKind::House => watch::<House>(client, hub, query).await,
        EntityKind::UploadHistory => watch::<UploadRecord>(client, hub, query).await,
        EntityKind::ApprovalRequest => watch::<ApprovalRequest>(client, hub, query).await,
    }
}

/// Mount a live view and log every change until Ctrl-C.
async fn watch<T>(client: Arc<RestClient>, hub: PushHub, query: Query) -> anyhow::Result<()>
where
    T: Entity + Debug,
{
    let view = Arc::new(CollectionView::new(EntityFetcher::<T>::new(client), query));
    let mut notifications = view.subscribe_notifications();
    let mut revisions = view.watch();

    let live = LiveView::mount(&hub, Arc::clone(&view)).await;
    log_page(&view);

    loop {
        tokio::select! {
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                log_page(&view);
            }
            note = notifications.recv() => match note {
                Ok(note) if note.severity == Severity::Error => {
                    error!(status = ?note.status, "{}", note.message)
                }
                Ok(note) => info!("{}", note.message),
                Err(RecvError::Lagged(missed)) => warn!(missed, "Notification stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    live.unmount();
    Ok(())
}

fn log_page<T, F>(view: &CollectionView<T, F>)
where
    T: Entity + Debug,
    F: estate_core::CollectionFetcher<T>,
{
    let kind = T::KIND;
    let snapshot = view.snapshot();
    info!(
        entity = %kind,
        page = snapshot.query.page + 1,
        total_pages = snapshot.total_pages,
        rows = snapshot.rows.len(),
        revision = snapshot.revision,
        "Page"
    );
    for row in &snapshot.rows {
        debug!(entity_id = row.id(), "{:?}", row);
    }
}
