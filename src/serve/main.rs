//! Region drawing server.
//!
//! Holds one drawing session per client and exposes place filtering,
//! postcode sampling and export over HTTP.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use clap::Parser;
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use townscope::catalog::load_catalog;
use townscope::config::Config;
use townscope::postcodes::{PostcodeSampler, PostcodesIoClient};
use townscope::ready::{Phase, ReadyGate};
use townscope::region::PlaceIndex;
use townscope::session::SessionStore;

mod sessions;

#[derive(Parser, Debug)]
#[command(name = "serve")]
#[command(about = "UK region drawing server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    listen: String,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Place catalog CSV, overrides the config file
    #[arg(long)]
    catalog: Option<PathBuf>,
}

/// Application state shared across handlers
pub(crate) struct AppState {
    catalog: OnceLock<Arc<PlaceIndex>>,
    sampler: OnceLock<PostcodeSampler<PostcodesIoClient>>,
    gate: ReadyGate,
    sessions: Mutex<SessionStore>,
}

pub(crate) type ApiResult<T> = Result<T, (StatusCode, String)>;

impl AppState {
    pub(crate) fn catalog(&self) -> ApiResult<Arc<PlaceIndex>> {
        if !self.gate.is_ready() {
            return Err(not_ready());
        }
        self.catalog.get().cloned().ok_or_else(not_ready)
    }

    pub(crate) fn sampler(&self) -> ApiResult<&PostcodeSampler<PostcodesIoClient>> {
        if !self.gate.is_ready() {
            return Err(not_ready());
        }
        self.sampler.get().ok_or_else(not_ready)
    }
}

fn not_ready() -> (StatusCode, String) {
    (StatusCode::SERVICE_UNAVAILABLE, "Still starting up".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Townscope Server");

    let config = Config::load_or_default(args.config.as_deref())?;
    let catalog_path = args.catalog.unwrap_or_else(|| config.catalog.path.clone());
    let sampler_config = config.sampler.to_sampler_config()?;

    let state = Arc::new(AppState {
        catalog: OnceLock::new(),
        sampler: OnceLock::new(),
        gate: ReadyGate::new(),
        sessions: Mutex::new(SessionStore::new(
            Duration::from_secs(config.server.session_idle_secs),
            config.region.bounds,
        )),
    });

    // Catalog loading and lookup setup finish independently
    {
        let state = state.clone();
        tokio::spawn(async move {
            let loaded = tokio::task::spawn_blocking(move || {
                load_catalog(&catalog_path).map(PlaceIndex::build)
            })
            .await;

            match loaded {
                Ok(Ok(index)) => {
                    info!("Catalog ready with {} located places", index.len());
                    let _ = state.catalog.set(Arc::new(index));
                    state.gate.mark(Phase::Catalog);
                }
                Ok(Err(e)) => error!("Failed to load catalog: {:#}", e),
                Err(e) => error!("Catalog loader panicked: {}", e),
            }
        });
    }

    let client = PostcodesIoClient::new(&config.lookup.base_url, sampler_config.chunk_timeout)
        .context("Failed to create postcode lookup client")?;
    info!("Postcode lookups go to {}", client.endpoint());
    let _ = state.sampler.set(PostcodeSampler::new(client, sampler_config));
    state.gate.mark(Phase::Lookup);

    {
        let state = state.clone();
        tokio::spawn(async move {
            state.gate.wait().await;
            info!("Accepting session requests");
        });
    }

    // Drop sessions nobody has touched for a while
    {
        let state = state.clone();
        let period = Duration::from_secs(config.server.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                state.sessions.lock().await.evict_idle(Instant::now());
            }
        });
    }

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/sessions", post(sessions::create_session))
        .route("/v1/sessions/{id}", delete(sessions::delete_session))
        .route("/v1/sessions/{id}/events", post(sessions::draw_event))
        .route("/v1/sessions/{id}/filter", put(sessions::set_filter))
        .route(
            "/v1/sessions/{id}/exclusions",
            post(sessions::add_exclusion).delete(sessions::clear_exclusions),
        )
        .route("/v1/sessions/{id}/places", get(sessions::get_places))
        .route("/v1/sessions/{id}/postcodes", post(sessions::sample_postcodes))
        .route(
            "/v1/sessions/{id}/postcodes/{postcode}",
            delete(sessions::remove_postcode),
        )
        .route("/v1/sessions/{id}/export/{kind}", get(sessions::export))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Starting server on {}", args.listen);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let ready = state.gate.is_ready();

    Json(HealthResponse {
        status: if ready { "ok" } else { "starting" },
        catalog_places: state.catalog.get().map(|c| c.len()),
        lookup: state.sampler.get().is_some(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    catalog_places: Option<usize>,
    lookup: bool,
}
