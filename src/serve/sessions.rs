//! Session endpoints.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use townscope::export::{clipboard_text, export_filename, export_places, export_postcodes, ExportKind, TableFormat};
use townscope::region::{FilterOutcome, SortOrder};
use townscope::session::{DrawEvent, SamplingStatus, Session, ShapeId};

use crate::{ApiResult, AppState};

#[derive(Serialize)]
pub(crate) struct CreatedSession {
    id: Uuid,
}

/// Snapshot of a session returned by every mutating endpoint
#[derive(Serialize)]
pub(crate) struct SessionView {
    shapes: usize,
    population_min: u64,
    excluded: Vec<String>,
    places: FilterOutcome,
    postcodes: BTreeSet<String>,
    sampling: Option<SamplingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_shape: Option<ShapeId>,
}

impl SessionView {
    fn of(session: &Session) -> Self {
        Self {
            shapes: session.shape_count(),
            population_min: session.population_min(),
            excluded: session.excluded(),
            places: session.places().clone(),
            postcodes: session.postcodes().clone(),
            sampling: session.sampling_status(),
            created_shape: None,
        }
    }
}

fn unknown_session(id: Uuid) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("No session {}", id))
}

/// Run `f` against a session while holding the session lock
async fn with_session<T>(
    state: &AppState,
    id: Uuid,
    f: impl FnOnce(&mut Session) -> ApiResult<T>,
) -> ApiResult<T> {
    let mut sessions = state.sessions.lock().await;
    let session = sessions.get_mut(&id).ok_or_else(|| unknown_session(id))?;
    f(session)
}

pub(crate) async fn create_session(State(state): State<Arc<AppState>>) -> ApiResult<Json<CreatedSession>> {
    state.catalog()?;

    let id = state.sessions.lock().await.create();
    info!("Created session {}", id);

    Ok(Json(CreatedSession { id }))
}

pub(crate) async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !state.sessions.lock().await.remove(&id) {
        return Err(unknown_session(id));
    }
    info!("Deleted session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn draw_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(event): Json<DrawEvent>,
) -> ApiResult<Json<SessionView>> {
    let catalog = state.catalog()?;

    with_session(&state, id, |session| {
        let created = session
            .apply(event, &catalog)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
        let mut view = SessionView::of(session);
        view.created_shape = created;
        Ok(Json(view))
    })
    .await
}

#[derive(Deserialize)]
pub(crate) struct FilterRequest {
    population_min: Option<u64>,
    sort: Option<SortOrder>,
}

pub(crate) async fn set_filter(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<FilterRequest>,
) -> ApiResult<Json<SessionView>> {
    let catalog = state.catalog()?;

    with_session(&state, id, |session| {
        if let Some(sort) = request.sort {
            session.set_sort(sort, &catalog);
        }
        if let Some(population_min) = request.population_min {
            session.set_population_min(population_min, &catalog);
        }
        Ok(Json(SessionView::of(session)))
    })
    .await
}

#[derive(Deserialize)]
pub(crate) struct ExclusionRequest {
    name: String,
}

pub(crate) async fn add_exclusion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ExclusionRequest>,
) -> ApiResult<Json<SessionView>> {
    let catalog = state.catalog()?;

    with_session(&state, id, |session| {
        session.exclude(&request.name, &catalog);
        Ok(Json(SessionView::of(session)))
    })
    .await
}

pub(crate) async fn clear_exclusions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let catalog = state.catalog()?;

    with_session(&state, id, |session| {
        session.clear_exclusions(&catalog);
        Ok(Json(SessionView::of(session)))
    })
    .await
}

pub(crate) async fn get_places(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    state.catalog()?;
    with_session(&state, id, |session| Ok(Json(SessionView::of(session)))).await
}

#[derive(Serialize)]
pub(crate) struct SampleResponse {
    /// False when a newer run or a shape change superseded this one
    applied: bool,
    postcodes: BTreeSet<String>,
    clipboard: String,
    points_sampled: usize,
    chunks_total: usize,
    chunks_failed: usize,
    areas_skipped: usize,
    total_failure: bool,
    errors: Vec<String>,
}

pub(crate) async fn sample_postcodes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SampleResponse>> {
    let sampler = state.sampler()?;

    let ticket = with_session(&state, id, |session| {
        session
            .begin_sampling()
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "Draw a shape first".to_string()))
    })
    .await?;

    // The session lock is not held while lookups are in flight
    let report = sampler.sample_shapes(&ticket.shapes).await;
    if let Some(message) = report.warning() {
        warn!("Session {}: {}", id, message);
    }

    let response = SampleResponse {
        applied: false,
        postcodes: report.postcodes.clone(),
        clipboard: clipboard_text(&report.postcodes),
        points_sampled: report.points_sampled,
        chunks_total: report.chunks_total,
        chunks_failed: report.chunks_failed,
        areas_skipped: report.areas_skipped,
        total_failure: report.total_failure(),
        errors: report.errors.clone(),
    };

    let applied = with_session(&state, id, |session| Ok(session.complete_sampling(ticket, report))).await?;
    debug!("Session {} sampling applied: {}", id, applied);

    Ok(Json(SampleResponse { applied, ..response }))
}

pub(crate) async fn remove_postcode(
    State(state): State<Arc<AppState>>,
    Path((id, postcode)): Path<(Uuid, String)>,
) -> ApiResult<Json<SessionView>> {
    state.catalog()?;

    with_session(&state, id, |session| {
        if !session.remove_postcode(&postcode) {
            return Err((StatusCode::NOT_FOUND, format!("Postcode {} not in session", postcode)));
        }
        Ok(Json(SessionView::of(session)))
    })
    .await
}

#[derive(Deserialize)]
pub(crate) struct ExportParams {
    #[serde(default)]
    format: TableFormat,
}

pub(crate) async fn export(
    State(state): State<Arc<AppState>>,
    Path((id, kind)): Path<(Uuid, ExportKind)>,
    Query(params): Query<ExportParams>,
) -> ApiResult<impl IntoResponse> {
    state.catalog()?;
    let format = params.format;

    let body = with_session(&state, id, |session| {
        let rendered = match kind {
            ExportKind::Locations => export_places(session.places().places(), format),
            ExportKind::Postcodes => export_postcodes(session.postcodes(), format),
        };
        rendered.map_err(|e| {
            error!("Export failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
    })
    .await?;

    let filename = export_filename(kind, format, chrono::Local::now().date_naive());

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}
