use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::AppError;

use super::domain::{HeaderRecord, Reading, UnitConfiguration, UnitKey};
use super::repository::{InspectionStore, PresetAnswers};
use super::service::{ChangeRequest, ReadingsService, SaveError, SaveRequest};

#[derive(Debug, Deserialize)]
pub(crate) struct RowCountPayload {
    pub(crate) configuration: UnitConfiguration,
    #[serde(default)]
    pub(crate) rows: Vec<Reading>,
    #[serde(default)]
    pub(crate) allow_removal: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClassifyPayload {
    pub(crate) header: HeaderRecord,
    pub(crate) rows: Vec<Reading>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusPayload {
    pub(crate) header: HeaderRecord,
    #[serde(default)]
    pub(crate) evaluated_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitPayload {
    #[serde(flatten)]
    pub(crate) request: SaveRequest,
    #[serde(default)]
    pub(crate) answers: PresetAnswers,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangePayload {
    #[serde(flatten)]
    pub(crate) request: ChangeRequest,
    #[serde(default)]
    pub(crate) answers: PresetAnswers,
}

/// Router exposing the engine's UI-facing operations as JSON endpoints.
pub fn readings_router<S>(service: Arc<ReadingsService<S>>) -> Router
where
    S: InspectionStore + 'static,
{
    Router::new()
        .route("/api/v1/readings/row-count", post(row_count_handler::<S>))
        .route("/api/v1/readings/classify", post(classify_handler::<S>))
        .route("/api/v1/readings/status", post(status_handler::<S>))
        .route("/api/v1/readings/submit", post(submit_handler::<S>))
        .route("/api/v1/readings/change", post(change_handler::<S>))
        .route(
            "/api/v1/readings/:job_id/:equip_id/:unit_id",
            get(snapshot_handler::<S>),
        )
        .with_state(service)
}

pub(crate) async fn row_count_handler<S>(
    State(service): State<Arc<ReadingsService<S>>>,
    axum::Json(payload): axum::Json<RowCountPayload>,
) -> Response
where
    S: InspectionStore + 'static,
{
    let plan = service.plan_rows(&payload.configuration, &payload.rows, payload.allow_removal);
    (StatusCode::OK, axum::Json(plan)).into_response()
}

pub(crate) async fn classify_handler<S>(
    State(service): State<Arc<ReadingsService<S>>>,
    axum::Json(payload): axum::Json<ClassifyPayload>,
) -> Response
where
    S: InspectionStore + 'static,
{
    match service
        .classify_reading_set(&payload.header, &payload.rows)
        .await
    {
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S>(
    State(service): State<Arc<ReadingsService<S>>>,
    axum::Json(payload): axum::Json<StatusPayload>,
) -> Response
where
    S: InspectionStore + 'static,
{
    let evaluated_on = payload
        .evaluated_on
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let decision = service.compute_status(&payload.header, evaluated_on);
    (StatusCode::OK, axum::Json(decision)).into_response()
}

pub(crate) async fn submit_handler<S>(
    State(service): State<Arc<ReadingsService<S>>>,
    axum::Json(payload): axum::Json<SubmitPayload>,
) -> Response
where
    S: InspectionStore + 'static,
{
    match service.submit(payload.request, &payload.answers).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn change_handler<S>(
    State(service): State<Arc<ReadingsService<S>>>,
    axum::Json(payload): axum::Json<ChangePayload>,
) -> Response
where
    S: InspectionStore + 'static,
{
    match service.apply_change(payload.request, &payload.answers).await {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn snapshot_handler<S>(
    State(service): State<Arc<ReadingsService<S>>>,
    Path((job_id, equip_id, unit_id)): Path<(String, String, String)>,
) -> Response
where
    S: InspectionStore + 'static,
{
    let key = UnitKey::new(job_id, equip_id, unit_id);
    match service.load(&key).await {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(error) => error_response(error),
    }
}

fn error_response(error: SaveError) -> Response {
    AppError::from(error).into_response()
}
