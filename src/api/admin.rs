//! Admin and Liquidation Handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Json, Path, Query, State,
    },
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::handlers::{body, id_param, ok, ApiResult, AppState};
use super::types::*;
use crate::core::{reports, AdminSummary, LiquidationForm, Session};
use crate::models::{
    AppError, AppResult, LiquidationRequest, Payment, PaymentStatus, Registration,
    RegistrationRecord,
};

// ============================================
// Dashboard
// ============================================

pub async fn admin_summary(State(state): State<Arc<AppState>>) -> ApiResult<AdminSummary> {
    let start = Instant::now();
    Ok(ok(reports::summarize(&state.store)?, start))
}

fn status_filter(filter: RegistrationFilter) -> AppResult<Option<PaymentStatus>> {
    match filter.payment_status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(raw) => raw.parse::<PaymentStatus>().map(Some).map_err(|_| {
            AppError::validation(
                "payment_status must be one of: pending, partially_paid, fully_paid, all",
            )
        }),
    }
}

pub async fn admin_registrations(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RegistrationFilter>,
) -> ApiResult<Vec<RegistrationRecord>> {
    let start = Instant::now();
    let records = state.store.registration_records(status_filter(filter)?)?;
    Ok(ok(records, start))
}

pub async fn cancel_registration(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<Registration> {
    let start = Instant::now();
    let registration = state.store.cancel_registration(id_param(path)?)?;
    info!(registration_id = registration.id, admin = %session.email, "🗑️ Registration cancelled");
    Ok(ok(registration, start))
}

pub async fn admin_payments(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Payment>> {
    let start = Instant::now();
    Ok(ok(state.store.payments()?, start))
}

// ============================================
// Exports
// ============================================

fn attachment(content_type: &'static str, filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (CONTENT_TYPE, content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}

fn export_name(extension: &str) -> String {
    format!("rei25-registrations-{}.{}", Utc::now().format("%Y%m%d"), extension)
}

pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RegistrationFilter>,
) -> AppResult<Response> {
    let records = state.store.registration_records(status_filter(filter)?)?;
    let csv = reports::registrations_csv(&records)?;
    info!(rows = records.len(), "📄 CSV export");
    Ok(attachment("text/csv; charset=utf-8", &export_name("csv"), csv))
}

pub async fn export_pdf(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RegistrationFilter>,
) -> AppResult<Response> {
    let records = state.store.registration_records(status_filter(filter)?)?;
    let pdf = reports::registrations_pdf(&records, Utc::now());
    info!(rows = records.len(), bytes = pdf.len(), "📄 PDF export");
    Ok(attachment("application/pdf", &export_name("pdf"), pdf))
}

// ============================================
// Liquidations
// ============================================

pub async fn create_liquidation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    payload: Result<Json<LiquidationForm>, JsonRejection>,
) -> ApiResult<LiquidationRequest> {
    let start = Instant::now();
    let form = body(payload)?;
    Ok(ok(state.liquidations.create(&session, &form).await?, start))
}

pub async fn list_liquidations(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> ApiResult<Vec<LiquidationRequest>> {
    let start = Instant::now();
    Ok(ok(state.liquidations.list(&session)?, start))
}

pub async fn get_liquidation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
) -> ApiResult<LiquidationRequest> {
    let start = Instant::now();
    Ok(ok(state.liquidations.get(id_param(path)?, &session)?, start))
}

fn review_note(payload: Option<Json<ReviewBody>>) -> Option<String> {
    payload.and_then(|Json(review)| review.note)
}

pub async fn approve_liquidation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
    payload: Option<Json<ReviewBody>>,
) -> ApiResult<LiquidationRequest> {
    let start = Instant::now();
    let note = review_note(payload);
    let updated = state
        .liquidations
        .approve(id_param(path)?, &session, note.as_deref())
        .await?;
    Ok(ok(updated, start))
}

pub async fn reject_liquidation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
    payload: Option<Json<ReviewBody>>,
) -> ApiResult<LiquidationRequest> {
    let start = Instant::now();
    let note = review_note(payload);
    let updated = state
        .liquidations
        .reject(id_param(path)?, &session, note.as_deref())
        .await?;
    Ok(ok(updated, start))
}

pub async fn process_liquidation(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    path: Result<Path<i64>, PathRejection>,
    payload: Option<Json<ReviewBody>>,
) -> ApiResult<LiquidationRequest> {
    let start = Instant::now();
    let note = review_note(payload);
    let updated = state
        .liquidations
        .process(id_param(path)?, &session, note.as_deref())
        .await?;
    Ok(ok(updated, start))
}
