use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use super::ApiJson;
use crate::error::BookingError;
use crate::models::{PublicId, ReservationDetails};
use crate::services::CreateReservation;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route("/bookings/{public_id}", get(get_booking).delete(cancel_booking))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateReservation>,
) -> Result<impl IntoResponse, BookingError> {
    let details = state.engine.create(req).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

// GET /api/bookings/{public_id}
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(public_id): Path<String>,
) -> Result<Json<ReservationDetails>, BookingError> {
    Ok(Json(state.engine.get(&public_id).await?))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub booking_id: PublicId,
    pub refund_amount: Decimal,
}

// DELETE /api/bookings/{public_id}
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(public_id): Path<String>,
) -> Result<Json<CancelResponse>, BookingError> {
    let cancellation = state.engine.cancel(&public_id).await?;
    Ok(Json(CancelResponse {
        message: format!("Booking {} cancelled", cancellation.booking_id),
        booking_id: cancellation.booking_id,
        refund_amount: cancellation.refund_amount,
    }))
}
