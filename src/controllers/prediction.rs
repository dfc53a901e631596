use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use super::ApiJson;
use crate::error::BookingError;
use crate::models::MealSelection;
use crate::services::BookingFeatures;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/predict/features", post(booking_features))
}

#[derive(Debug, Deserialize)]
pub struct FeaturesRequest {
    pub travel_date: String,
    pub seat_ids: Vec<i64>,
    #[serde(default)]
    pub meals: Vec<MealSelection>,
}

// POST /api/predict/features
pub async fn booking_features(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<FeaturesRequest>,
) -> Result<Json<BookingFeatures>, BookingError> {
    let features = state.engine.features(&req.travel_date, &req.seat_ids, &req.meals)?;
    Ok(Json(features))
}
