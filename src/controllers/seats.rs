use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::BookingError;
use crate::services::availability::{parse_travel_date, SeatAvailability};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/seats", get(get_seats))
}

#[derive(Debug, Deserialize)]
pub struct SeatsQuery {
    #[serde(alias = "travel_date")]
    pub date: Option<String>,
}

// GET /api/seats?date=YYYY-MM-DD
pub async fn get_seats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SeatsQuery>,
) -> Result<Json<Vec<SeatAvailability>>, BookingError> {
    let raw = params
        .date
        .ok_or_else(|| BookingError::InvalidDate("date query parameter is required".into()))?;
    let date = parse_travel_date(&raw, state.engine.today())?;

    let seats = state.engine.resolver().seat_map(date).await?;
    Ok(Json(seats))
}
