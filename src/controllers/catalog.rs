use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::models::{Meal, Station};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stations", get(list_stations))
        .route("/meals", get(list_meals))
}

// GET /api/stations, ordered along the route
pub async fn list_stations(State(state): State<Arc<AppState>>) -> Json<Vec<Station>> {
    Json(state.catalog.list_stations().to_vec())
}

// GET /api/meals
pub async fn list_meals(State(state): State<Arc<AppState>>) -> Json<Vec<Meal>> {
    Json(state.catalog.list_meals().to_vec())
}
