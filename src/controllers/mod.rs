pub mod bookings;
pub mod catalog;
pub mod prediction;
pub mod seats;

use axum::{extract::FromRequest, Router};
use std::sync::Arc;

use crate::error::BookingError;

/// `Json` whose rejections use the API's error body.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(BookingError))]
pub struct ApiJson<T>(pub T);

pub fn routes(state: &crate::AppState) -> Router<Arc<crate::AppState>> {
    let router = Router::new()
        .merge(seats::routes())
        .merge(bookings::routes())
        .merge(catalog::routes());

    if state.config.features.enable_prediction_features {
        router.merge(prediction::routes())
    } else {
        router
    }
}
