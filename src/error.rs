use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Everything the booking engine can refuse a caller with. All variants except
/// `IdAllocationExhausted` and `Storage` are fixable by changing the request.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("malformed request body: {0}")]
    InvalidBody(String),

    #[error("invalid travel date: {0}")]
    InvalidDate(String),

    #[error("unknown station {0}")]
    UnknownStation(i64),

    #[error("boarding station {boarding} must come before dropping station {dropping} on the route")]
    InvalidRoute { boarding: i64, dropping: i64 },

    #[error("unknown seat {0}")]
    UnknownSeat(i64),

    #[error("at least one seat must be selected")]
    NoSeatSelected,

    #[error("meal {meal_id} cannot be attached to seat {seat_id}")]
    InvalidMealAssociation { meal_id: i64, seat_id: i64 },

    #[error("invalid passenger details: {0}")]
    InvalidPassenger(String),

    #[error("seats {0:?} are already booked for this date")]
    SeatUnavailable(Vec<i64>),

    #[error("booking {0} not found")]
    NotFound(String),

    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("could not allocate a unique booking id after {0} attempts")]
    IdAllocationExhausted(u32),

    #[error(transparent)]
    Storage(#[from] LedgerError),
}

impl BookingError {
    pub fn code(&self) -> &'static str {
        match self {
            BookingError::InvalidBody(_) => "invalid_body",
            BookingError::InvalidDate(_) => "invalid_date",
            BookingError::UnknownStation(_) => "unknown_station",
            BookingError::InvalidRoute { .. } => "invalid_route",
            BookingError::UnknownSeat(_) => "unknown_seat",
            BookingError::NoSeatSelected => "no_seat_selected",
            BookingError::InvalidMealAssociation { .. } => "invalid_meal_association",
            BookingError::InvalidPassenger(_) => "invalid_passenger",
            BookingError::SeatUnavailable(_) => "seat_unavailable",
            BookingError::NotFound(_) => "not_found",
            BookingError::AlreadyCancelled(_) => "already_cancelled",
            BookingError::IdAllocationExhausted(_) => "id_allocation_exhausted",
            BookingError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::InvalidBody(_)
            | BookingError::InvalidDate(_)
            | BookingError::UnknownStation(_)
            | BookingError::InvalidRoute { .. }
            | BookingError::UnknownSeat(_)
            | BookingError::NoSeatSelected
            | BookingError::InvalidMealAssociation { .. }
            | BookingError::InvalidPassenger(_) => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::SeatUnavailable(_) | BookingError::AlreadyCancelled(_) => {
                StatusCode::CONFLICT
            }
            BookingError::IdAllocationExhausted(_) | BookingError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for BookingError {
    fn from(rejection: JsonRejection) -> Self {
        BookingError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            BookingError::SeatUnavailable(seat_ids) => json!({
                "error": self.code(),
                "message": self.to_string(),
                "seat_ids": seat_ids,
            }),
            BookingError::IdAllocationExhausted(_) | BookingError::Storage(_) => {
                tracing::error!("booking request failed: {}", self);
                json!({
                    "error": self.code(),
                    "message": "Internal Server Error",
                })
            }
            _ => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_errors_map_to_client_statuses() {
        assert_eq!(BookingError::NoSeatSelected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            BookingError::InvalidRoute { boarding: 3, dropping: 1 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(BookingError::NotFound("BK2222AA".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(BookingError::SeatUnavailable(vec![1]).status(), StatusCode::CONFLICT);
        assert_eq!(BookingError::AlreadyCancelled("BK2222AA".into()).status(), StatusCode::CONFLICT);
    }

    #[test]
    fn malformed_body_is_a_client_error() {
        let err = BookingError::InvalidBody("missing field `seat_ids`".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "invalid_body");
    }

    #[test]
    fn exhaustion_is_a_server_fault() {
        let err = BookingError::IdAllocationExhausted(5);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "id_allocation_exhausted");
    }
}
