use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::BookingError;
use crate::models::{Deck, MealSelection};

/// Inputs handed to the external confirmation estimator. Read-only: nothing
/// computed from these ever feeds back into a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingFeatures {
    pub seat_deck: Deck,
    pub meal_selected: bool,
    /// Days between today and the travel date.
    pub lead_days: i64,
    /// 0 = Monday .. 6 = Sunday.
    pub weekday: u32,
    pub seat_count: usize,
}

/// Builds the feature tuple for a seat selection. Unknown seat ids are
/// rejected so the estimator is never fed a deck it could not have seen.
pub fn extract(
    catalog: &Catalog,
    travel_date: NaiveDate,
    today: NaiveDate,
    seat_ids: &[i64],
    meals: &[MealSelection],
) -> Result<BookingFeatures, BookingError> {
    if seat_ids.is_empty() {
        return Err(BookingError::NoSeatSelected);
    }

    let mut lower = 0usize;
    let mut upper = 0usize;
    for &seat_id in seat_ids {
        match catalog.seat(seat_id).map(|s| s.deck) {
            Some(Deck::Lower) => lower += 1,
            Some(Deck::Upper) => upper += 1,
            None => return Err(BookingError::UnknownSeat(seat_id)),
        }
    }

    Ok(BookingFeatures {
        seat_deck: if upper > lower { Deck::Upper } else { Deck::Lower },
        meal_selected: !meals.is_empty(),
        lead_days: (travel_date - today).num_days(),
        weekday: travel_date.weekday().num_days_from_monday(),
        seat_count: seat_ids.len(),
    })
}
