pub mod station;
pub mod seat;
pub mod meal;
pub mod booking;

pub use station::Station;
pub use seat::{Deck, Seat, Side};
pub use meal::{Meal, MealType};
pub use booking::{
    BookingStatus, MealDetail, MealSelection, PassengerInfo, PublicId, Reservation,
    ReservationDetails, ReservedMeal, SeatDetail,
};

use thiserror::Error;

/// A text column held a value outside the enum it maps to.
#[derive(Debug, Error)]
#[error("unexpected {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
