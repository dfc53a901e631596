pub mod availability;
pub mod booking;
pub mod fare;
pub mod prediction;
pub mod public_id;

pub use availability::{AvailabilityResolver, SeatAvailability};
pub use booking::{BookingEngine, BookingPolicy, Cancellation, CreateReservation, IdSource};
pub use prediction::BookingFeatures;
