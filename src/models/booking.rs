use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use super::{Deck, MealType, Station, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownVariant { kind: "booking status", value: other.to_string() }),
        }
    }
}

/// Customer-facing booking code such as `BK7X3M9K`. Always stored upper-case,
/// which is what makes lookups case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicId(String);

impl PublicId {
    /// Width of the `public_id` column.
    pub const MAX_LEN: usize = 20;

    /// Normalizes user input. Returns `None` for anything that could never
    /// have been issued (empty, too long, non-alphanumeric).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > Self::MAX_LEN
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return None;
        }
        Some(PublicId(trimmed.to_ascii_uppercase()))
    }

    pub(crate) fn from_trusted(value: String) -> Self {
        PublicId(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PassengerInfo {
    #[serde(rename = "passenger_name")]
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(rename = "passenger_phone")]
    #[validate(length(min = 7, max = 15))]
    pub phone: String,
    #[serde(rename = "passenger_email", default)]
    #[validate(email)]
    pub email: Option<String>,
}

impl PassengerInfo {
    pub(crate) fn normalized(&self) -> Self {
        PassengerInfo {
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            email: self
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }
}

/// One meal ordered for one passenger seat, as it arrives in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealSelection {
    pub seat_id: i64,
    pub meal_id: i64,
}

/// Persisted meal line. The seat is always one of the reservation's own seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedMeal {
    pub meal_id: i64,
    pub seat_id: i64,
}

impl From<MealSelection> for ReservedMeal {
    fn from(selection: MealSelection) -> Self {
        ReservedMeal { meal_id: selection.meal_id, seat_id: selection.seat_id }
    }
}

/// A reservation as the ledger stores it: ids only, no catalog data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: i64,
    pub public_id: PublicId,
    pub passenger: PassengerInfo,
    pub travel_date: NaiveDate,
    pub boarding_station_id: i64,
    pub dropping_station_id: i64,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub seat_ids: Vec<i64>,
    pub meals: Vec<ReservedMeal>,
}

impl Reservation {
    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatDetail {
    pub seat_id: i64,
    pub seat_number: String,
    pub deck: Deck,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealDetail {
    pub meal_id: i64,
    pub meal_name: String,
    pub meal_type: MealType,
    pub seat_id: i64,
    pub seat_number: String,
    pub price: Decimal,
}

/// Fully resolved reservation returned on create and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDetails {
    pub id: i64,
    pub booking_id: PublicId,
    #[serde(flatten)]
    pub passenger: PassengerInfo,
    pub travel_date: NaiveDate,
    pub boarding_station: Station,
    pub dropping_station: Station,
    pub seats: Vec<SeatDetail>,
    pub meals: Vec<MealDetail>,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}
