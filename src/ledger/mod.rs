//! Reservation ledger: the durable record of bookings and the only source of
//! truth for which seats are taken on which date.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use thiserror::Error;

use crate::models::{PassengerInfo, PublicId, Reservation, ReservedMeal};

pub use memory::InMemoryLedger;
pub use postgres::PgLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The commit-time recheck found seats already held by a confirmed
    /// reservation on the same date.
    #[error("seats {0:?} are already held for this date")]
    SeatsTaken(Vec<i64>),

    #[error("public id {0} is already allocated")]
    DuplicatePublicId(PublicId),

    /// Serialization failure or deadlock. Nothing was written.
    #[error("transient write conflict")]
    WriteConflict,

    #[error("corrupt ledger row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Everything needed to persist a reservation, already validated and priced.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub public_id: PublicId,
    pub passenger: PassengerInfo,
    pub travel_date: NaiveDate,
    pub boarding_station_id: i64,
    pub dropping_station_id: i64,
    pub total_amount: Decimal,
    pub seat_ids: Vec<i64>,
    pub meals: Vec<ReservedMeal>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Seats referenced by confirmed reservations on `travel_date`.
    async fn held_seat_ids(&self, travel_date: NaiveDate) -> Result<HashSet<i64>, LedgerError>;

    async fn public_id_exists(&self, public_id: &PublicId) -> Result<bool, LedgerError>;

    /// Rechecks seat availability and writes the reservation with its seat and
    /// meal rows as one atomic unit. Either everything lands or nothing does.
    async fn insert_reservation(&self, new: NewReservation) -> Result<Reservation, LedgerError>;

    async fn find_by_public_id(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError>;

    /// Flips a confirmed reservation to cancelled. Returns `None` when there is
    /// no confirmed reservation under that id (missing or already cancelled).
    async fn mark_cancelled(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError>;
}
