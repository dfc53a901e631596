use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{Ledger, LedgerError, NewReservation};
use crate::models::{BookingStatus, PublicId, Reservation};

#[derive(Default)]
struct LedgerState {
    bookings: Vec<Reservation>,
    by_public_id: HashMap<PublicId, usize>,
    by_date: HashMap<NaiveDate, Vec<usize>>,
}

impl LedgerState {
    fn held_on(&self, travel_date: NaiveDate) -> HashSet<i64> {
        self.by_date
            .get(&travel_date)
            .into_iter()
            .flatten()
            .map(|&i| &self.bookings[i])
            .filter(|b| b.is_confirmed())
            .flat_map(|b| b.seat_ids.iter().copied())
            .collect()
    }
}

/// Process-local ledger. A single write guard covers recheck and insert, which
/// is what keeps two confirmed reservations off the same seat and date.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.bookings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn held_seat_ids(&self, travel_date: NaiveDate) -> Result<HashSet<i64>, LedgerError> {
        Ok(self.state.read().await.held_on(travel_date))
    }

    async fn public_id_exists(&self, public_id: &PublicId) -> Result<bool, LedgerError> {
        Ok(self.state.read().await.by_public_id.contains_key(public_id))
    }

    async fn insert_reservation(&self, new: NewReservation) -> Result<Reservation, LedgerError> {
        let mut state = self.state.write().await;

        if state.by_public_id.contains_key(&new.public_id) {
            return Err(LedgerError::DuplicatePublicId(new.public_id));
        }

        let held = state.held_on(new.travel_date);
        let mut taken: Vec<i64> = new.seat_ids.iter().copied().filter(|s| held.contains(s)).collect();
        if !taken.is_empty() {
            taken.sort_unstable();
            return Err(LedgerError::SeatsTaken(taken));
        }

        let index = state.bookings.len();
        let reservation = Reservation {
            id: index as i64 + 1,
            public_id: new.public_id,
            passenger: new.passenger,
            travel_date: new.travel_date,
            boarding_station_id: new.boarding_station_id,
            dropping_station_id: new.dropping_station_id,
            status: BookingStatus::Confirmed,
            total_amount: new.total_amount,
            created_at: new.created_at,
            seat_ids: new.seat_ids,
            meals: new.meals,
        };

        state.by_public_id.insert(reservation.public_id.clone(), index);
        state.by_date.entry(reservation.travel_date).or_default().push(index);
        state.bookings.push(reservation.clone());

        Ok(reservation)
    }

    async fn find_by_public_id(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.by_public_id.get(public_id).map(|&i| state.bookings[i].clone()))
    }

    async fn mark_cancelled(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError> {
        let mut state = self.state.write().await;
        let Some(&index) = state.by_public_id.get(public_id) else {
            return Ok(None);
        };

        let booking = &mut state.bookings[index];
        if !booking.is_confirmed() {
            return Ok(None);
        }
        booking.status = BookingStatus::Cancelled;
        Ok(Some(booking.clone()))
    }
}
