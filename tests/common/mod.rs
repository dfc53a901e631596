#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sleeper_bus::cache::AvailabilityCache;
use sleeper_bus::catalog::Catalog;
use sleeper_bus::clock::FixedClock;
use sleeper_bus::ledger::{InMemoryLedger, Ledger, LedgerError, NewReservation};
use sleeper_bus::models::{MealSelection, PassengerInfo, PublicId, Reservation};
use sleeper_bus::services::{BookingEngine, BookingPolicy, CreateReservation, IdSource};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 2, 1).unwrap()
}

pub fn travel_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 2, 10).unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::on(today()))
}

pub fn fast_policy() -> BookingPolicy {
    BookingPolicy {
        retry_backoff: Duration::from_millis(1),
        ..BookingPolicy::default()
    }
}

pub fn engine_with(ledger: Arc<dyn Ledger>) -> BookingEngine {
    BookingEngine::new(Arc::new(Catalog::seeded()), ledger, clock(), fast_policy())
}

pub fn engine() -> BookingEngine {
    engine_with(Arc::new(InMemoryLedger::new()))
}

pub fn engine_with_cache(cache: Arc<dyn AvailabilityCache>) -> BookingEngine {
    engine().with_cache(cache)
}

pub fn passenger() -> PassengerInfo {
    PassengerInfo {
        name: Name().fake(),
        phone: (7_000_000_000u64..9_999_999_999).fake::<u64>().to_string(),
        email: Some(SafeEmail().fake()),
    }
}

pub fn request_on(date: NaiveDate, seat_ids: Vec<i64>) -> CreateReservation {
    CreateReservation {
        travel_date: date.format("%Y-%m-%d").to_string(),
        boarding_station_id: 1,
        dropping_station_id: 5,
        seat_ids,
        meals: vec![],
        passenger: passenger(),
    }
}

pub fn request(seat_ids: Vec<i64>) -> CreateReservation {
    request_on(travel_day(), seat_ids)
}

pub fn with_meals(mut req: CreateReservation, meals: &[(i64, i64)]) -> CreateReservation {
    req.meals = meals
        .iter()
        .map(|&(seat_id, meal_id)| MealSelection { seat_id, meal_id })
        .collect();
    req
}

/// Hands out the given ids in order, then keeps repeating the last one.
pub fn scripted_ids(ids: &[&str]) -> IdSource {
    let ids: Vec<PublicId> = ids.iter().map(|s| PublicId::parse(s).unwrap()).collect();
    let next = Mutex::new(0usize);
    Arc::new(move || {
        let mut i = next.lock().unwrap();
        let id = ids[(*i).min(ids.len() - 1)].clone();
        *i += 1;
        id
    })
}

/// In-memory ledger that can fail commits with transient conflicts and can
/// hide existing ids from the pre-commit uniqueness probe.
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    pub conflicts_left: AtomicU32,
    pub hide_existing_ids: bool,
    pub inserts: AtomicU32,
}

impl FlakyLedger {
    pub fn conflicting(times: u32) -> Self {
        FlakyLedger {
            inner: InMemoryLedger::new(),
            conflicts_left: AtomicU32::new(times),
            hide_existing_ids: false,
            inserts: AtomicU32::new(0),
        }
    }

    pub fn blind_to_ids() -> Self {
        FlakyLedger { hide_existing_ids: true, ..Self::conflicting(0) }
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn held_seat_ids(&self, travel_date: NaiveDate) -> Result<HashSet<i64>, LedgerError> {
        self.inner.held_seat_ids(travel_date).await
    }

    async fn public_id_exists(&self, public_id: &PublicId) -> Result<bool, LedgerError> {
        if self.hide_existing_ids {
            return Ok(false);
        }
        self.inner.public_id_exists(public_id).await
    }

    async fn insert_reservation(&self, new: NewReservation) -> Result<Reservation, LedgerError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts_left.store(remaining - 1, Ordering::SeqCst);
            return Err(LedgerError::WriteConflict);
        }
        self.inner.insert_reservation(new).await
    }

    async fn find_by_public_id(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError> {
        self.inner.find_by_public_id(public_id).await
    }

    async fn mark_cancelled(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError> {
        self.inner.mark_cancelled(public_id).await
    }
}
