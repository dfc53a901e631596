//! Booking transaction engine.
//!
//! `create` validates a request against the catalog, prices it, allocates a
//! public id and commits through the ledger. Creates for one travel date are
//! queued behind a per-date lock in this process; the ledger repeats the seat
//! check inside its own atomic unit, which is what actually keeps two confirmed
//! reservations off one seat when several processes share a database.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use validator::Validate;

use super::availability::{parse_travel_date, AvailabilityResolver};
use super::fare::{self, FareBreakdown};
use super::prediction::{self, BookingFeatures};
use super::public_id;
use crate::cache::{AvailabilityCache, NoopCache};
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::config::{validate_id_prefix, BookingConfig, ConfigError};
use crate::error::BookingError;
use crate::ledger::{Ledger, LedgerError, NewReservation};
use crate::models::{
    MealDetail, MealSelection, PassengerInfo, PublicId, Reservation, ReservationDetails,
    ReservedMeal, SeatDetail,
};

/// Produces candidate public ids. Swapped out in tests to force collisions.
pub type IdSource = Arc<dyn Fn() -> PublicId + Send + Sync>;

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub id_prefix: String,
    pub id_attempts: u32,
    pub commit_attempts: u32,
    pub retry_backoff: Duration,
}

impl TryFrom<&BookingConfig> for BookingPolicy {
    type Error = ConfigError;

    fn try_from(config: &BookingConfig) -> Result<Self, Self::Error> {
        Ok(BookingPolicy {
            id_prefix: validate_id_prefix(&config.id_prefix)?,
            id_attempts: config.id_attempts.max(1),
            commit_attempts: config.commit_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }
}

impl Default for BookingPolicy {
    fn default() -> Self {
        BookingPolicy {
            id_prefix: "BK".to_string(),
            id_attempts: 5,
            commit_attempts: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

/// Body of a create request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateReservation {
    pub travel_date: String,
    pub boarding_station_id: i64,
    pub dropping_station_id: i64,
    pub seat_ids: Vec<i64>,
    #[serde(default)]
    pub meals: Vec<MealSelection>,
    #[serde(flatten)]
    pub passenger: PassengerInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cancellation {
    pub booking_id: PublicId,
    pub refund_amount: Decimal,
}

/// A request that passed every check that does not depend on ledger state.
struct ValidatedRequest {
    travel_date: NaiveDate,
    boarding_station_id: i64,
    dropping_station_id: i64,
    seat_ids: Vec<i64>,
    meals: Vec<ReservedMeal>,
    passenger: PassengerInfo,
    fare: FareBreakdown,
}

#[derive(Default)]
struct DateLocks {
    inner: std::sync::Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
}

impl DateLocks {
    fn for_date(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // drop guards nobody is waiting on
        locks.retain(|d, lock| *d == date || Arc::strong_count(lock) > 1);
        locks.entry(date).or_default().clone()
    }
}

pub struct BookingEngine {
    catalog: Arc<Catalog>,
    ledger: Arc<dyn Ledger>,
    cache: Arc<dyn AvailabilityCache>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
    id_source: IdSource,
    locks: DateLocks,
}

impl BookingEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        let prefix = policy.id_prefix.clone();
        let id_source: IdSource =
            Arc::new(move || public_id::generate(&prefix, &mut rand::thread_rng()));

        BookingEngine {
            catalog,
            ledger,
            cache: Arc::new(NoopCache),
            clock,
            policy,
            id_source,
            locks: DateLocks::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn AvailabilityCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolver(&self) -> AvailabilityResolver {
        AvailabilityResolver::new(
            self.catalog.clone(),
            self.ledger.clone(),
            self.cache.clone(),
            self.clock.clone(),
        )
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn create(&self, req: CreateReservation) -> Result<ReservationDetails, BookingError> {
        let valid = self.validate(&req)?;
        let travel_date = valid.travel_date;

        let lock = self.locks.for_date(travel_date);
        let _guard = lock.lock().await;

        // fresh read; the cache is never trusted for this
        let held = self.resolver().held_seats(travel_date).await?;
        let taken = conflicting_seats(&valid.seat_ids, &held);
        if !taken.is_empty() {
            info!("Seats {:?} already booked for {}", taken, travel_date);
            return Err(BookingError::SeatUnavailable(taken));
        }

        let reservation = self.commit(valid).await?;
        self.cache.invalidate(travel_date).await;

        info!(
            "Booking {} confirmed: {} seat(s) on {}, total {}",
            reservation.public_id,
            reservation.seat_ids.len(),
            travel_date,
            reservation.total_amount
        );

        self.describe(&reservation)
    }

    pub async fn get(&self, raw_id: &str) -> Result<ReservationDetails, BookingError> {
        let public_id = parse_public_id(raw_id)?;
        let reservation = self
            .ledger
            .find_by_public_id(&public_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(public_id.to_string()))?;
        self.describe(&reservation)
    }

    pub async fn cancel(&self, raw_id: &str) -> Result<Cancellation, BookingError> {
        let public_id = parse_public_id(raw_id)?;
        let existing = self
            .ledger
            .find_by_public_id(&public_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(public_id.to_string()))?;

        if !existing.is_confirmed() {
            return Err(BookingError::AlreadyCancelled(public_id.to_string()));
        }

        // a concurrent cancel may have won since the lookup
        let cancelled = self
            .ledger
            .mark_cancelled(&public_id)
            .await?
            .ok_or_else(|| BookingError::AlreadyCancelled(public_id.to_string()))?;

        self.cache.invalidate(cancelled.travel_date).await;
        info!(
            "Booking {} cancelled, {} seat(s) released on {}",
            cancelled.public_id,
            cancelled.seat_ids.len(),
            cancelled.travel_date
        );

        Ok(Cancellation {
            booking_id: cancelled.public_id,
            refund_amount: cancelled.total_amount,
        })
    }

    pub fn features(
        &self,
        travel_date: &str,
        seat_ids: &[i64],
        meals: &[MealSelection],
    ) -> Result<BookingFeatures, BookingError> {
        let today = self.clock.today();
        let travel_date = parse_travel_date(travel_date, today)?;
        prediction::extract(&self.catalog, travel_date, today, seat_ids, meals)
    }

    /// Resolves a stored reservation against the catalog.
    pub fn describe(&self, reservation: &Reservation) -> Result<ReservationDetails, BookingError> {
        let station = |id: i64| {
            self.catalog.station(id).cloned().ok_or_else(|| {
                LedgerError::Corrupt(format!("booking {} references station {}", reservation.public_id, id))
            })
        };
        let seat = |id: i64| {
            self.catalog.seat(id).ok_or_else(|| {
                LedgerError::Corrupt(format!("booking {} references seat {}", reservation.public_id, id))
            })
        };

        let seats = reservation
            .seat_ids
            .iter()
            .map(|&id| {
                seat(id).map(|s| SeatDetail {
                    seat_id: s.id,
                    seat_number: s.seat_number.clone(),
                    deck: s.deck,
                    price: s.price,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let meals = reservation
            .meals
            .iter()
            .map(|line| -> Result<MealDetail, LedgerError> {
                let s = seat(line.seat_id)?;
                let meal = self.catalog.meal(line.meal_id).ok_or_else(|| {
                    LedgerError::Corrupt(format!(
                        "booking {} references meal {}",
                        reservation.public_id, line.meal_id
                    ))
                })?;
                Ok(MealDetail {
                    meal_id: meal.id,
                    meal_name: meal.name.clone(),
                    meal_type: meal.meal_type,
                    seat_id: s.id,
                    seat_number: s.seat_number.clone(),
                    price: meal.price,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ReservationDetails {
            id: reservation.id,
            booking_id: reservation.public_id.clone(),
            passenger: reservation.passenger.clone(),
            travel_date: reservation.travel_date,
            boarding_station: station(reservation.boarding_station_id)?,
            dropping_station: station(reservation.dropping_station_id)?,
            seats,
            meals,
            total_amount: reservation.total_amount,
            status: reservation.status,
            created_at: reservation.created_at,
        })
    }

    /// Runs every check that only needs the catalog and the clock, in the
    /// order callers see errors.
    fn validate(&self, req: &CreateReservation) -> Result<ValidatedRequest, BookingError> {
        let travel_date = parse_travel_date(&req.travel_date, self.clock.today())?;

        let boarding = self
            .catalog
            .station(req.boarding_station_id)
            .ok_or(BookingError::UnknownStation(req.boarding_station_id))?;
        let dropping = self
            .catalog
            .station(req.dropping_station_id)
            .ok_or(BookingError::UnknownStation(req.dropping_station_id))?;
        if !boarding.precedes(dropping) {
            return Err(BookingError::InvalidRoute {
                boarding: boarding.id,
                dropping: dropping.id,
            });
        }

        if req.seat_ids.is_empty() {
            return Err(BookingError::NoSeatSelected);
        }
        let mut seat_prices = Vec::with_capacity(req.seat_ids.len());
        let mut seat_ids = BTreeSet::new();
        for &seat_id in &req.seat_ids {
            let seat = self.catalog.seat(seat_id).ok_or(BookingError::UnknownSeat(seat_id))?;
            if seat_ids.insert(seat_id) {
                seat_prices.push(seat.price);
            }
        }

        let mut meal_prices = Vec::with_capacity(req.meals.len());
        for selection in &req.meals {
            let meal = self
                .catalog
                .meal(selection.meal_id)
                .filter(|_| seat_ids.contains(&selection.seat_id))
                .ok_or(BookingError::InvalidMealAssociation {
                    meal_id: selection.meal_id,
                    seat_id: selection.seat_id,
                })?;
            meal_prices.push(meal.price);
        }

        let passenger = req.passenger.normalized();
        passenger
            .validate()
            .map_err(|e| BookingError::InvalidPassenger(e.to_string()))?;

        Ok(ValidatedRequest {
            travel_date,
            boarding_station_id: boarding.id,
            dropping_station_id: dropping.id,
            seat_ids: seat_ids.into_iter().collect(),
            meals: req.meals.iter().copied().map(ReservedMeal::from).collect(),
            passenger,
            fare: fare::compute(seat_prices, meal_prices),
        })
    }

    /// Picks an unused public id, spending at most the configured attempts in total.
    async fn allocate_id(&self, spent: &mut u32) -> Result<PublicId, BookingError> {
        while *spent < self.policy.id_attempts {
            *spent += 1;
            let candidate = (self.id_source)();
            if !self.ledger.public_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!("Booking id {} already taken, drawing another", candidate);
        }

        error!("No free booking id after {} attempts", self.policy.id_attempts);
        Err(BookingError::IdAllocationExhausted(self.policy.id_attempts))
    }

    async fn commit(&self, valid: ValidatedRequest) -> Result<Reservation, BookingError> {
        let mut ids_spent = 0;
        let mut conflicts = 0;

        loop {
            let public_id = self.allocate_id(&mut ids_spent).await?;
            let new = NewReservation {
                public_id,
                passenger: valid.passenger.clone(),
                travel_date: valid.travel_date,
                boarding_station_id: valid.boarding_station_id,
                dropping_station_id: valid.dropping_station_id,
                total_amount: valid.fare.total_amount,
                seat_ids: valid.seat_ids.clone(),
                meals: valid.meals.clone(),
                created_at: self.clock.now(),
            };

            let taken = match self.ledger.insert_reservation(new).await {
                Ok(reservation) => return Ok(reservation),
                Err(LedgerError::DuplicatePublicId(id)) => {
                    warn!("Booking id {} was claimed during commit, retrying", id);
                    continue;
                }
                Err(LedgerError::SeatsTaken(taken)) => taken,
                Err(LedgerError::WriteConflict) => valid.seat_ids.clone(),
                Err(e) => {
                    error!("Failed to commit booking for {}: {}", valid.travel_date, e);
                    return Err(e.into());
                }
            };

            conflicts += 1;
            if conflicts >= self.policy.commit_attempts {
                info!("Giving up on seats {:?} for {} after {} attempts", taken, valid.travel_date, conflicts);
                return Err(BookingError::SeatUnavailable(taken));
            }
            warn!(
                "Commit conflict on {} (attempt {}/{}), retrying",
                valid.travel_date, conflicts, self.policy.commit_attempts
            );
            tokio::time::sleep(self.policy.retry_backoff * conflicts).await;
        }
    }
}

fn parse_public_id(raw: &str) -> Result<PublicId, BookingError> {
    PublicId::parse(raw).ok_or_else(|| BookingError::NotFound(raw.trim().to_string()))
}

/// Seats from `wanted` that appear in `held`, in ascending order.
pub fn conflicting_seats(wanted: &[i64], held: &HashSet<i64>) -> Vec<i64> {
    let mut taken: Vec<i64> = wanted.iter().copied().filter(|s| held.contains(s)).collect();
    taken.sort_unstable();
    taken.dedup();
    taken
}
