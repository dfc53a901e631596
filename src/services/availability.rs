use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::cache::AvailabilityCache;
use crate::catalog::Catalog;
use crate::clock::Clock;
use crate::error::BookingError;
use crate::ledger::Ledger;
use crate::models::Seat;

/// Parses an ISO `YYYY-MM-DD` travel date and refuses days before `today`.
pub fn parse_travel_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, BookingError> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| BookingError::InvalidDate(format!("'{}' is not a YYYY-MM-DD date", raw)))?;
    ensure_not_past(date, today)?;
    Ok(date)
}

pub fn ensure_not_past(date: NaiveDate, today: NaiveDate) -> Result<(), BookingError> {
    if date < today {
        return Err(BookingError::InvalidDate(format!("{} is in the past", date)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatAvailability {
    #[serde(flatten)]
    pub seat: Seat,
    pub is_available: bool,
}

/// Derives free seats for a date from the ledger. Nothing here is stored.
#[derive(Clone)]
pub struct AvailabilityResolver {
    catalog: Arc<Catalog>,
    ledger: Arc<dyn Ledger>,
    cache: Arc<dyn AvailabilityCache>,
    clock: Arc<dyn Clock>,
}

impl AvailabilityResolver {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<dyn Ledger>,
        cache: Arc<dyn AvailabilityCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { catalog, ledger, cache, clock }
    }

    /// Seats held on `date`, read straight from the ledger.
    pub async fn held_seats(&self, date: NaiveDate) -> Result<HashSet<i64>, BookingError> {
        Ok(self.ledger.held_seat_ids(date).await?)
    }

    /// Same as [`held_seats`](Self::held_seats) but may be answered from the cache.
    async fn held_seats_cached(&self, date: NaiveDate) -> Result<HashSet<i64>, BookingError> {
        let Some(generation) = self.cache.generation(date).await else {
            return self.held_seats(date).await;
        };

        if let Some(held) = self.cache.get_held(date, generation).await {
            debug!("seat cache hit for {} (generation {})", date, generation);
            return Ok(held);
        }

        let held = self.held_seats(date).await?;
        self.cache.put_held(date, generation, &held).await;
        Ok(held)
    }

    pub async fn available_seats(&self, date: NaiveDate) -> Result<Vec<Seat>, BookingError> {
        ensure_not_past(date, self.clock.today())?;
        let held = self.held_seats_cached(date).await?;

        Ok(self
            .catalog
            .list_seats()
            .iter()
            .filter(|seat| !held.contains(&seat.id))
            .cloned()
            .collect())
    }

    /// Every catalog seat with its availability flag, in catalog order.
    pub async fn seat_map(&self, date: NaiveDate) -> Result<Vec<SeatAvailability>, BookingError> {
        ensure_not_past(date, self.clock.today())?;
        let held = self.held_seats_cached(date).await?;

        Ok(self
            .catalog
            .list_seats()
            .iter()
            .map(|seat| SeatAvailability {
                seat: seat.clone(),
                is_available: !held.contains(&seat.id),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopCache;
    use crate::clock::FixedClock;
    use crate::ledger::InMemoryLedger;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 10).unwrap()
    }

    #[test]
    fn dates_before_today_are_invalid() {
        assert!(parse_travel_date("2030-06-10", today()).is_ok());
        assert!(parse_travel_date("2030-06-11", today()).is_ok());
        assert!(matches!(
            parse_travel_date("2030-06-09", today()),
            Err(BookingError::InvalidDate(_))
        ));
    }

    #[test]
    fn malformed_dates_are_invalid() {
        for raw in ["", "10/06/2030", "2030-13-01", "tomorrow"] {
            assert!(matches!(
                parse_travel_date(raw, today()),
                Err(BookingError::InvalidDate(_))
            ));
        }
    }

    #[tokio::test]
    async fn empty_ledger_leaves_every_seat_free() {
        let catalog = Arc::new(Catalog::seeded());
        let resolver = AvailabilityResolver::new(
            catalog.clone(),
            Arc::new(InMemoryLedger::new()),
            Arc::new(NoopCache),
            Arc::new(FixedClock::on(today())),
        );

        let free = resolver.available_seats(today()).await.unwrap();
        assert_eq!(free.len(), catalog.list_seats().len());

        let map = resolver.seat_map(today()).await.unwrap();
        assert!(map.iter().all(|s| s.is_available));

        let yesterday = today().pred_opt().unwrap();
        assert!(resolver.available_seats(yesterday).await.is_err());
    }
}
