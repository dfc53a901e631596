use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::debug;

use super::{Ledger, LedgerError, NewReservation};
use crate::database::Database;
use crate::models::{BookingStatus, PassengerInfo, PublicId, Reservation, ReservedMeal};

// Keeps advisory lock keys for travel dates clear of any other lock users.
const DATE_LOCK_NAMESPACE: i64 = 0x5EA7_0000_0000;

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    public_id: String,
    passenger_name: String,
    passenger_phone: String,
    passenger_email: Option<String>,
    travel_date: NaiveDate,
    boarding_station_id: i64,
    dropping_station_id: i64,
    total_amount: Decimal,
    status: String,
    created_at: DateTime<Utc>,
}

const BOOKING_COLUMNS: &str = "id, public_id, passenger_name, passenger_phone, passenger_email, \
     travel_date, boarding_station_id, dropping_station_id, total_amount, status, created_at";

/// Postgres-backed ledger. Creates for the same travel date are serialized by a
/// transaction-scoped advisory lock, so the recheck and the inserts see and
/// produce one consistent state even across several service instances.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    fn date_lock_key(travel_date: NaiveDate) -> i64 {
        DATE_LOCK_NAMESPACE + i64::from(travel_date.num_days_from_ce())
    }

    async fn load_lines(&self, row: BookingRow) -> Result<Reservation, LedgerError> {
        let seat_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT seat_id FROM booking_seats WHERE booking_id = $1 ORDER BY seat_id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        let meals = sqlx::query_as::<_, (i64, i64)>(
            "SELECT meal_id, seat_id FROM booking_meals WHERE booking_id = $1 ORDER BY id",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(meal_id, seat_id)| ReservedMeal { meal_id, seat_id })
        .collect();

        let status: BookingStatus = row
            .status
            .parse()
            .map_err(|e: crate::models::UnknownVariant| LedgerError::Corrupt(e.to_string()))?;

        Ok(Reservation {
            id: row.id,
            public_id: PublicId::from_trusted(row.public_id),
            passenger: PassengerInfo {
                name: row.passenger_name,
                phone: row.passenger_phone,
                email: row.passenger_email,
            },
            travel_date: row.travel_date,
            boarding_station_id: row.boarding_station_id,
            dropping_station_id: row.dropping_station_id,
            status,
            total_amount: row.total_amount,
            created_at: row.created_at,
            seat_ids,
            meals,
        })
    }

    async fn write_reservation(
        tx: &mut Transaction<'_, Postgres>,
        new: &NewReservation,
    ) -> Result<(i64, DateTime<Utc>), LedgerError> {
        let fail = |e: sqlx::Error| classify(e, &new.public_id);

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(Self::date_lock_key(new.travel_date))
            .execute(&mut **tx)
            .await
            .map_err(fail)?;

        let taken: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT bs.seat_id
            FROM booking_seats bs
            JOIN bookings b ON b.id = bs.booking_id
            WHERE b.travel_date = $1
              AND b.status = 'confirmed'
              AND bs.seat_id = ANY($2)
            ORDER BY bs.seat_id
            "#,
        )
        .bind(new.travel_date)
        .bind(&new.seat_ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(fail)?;

        if !taken.is_empty() {
            return Err(LedgerError::SeatsTaken(taken));
        }

        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO bookings (
                public_id, passenger_name, passenger_phone, passenger_email, travel_date,
                boarding_station_id, dropping_station_id, total_amount, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'confirmed', $9)
            RETURNING id, created_at
            "#,
        )
        .bind(new.public_id.as_str())
        .bind(&new.passenger.name)
        .bind(&new.passenger.phone)
        .bind(&new.passenger.email)
        .bind(new.travel_date)
        .bind(new.boarding_station_id)
        .bind(new.dropping_station_id)
        .bind(new.total_amount)
        .bind(new.created_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(fail)?;

        for seat_id in &new.seat_ids {
            sqlx::query("INSERT INTO booking_seats (booking_id, seat_id) VALUES ($1, $2)")
                .bind(id)
                .bind(seat_id)
                .execute(&mut **tx)
                .await
                .map_err(fail)?;
        }

        for meal in &new.meals {
            sqlx::query(
                "INSERT INTO booking_meals (booking_id, meal_id, seat_id) VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(meal.meal_id)
            .bind(meal.seat_id)
            .execute(&mut **tx)
            .await
            .map_err(fail)?;
        }

        Ok((id, created_at))
    }
}

/// Sorts a failed statement into the ledger taxonomy.
fn classify(err: sqlx::Error, public_id: &PublicId) -> LedgerError {
    if let Some(db_err) = err.as_database_error() {
        match db_err.code().as_deref() {
            Some("23505") if db_err.constraint() == Some("bookings_public_id_key") => {
                return LedgerError::DuplicatePublicId(public_id.clone());
            }
            Some("40001") | Some("40P01") => return LedgerError::WriteConflict,
            _ => {}
        }
    }

    LedgerError::Database(err)
}

#[async_trait]
impl Ledger for PgLedger {
    async fn held_seat_ids(&self, travel_date: NaiveDate) -> Result<HashSet<i64>, LedgerError> {
        let seats: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT bs.seat_id
            FROM booking_seats bs
            JOIN bookings b ON b.id = bs.booking_id
            WHERE b.travel_date = $1 AND b.status = 'confirmed'
            "#,
        )
        .bind(travel_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(seats.into_iter().collect())
    }

    async fn public_id_exists(&self, public_id: &PublicId) -> Result<bool, LedgerError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE public_id = $1)",
        )
        .bind(public_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_reservation(&self, new: NewReservation) -> Result<Reservation, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let (id, created_at) = match Self::write_reservation(&mut tx, &new).await {
            Ok(written) => written,
            Err(e) => {
                // release the date lock before reporting
                let _ = tx.rollback().await;
                return Err(e);
            }
        };

        tx.commit()
            .await
            .map_err(|e| classify(e, &new.public_id))?;

        debug!("booking {} committed as row {}", new.public_id, id);

        Ok(Reservation {
            id,
            public_id: new.public_id,
            passenger: new.passenger,
            travel_date: new.travel_date,
            boarding_station_id: new.boarding_station_id,
            dropping_station_id: new.dropping_station_id,
            status: BookingStatus::Confirmed,
            total_amount: new.total_amount,
            created_at,
            seat_ids: new.seat_ids,
            meals: new.meals,
        })
    }

    async fn find_by_public_id(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE public_id = $1",
            BOOKING_COLUMNS
        ))
        .bind(public_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_lines(row).await?)),
            None => Ok(None),
        }
    }

    async fn mark_cancelled(
        &self,
        public_id: &PublicId,
    ) -> Result<Option<Reservation>, LedgerError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "UPDATE bookings SET status = 'cancelled' \
             WHERE public_id = $1 AND status = 'confirmed' \
             RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(public_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.load_lines(row).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_lock_keys_are_distinct_per_day() {
        let a = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let b = a.succ_opt().unwrap();
        assert_ne!(PgLedger::date_lock_key(a), PgLedger::date_lock_key(b));
        assert_eq!(PgLedger::date_lock_key(b) - PgLedger::date_lock_key(a), 1);
    }

    #[test]
    fn non_database_errors_pass_through() {
        let id = PublicId::parse("BKAAAAAA").unwrap();
        let err = classify(sqlx::Error::RowNotFound, &id);
        assert!(matches!(err, LedgerError::Database(sqlx::Error::RowNotFound)));
    }
}
