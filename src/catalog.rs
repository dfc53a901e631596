//! Static route inventory: stations, seats and meals.
//!
//! The catalog is loaded once at startup and shared read-only (`Arc<Catalog>`)
//! with the engine. Nothing mutates it afterwards.

use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

use crate::database::Database;
use crate::models::{Deck, Meal, MealType, Seat, Side, Station, UnknownVariant};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no {0}")]
    Empty(&'static str),

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: i64 },

    #[error("stations {first} and {second} share order_index {order_index}")]
    DuplicateOrder { first: i64, second: i64, order_index: i32 },

    #[error(transparent)]
    BadValue(#[from] UnknownVariant),

    #[error("failed to load catalog: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Catalog {
    stations: Vec<Station>,
    seats: Vec<Seat>,
    meals: Vec<Meal>,
    station_idx: HashMap<i64, usize>,
    seat_idx: HashMap<i64, usize>,
    meal_idx: HashMap<i64, usize>,
}

impl Catalog {
    /// Builds a catalog, rejecting duplicate ids and stations that do not form
    /// a strict order along the route.
    pub fn new(
        mut stations: Vec<Station>,
        seats: Vec<Seat>,
        meals: Vec<Meal>,
    ) -> Result<Self, CatalogError> {
        if stations.len() < 2 {
            return Err(CatalogError::Empty("route (need two stations)"));
        }
        if seats.is_empty() {
            return Err(CatalogError::Empty("seats"));
        }

        stations.sort_by_key(|s| s.order_index);
        for pair in stations.windows(2) {
            if pair[0].order_index == pair[1].order_index {
                return Err(CatalogError::DuplicateOrder {
                    first: pair[0].id,
                    second: pair[1].id,
                    order_index: pair[0].order_index,
                });
            }
        }

        check_unique("station", stations.iter().map(|s| s.id))?;
        check_unique("seat", seats.iter().map(|s| s.id))?;
        check_unique("meal", meals.iter().map(|m| m.id))?;

        Ok(Self::from_parts(stations, seats, meals))
    }

    fn from_parts(stations: Vec<Station>, seats: Vec<Seat>, meals: Vec<Meal>) -> Self {
        let station_idx = stations.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let seat_idx = seats.iter().enumerate().map(|(i, s)| (s.id, i)).collect();
        let meal_idx = meals.iter().enumerate().map(|(i, m)| (m.id, i)).collect();
        Catalog { stations, seats, meals, station_idx, seat_idx, meal_idx }
    }

    /// The Ahmedabad–Mumbai route with 20 berths and six meals. Mirrors the
    /// rows seeded by the initial migration.
    pub fn seeded() -> Self {
        let stations = ["Ahmedabad", "Vadodara", "Surat", "Vapi", "Mumbai"]
            .iter()
            .enumerate()
            .map(|(i, name)| Station {
                id: i as i64 + 1,
                name: name.to_string(),
                order_index: i as i32,
            })
            .collect();

        let mut seats = Vec::with_capacity(20);
        let mut number = 1;
        for deck in [Deck::Lower, Deck::Upper] {
            let (prefix, price) = match deck {
                Deck::Lower => ("L", Decimal::new(80000, 2)),
                Deck::Upper => ("U", Decimal::new(70000, 2)),
            };
            for side in [Side::Left, Side::Right] {
                for _ in 0..5 {
                    seats.push(Seat {
                        id: number,
                        seat_number: format!("{}{}", prefix, number),
                        deck,
                        side,
                        price,
                    });
                    number += 1;
                }
            }
        }

        let meals = [
            ("Poha with Chai", MealType::Breakfast, 8000),
            ("Sandwich with Juice", MealType::Breakfast, 10000),
            ("Veg Thali", MealType::Lunch, 15000),
            ("Paneer Rice Bowl", MealType::Lunch, 12000),
            ("Roti Sabzi", MealType::Dinner, 13000),
            ("Dal Rice", MealType::Dinner, 11000),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (name, meal_type, cents))| Meal {
            id: i as i64 + 1,
            name: name.to_string(),
            meal_type,
            price: Decimal::new(cents, 2),
        })
        .collect();

        Self::from_parts(stations, seats, meals)
    }

    pub async fn load(db: &Database) -> Result<Self, CatalogError> {
        let (stations, seat_rows, meal_rows) = futures::try_join!(
            sqlx::query_as::<_, Station>(
                "SELECT id, name, order_index FROM stations ORDER BY order_index",
            )
            .fetch_all(&db.pool),
            sqlx::query_as::<_, (i64, String, String, String, Decimal)>(
                "SELECT id, seat_number, deck, side, price FROM seats ORDER BY id",
            )
            .fetch_all(&db.pool),
            sqlx::query_as::<_, (i64, String, String, Decimal)>(
                "SELECT id, name, meal_type, price FROM meals ORDER BY id",
            )
            .fetch_all(&db.pool),
        )?;

        let seats = seat_rows
            .into_iter()
            .map(|(id, seat_number, deck, side, price)| -> Result<Seat, CatalogError> {
                Ok(Seat { id, seat_number, deck: deck.parse()?, side: side.parse()?, price })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        let meals = meal_rows
            .into_iter()
            .map(|(id, name, meal_type, price)| -> Result<Meal, CatalogError> {
                Ok(Meal { id, name, meal_type: meal_type.parse()?, price })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        info!(
            "Catalog loaded: {} stations, {} seats, {} meals",
            stations.len(),
            seats.len(),
            meals.len()
        );

        Catalog::new(stations, seats, meals)
    }

    /// Stations in route order.
    pub fn list_stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn list_seats(&self) -> &[Seat] {
        &self.seats
    }

    pub fn list_meals(&self) -> &[Meal] {
        &self.meals
    }

    pub fn station(&self, id: i64) -> Option<&Station> {
        self.station_idx.get(&id).map(|&i| &self.stations[i])
    }

    pub fn seat(&self, id: i64) -> Option<&Seat> {
        self.seat_idx.get(&id).map(|&i| &self.seats[i])
    }

    pub fn meal(&self, id: i64) -> Option<&Meal> {
        self.meal_idx.get(&id).map(|&i| &self.meals[i])
    }
}

fn check_unique(kind: &'static str, ids: impl Iterator<Item = i64>) -> Result<(), CatalogError> {
    let mut seen = std::collections::HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateId { kind, id });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_route_matches_migration() {
        let catalog = Catalog::seeded();
        assert_eq!(catalog.list_stations().len(), 5);
        assert_eq!(catalog.list_seats().len(), 20);
        assert_eq!(catalog.list_meals().len(), 6);

        let l1 = catalog.seat(1).unwrap();
        assert_eq!(l1.seat_number, "L1");
        assert_eq!(l1.deck, Deck::Lower);
        assert_eq!(l1.price, Decimal::new(80000, 2));

        let u20 = catalog.seat(20).unwrap();
        assert_eq!(u20.seat_number, "U20");
        assert_eq!(u20.side, Side::Right);
        assert_eq!(u20.price, Decimal::new(70000, 2));

        assert_eq!(catalog.station(1).unwrap().name, "Ahmedabad");
        assert_eq!(catalog.station(5).unwrap().name, "Mumbai");
    }

    #[test]
    fn stations_are_sorted_by_route_order() {
        let stations = vec![
            Station { id: 9, name: "End".into(), order_index: 7 },
            Station { id: 4, name: "Start".into(), order_index: 2 },
        ];
        let seat = Catalog::seeded().list_seats()[0].clone();
        let catalog = Catalog::new(stations, vec![seat], vec![]).unwrap();
        let names: Vec<_> = catalog.list_stations().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Start", "End"]);
    }

    #[test]
    fn rejects_ambiguous_route_order() {
        let stations = vec![
            Station { id: 1, name: "A".into(), order_index: 0 },
            Station { id: 2, name: "B".into(), order_index: 0 },
        ];
        let seats = Catalog::seeded().list_seats().to_vec();
        let err = Catalog::new(stations, seats, vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateOrder { order_index: 0, .. }));
    }

    #[test]
    fn rejects_duplicate_seat_ids() {
        let base = Catalog::seeded();
        let mut seats = base.list_seats().to_vec();
        seats.push(seats[0].clone());
        let err = Catalog::new(base.list_stations().to_vec(), seats, vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId { kind: "seat", id: 1 }));
    }
}
