mod common;

use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use sleeper_bus::cache::InMemoryAvailabilityCache;
use sleeper_bus::error::BookingError;
use sleeper_bus::models::{BookingStatus, Deck};
use sleeper_bus::services::public_id;

fn ids_of(seats: &[sleeper_bus::models::Seat]) -> HashSet<i64> {
    seats.iter().map(|s| s.id).collect()
}

#[tokio::test]
async fn single_lower_berth_booking() {
    let engine = engine();
    let details = engine.create(request(vec![1])).await.unwrap();

    assert_eq!(details.status, BookingStatus::Confirmed);
    assert_eq!(details.total_amount, Decimal::new(80000, 2));
    assert!(public_id::matches_format("BK", details.booking_id.as_str()));
    assert_eq!(details.seats.len(), 1);
    assert_eq!(details.seats[0].seat_number, "L1");
    assert_eq!(details.seats[0].deck, Deck::Lower);
    assert_eq!(details.boarding_station.name, "Ahmedabad");
    assert_eq!(details.dropping_station.name, "Mumbai");
}

#[tokio::test]
async fn seat_and_meal_prices_add_up() {
    let engine = engine();
    // L1 800 + U11 700 + Veg Thali 150 for the L1 passenger
    let req = with_meals(request(vec![11, 1]), &[(1, 3)]);
    let details = engine.create(req).await.unwrap();

    assert_eq!(details.total_amount, Decimal::new(165000, 2));
    assert_eq!(details.meals.len(), 1);
    assert_eq!(details.meals[0].meal_name, "Veg Thali");
    assert_eq!(details.meals[0].seat_number, "L1");
}

#[tokio::test]
async fn same_seat_twice_on_one_date_is_refused() {
    let engine = engine();
    engine.create(request(vec![1, 2])).await.unwrap();

    let err = engine.create(request(vec![2, 3])).await.unwrap_err();
    assert!(matches!(err, BookingError::SeatUnavailable(ref seats) if seats == &vec![2]));
}

#[tokio::test]
async fn available_and_held_partition_the_catalog() {
    let engine = engine();
    engine.create(request(vec![1, 2])).await.unwrap();
    engine.create(request(vec![15])).await.unwrap();

    let resolver = engine.resolver();
    let free = ids_of(&resolver.available_seats(travel_day()).await.unwrap());
    let held = resolver.held_seats(travel_day()).await.unwrap();
    let all = ids_of(engine.catalog().list_seats());

    assert!(free.is_disjoint(&held));
    assert_eq!(free.union(&held).copied().collect::<HashSet<_>>(), all);
    assert_eq!(held, HashSet::from([1, 2, 15]));
}

#[tokio::test]
async fn booking_one_date_leaves_other_dates_alone() {
    let engine = engine();
    engine.create(request(vec![1, 2])).await.unwrap();

    let other_day = travel_day().succ_opt().unwrap();
    let free = engine.resolver().available_seats(other_day).await.unwrap();
    assert_eq!(free.len(), engine.catalog().list_seats().len());

    engine.create(request_on(other_day, vec![1, 2])).await.unwrap();
}

#[tokio::test]
async fn cancellation_restores_seats_and_keeps_the_total() {
    let engine = engine();
    let booked = engine.create(with_meals(request(vec![3, 4]), &[(4, 1)])).await.unwrap();

    let cancellation = engine.cancel(booked.booking_id.as_str()).await.unwrap();
    assert_eq!(cancellation.booking_id, booked.booking_id);
    assert_eq!(cancellation.refund_amount, booked.total_amount);

    let free = ids_of(&engine.resolver().available_seats(travel_day()).await.unwrap());
    assert!(free.contains(&3) && free.contains(&4));

    let err = engine.cancel(booked.booking_id.as_str()).await.unwrap_err();
    assert!(matches!(err, BookingError::AlreadyCancelled(_)));

    let stored = engine.get(booked.booking_id.as_str()).await.unwrap();
    assert_eq!(stored.status, BookingStatus::Cancelled);
    assert_eq!(stored.total_amount, booked.total_amount);
    assert_eq!(stored.seats.len(), 2);

    // released seats can be sold again
    engine.create(request(vec![3])).await.unwrap();
}

#[tokio::test]
async fn lookup_ignores_case_and_surrounding_space() {
    let engine = engine();
    let booked = engine.create(request(vec![7])).await.unwrap();

    let raw = format!("  {}  ", booked.booking_id.as_str().to_lowercase());
    let found = engine.get(&raw).await.unwrap();
    assert_eq!(found.booking_id, booked.booking_id);
    assert_eq!(found.passenger, booked.passenger);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let engine = engine();
    assert!(matches!(engine.get("BKZZZZZZ").await, Err(BookingError::NotFound(_))));
    assert!(matches!(engine.get("not an id!").await, Err(BookingError::NotFound(_))));
    assert!(matches!(engine.cancel("BKZZZZZZ").await, Err(BookingError::NotFound(_))));
}

#[tokio::test]
async fn every_backwards_or_empty_route_is_invalid() {
    let engine = engine();
    let stations: Vec<i64> = engine.catalog().list_stations().iter().map(|s| s.id).collect();

    for (i, &boarding) in stations.iter().enumerate() {
        for &dropping in &stations[..=i] {
            let mut req = request(vec![1]);
            req.boarding_station_id = boarding;
            req.dropping_station_id = dropping;
            let err = engine.create(req).await.unwrap_err();
            assert!(
                matches!(err, BookingError::InvalidRoute { .. }),
                "{} -> {} gave {:?}",
                boarding,
                dropping,
                err
            );
        }
    }
}

#[tokio::test]
async fn request_level_errors() {
    let engine = engine();

    assert!(matches!(
        engine.create(request(vec![])).await,
        Err(BookingError::NoSeatSelected)
    ));
    assert!(matches!(
        engine.create(request(vec![1, 42])).await,
        Err(BookingError::UnknownSeat(42))
    ));

    let mut req = request(vec![1]);
    req.dropping_station_id = 77;
    assert!(matches!(engine.create(req).await, Err(BookingError::UnknownStation(77))));

    let mut req = request(vec![1]);
    req.travel_date = "2030-01-31".into();
    assert!(matches!(engine.create(req).await, Err(BookingError::InvalidDate(_))));

    let req = with_meals(request(vec![1]), &[(2, 1)]);
    assert!(matches!(
        engine.create(req).await,
        Err(BookingError::InvalidMealAssociation { meal_id: 1, seat_id: 2 })
    ));

    let req = with_meals(request(vec![1]), &[(1, 99)]);
    assert!(matches!(
        engine.create(req).await,
        Err(BookingError::InvalidMealAssociation { meal_id: 99, seat_id: 1 })
    ));

    // none of the refused requests left anything behind
    assert!(engine.resolver().held_seats(travel_day()).await.unwrap().is_empty());
}

#[tokio::test]
async fn booking_today_is_allowed() {
    let engine = engine();
    engine.create(request_on(today(), vec![1])).await.unwrap();
}

#[tokio::test]
async fn cached_seat_map_never_outlives_a_commit() {
    let cache = InMemoryAvailabilityCache::new(Duration::from_secs(300), clock());
    let engine = engine_with_cache(Arc::new(cache));
    let resolver = engine.resolver();

    // warm the cache twice so the second read is a hit
    assert!(resolver.seat_map(travel_day()).await.unwrap().iter().all(|s| s.is_available));
    assert!(resolver.seat_map(travel_day()).await.unwrap().iter().all(|s| s.is_available));

    let booked = engine.create(request(vec![5])).await.unwrap();
    let map = resolver.seat_map(travel_day()).await.unwrap();
    let seat5 = map.iter().find(|s| s.seat.id == 5).unwrap();
    assert!(!seat5.is_available);

    engine.cancel(booked.booking_id.as_str()).await.unwrap();
    let map = resolver.seat_map(travel_day()).await.unwrap();
    assert!(map.iter().all(|s| s.is_available));
}

#[tokio::test]
async fn id_collisions_draw_fresh_candidates() {
    let engine = engine().with_id_source(scripted_ids(&["BKAAAAAA", "BKAAAAAA", "BKBBBBBB"]));

    let first = engine.create(request(vec![1])).await.unwrap();
    let second = engine.create(request(vec![2])).await.unwrap();

    assert_eq!(first.booking_id.as_str(), "BKAAAAAA");
    assert_eq!(second.booking_id.as_str(), "BKBBBBBB");
}

#[tokio::test]
async fn id_allocation_gives_up_after_bounded_attempts() {
    let engine = engine().with_id_source(scripted_ids(&["BKAAAAAA"]));
    engine.create(request(vec![1])).await.unwrap();

    let err = engine.create(request(vec![2])).await.unwrap_err();
    assert!(matches!(err, BookingError::IdAllocationExhausted(5)));
    assert_eq!(
        engine.resolver().held_seats(travel_day()).await.unwrap(),
        HashSet::from([1])
    );
}

#[tokio::test]
async fn duplicate_id_at_commit_is_retried_with_a_new_id() {
    let ledger = Arc::new(FlakyLedger::blind_to_ids());
    let engine =
        engine_with(ledger.clone()).with_id_source(scripted_ids(&["BKAAAAAA", "BKAAAAAA", "BKCCCCCC"]));

    engine.create(request(vec![1])).await.unwrap();
    let second = engine.create(request(vec![2])).await.unwrap();

    assert_eq!(second.booking_id.as_str(), "BKCCCCCC");
    assert_eq!(ledger.inserts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn transient_conflicts_are_retried() {
    let ledger = Arc::new(FlakyLedger::conflicting(2));
    let engine = engine_with(ledger.clone());

    let details = engine.create(request(vec![9])).await.unwrap();
    assert_eq!(details.status, BookingStatus::Confirmed);
    assert_eq!(ledger.inserts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_conflicts_surface_as_unavailable() {
    let ledger = Arc::new(FlakyLedger::conflicting(10));
    let engine = engine_with(ledger.clone());

    let err = engine.create(request(vec![9, 8])).await.unwrap_err();
    assert!(matches!(err, BookingError::SeatUnavailable(ref seats) if seats == &vec![8, 9]));
    assert_eq!(ledger.inserts.load(Ordering::SeqCst), 3);
    assert!(engine.resolver().held_seats(travel_day()).await.unwrap().is_empty());
}
