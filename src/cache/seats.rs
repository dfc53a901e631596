use async_trait::async_trait;
use chrono::NaiveDate;
use redis::AsyncCommands;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::AvailabilityCache;
use crate::redis_client::RedisClient;

/// Redis-backed seat cache shared by every instance of the service.
///
/// `seats:gen:{date}` holds the generation counter (never expires, one small
/// key per travel date). `seats:booked:{date}:{gen}` holds the JSON list of held
/// seat ids with a TTL. Redis failures degrade to a cache miss.
#[derive(Clone)]
pub struct RedisAvailabilityCache {
    redis: RedisClient,
    ttl_seconds: u64,
}

impl RedisAvailabilityCache {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }

    fn generation_key(date: NaiveDate) -> String {
        format!("seats:gen:{}", date)
    }

    fn held_key(date: NaiveDate, generation: u64) -> String {
        format!("seats:booked:{}:{}", date, generation)
    }

    async fn read_generation(&self, date: NaiveDate) -> Result<u64, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let generation: Option<u64> = conn.get(Self::generation_key(date)).await?;
        Ok(generation.unwrap_or(0))
    }

    async fn read_held(
        &self,
        date: NaiveDate,
        generation: u64,
    ) -> Result<Option<HashSet<i64>>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let data: Option<String> = conn.get(Self::held_key(date, generation)).await?;
        let Some(data) = data else {
            return Ok(None);
        };
        let seats: Vec<i64> = serde_json::from_str(&data).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Parse error"))
        })?;
        Ok(Some(seats.into_iter().collect()))
    }

    async fn write_held(
        &self,
        date: NaiveDate,
        generation: u64,
        held: &HashSet<i64>,
    ) -> Result<(), redis::RedisError> {
        let mut seats: Vec<i64> = held.iter().copied().collect();
        seats.sort_unstable();
        let data = serde_json::to_string(&seats).map_err(|_| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "Serialize error"))
        })?;
        let mut conn = self.redis.conn.clone();
        conn.set_ex(Self::held_key(date, generation), data, self.ttl_seconds).await
    }

    async fn bump_generation(&self, date: NaiveDate) -> Result<u64, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.incr(Self::generation_key(date), 1u64).await
    }
}

#[async_trait]
impl AvailabilityCache for RedisAvailabilityCache {
    async fn generation(&self, date: NaiveDate) -> Option<u64> {
        match self.read_generation(date).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!("seat cache generation read failed for {}: {:?}", date, e);
                None
            }
        }
    }

    async fn get_held(&self, date: NaiveDate, generation: u64) -> Option<HashSet<i64>> {
        match self.read_held(date, generation).await {
            Ok(held) => held,
            Err(e) => {
                warn!("seat cache read failed for {}: {:?}", date, e);
                None
            }
        }
    }

    async fn put_held(&self, date: NaiveDate, generation: u64, held: &HashSet<i64>) {
        if let Err(e) = self.write_held(date, generation, held).await {
            warn!("seat cache write failed for {}: {:?}", date, e);
        }
    }

    async fn invalidate(&self, date: NaiveDate) {
        match self.bump_generation(date).await {
            Ok(generation) => debug!("Invalidated seat cache for {} (generation {})", date, generation),
            // entries still expire by TTL; nothing else can be done from here
            Err(e) => warn!("seat cache invalidation failed for {}: {:?}", date, e),
        }
    }
}
