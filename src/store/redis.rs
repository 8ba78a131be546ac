use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::time::Duration;

use super::{OtpStore, SessionStore, SharedCounter, StoreError};
use crate::models::{CustomerSession, OtpRecord};

// ============================================================================
// Redis Store
// ============================================================================
//
// Atomic counters (round-robin cursors) and short-lived customer state:
// sessions, pending OTPs, resend cooldowns and per-phone request windows.
//
// ============================================================================

pub async fn connect(url: &str) -> Result<MultiplexedConnection, StoreError> {
    let client = ::redis::Client::open(url)?;
    Ok(client.get_multiplexed_async_connection().await?)
}

fn session_key(token: &str) -> String {
    format!("customer_session:{}", token)
}

fn otp_key(phone: &str) -> String {
    format!("otp:{}", phone)
}

fn cooldown_key(phone: &str) -> String {
    format!("otp_cooldown:{}", phone)
}

fn rate_key(phone: &str) -> String {
    format!("otp_rate:{}", phone)
}

/// Redis expiries are whole seconds and must be positive.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// Remaining lifetime from a `TTL` reply; `None` when the key has no expiry
/// left (-2 missing, -1 persistent, 0 about to expire).
fn remaining_from_ttl(ttl: i64) -> Option<Duration> {
    (ttl > 0).then(|| Duration::from_secs(ttl as u64))
}

/// Opens the rate window with its expiry on the first request (NX keeps it
/// anchored there) and counts the request, as one MULTI/EXEC transaction.
fn rate_window_pipeline(phone: &str, window: Duration) -> ::redis::Pipeline {
    let key = rate_key(phone);
    let mut pipe = ::redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(&key)
        .arg(0)
        .arg("NX")
        .arg("EX")
        .arg(expiry_secs(window))
        .ignore()
        .incr(&key, 1)
        .ignore();
    pipe
}

/// `INCR`-backed shared counter. Production wires it behind a
/// [`GuardedCounter`](super::GuardedCounter).
#[derive(Clone)]
pub struct RedisCounter {
    conn: MultiplexedConnection,
}

impl RedisCounter {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SharedCounter for RedisCounter {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }
}

#[derive(Clone)]
pub struct RedisSessionStore {
    conn: MultiplexedConnection,
}

impl RedisSessionStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get_session(&self, token: &str) -> Result<Option<CustomerSession>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(token)).await?;
        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    async fn put_session(
        &self,
        token: &str,
        session: &CustomerSession,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(session)?;
        let _: () = conn.set_ex(session_key(token), json, expiry_secs(ttl)).await?;
        Ok(())
    }

    async fn invalidate_session(&self, token: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(session_key(token)).await?;
        Ok(())
    }
}

#[async_trait]
impl OtpStore for RedisSessionStore {
    async fn get_otp(&self, phone: &str) -> Result<Option<(OtpRecord, Duration)>, StoreError> {
        let mut conn = self.conn.clone();
        let key = otp_key(phone);
        let (raw, ttl): (Option<String>, i64) = ::redis::pipe()
            .get(&key)
            .ttl(&key)
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: OtpRecord = serde_json::from_str(&raw)?;
        Ok(remaining_from_ttl(ttl).map(|left| (record, left)))
    }

    async fn put_otp(&self, phone: &str, record: &OtpRecord, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let _: () = conn.set_ex(otp_key(phone), json, expiry_secs(ttl)).await?;
        Ok(())
    }

    async fn delete_otp(&self, phone: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(otp_key(phone)).await?;
        Ok(())
    }

    async fn cooldown_remaining(&self, phone: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(cooldown_key(phone)).await?;
        Ok(remaining_from_ttl(ttl))
    }

    async fn start_cooldown(&self, phone: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl.is_zero() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(cooldown_key(phone), "1", expiry_secs(ttl)).await?;
        Ok(())
    }

    async fn otp_request_count(&self, phone: &str) -> Result<u32, StoreError> {
        let mut conn = self.conn.clone();
        let count: Option<u32> = conn.get(rate_key(phone)).await?;
        Ok(count.unwrap_or(0))
    }

    async fn record_otp_request(&self, phone: &str, window: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = rate_window_pipeline(phone, window).query_async(&mut conn).await?;
        Ok(())
    }
}
