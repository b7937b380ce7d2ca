use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

const LOCK_KEY: &str = "scheduler_lock";

/// Key/value settings rows. All pipeline knobs live here so they can be
/// changed at runtime without a restart.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    pub async fn get(pool: &PgPool, key: &str) -> Result<Option<String>, AppError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = $1")
                .bind(key)
                .fetch_optional(pool)
                .await?;
        Ok(row.and_then(|(v,)| v))
    }

    pub async fn set(pool: &PgPool, key: &str, value: Option<&str>) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get_row(pool: &PgPool, key: &str) -> Result<Option<Setting>, AppError> {
        let row = sqlx::query_as::<_, Setting>("SELECT * FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await?;
        Ok(row)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Setting>, AppError> {
        let settings = sqlx::query_as::<_, Setting>("SELECT * FROM settings ORDER BY key")
            .fetch_all(pool)
            .await?;
        Ok(settings)
    }

    pub async fn get_bool(pool: &PgPool, key: &str, default: bool) -> Result<bool, AppError> {
        Ok(Self::get(pool, key)
            .await?
            .map(|v| matches!(v.trim(), "true" | "1" | "yes" | "on"))
            .unwrap_or(default))
    }

    pub async fn get_i64(pool: &PgPool, key: &str, default: i64) -> Result<i64, AppError> {
        Ok(Self::get(pool, key)
            .await?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default))
    }

    /// Comma-separated list value; empty/missing yields an empty vec.
    pub async fn get_csv(pool: &PgPool, key: &str) -> Result<Vec<String>, AppError> {
        Ok(Self::get(pool, key)
            .await?
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// The cross-process scheduler lock, stored as JSON in a single settings
/// row. Acquisition is optimistic: compare-and-swap against the previous
/// stored value, so concurrent acquirers lose gracefully instead of
/// blocking. Expiry bounds how long a crashed owner can stall runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerLock {
    pub owner_id: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// What `acquire` should do given the stored lock row, if any. A row
/// whose value is NULL is a released lock and must take the CAS path;
/// treating it like a missing row would make the insert conflict with
/// the existing row and fail every acquisition from then on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquirePath {
    /// An unexpired owner holds the lock.
    Held,
    /// Row exists but is released, expired or garbled; CAS against it.
    Swap,
    /// No row yet; insert one.
    Insert,
}

fn acquire_path(row_value: Option<&Option<String>>, now: DateTime<Utc>) -> AcquirePath {
    match row_value {
        None => AcquirePath::Insert,
        Some(value) => {
            if let Some(raw) = value
                && let Ok(held) = serde_json::from_str::<SchedulerLock>(raw)
                && !held.is_expired(now)
            {
                AcquirePath::Held
            } else {
                AcquirePath::Swap
            }
        }
    }
}

impl SchedulerLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Try to take the lock. Returns `None` when another unexpired owner
    /// holds it, or when the CAS loses a race.
    pub async fn acquire(
        pool: &PgPool,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<Option<SchedulerLock>, AppError> {
        let previous = Setting::get_row(pool, LOCK_KEY).await?;

        let path = acquire_path(previous.as_ref().map(|row| &row.value), Utc::now());
        if path == AcquirePath::Held {
            return Ok(None);
        }

        let lock = SchedulerLock {
            owner_id: owner_id.to_string(),
            token: Uuid::new_v4(),
            expires_at: Utc::now() + ttl,
        };
        let serialized = serde_json::to_string(&lock)
            .map_err(|e| AppError::Internal(format!("Failed to serialize lock: {e}")))?;

        // CAS against the exact stored value (NULL included); a
        // concurrent acquirer that got there first changes the row and
        // this update matches nothing.
        let swapped = match path {
            AcquirePath::Swap => sqlx::query(
                "UPDATE settings SET value = $1, updated_at = NOW() WHERE key = $2 AND value IS NOT DISTINCT FROM $3",
            )
            .bind(&serialized)
            .bind(LOCK_KEY)
            .bind(previous.and_then(|row| row.value))
            .execute(pool)
            .await?
            .rows_affected(),
            _ => sqlx::query(
                "INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
            )
            .bind(LOCK_KEY)
            .bind(&serialized)
            .execute(pool)
            .await?
            .rows_affected(),
        };

        Ok((swapped == 1).then_some(lock))
    }

    /// Release only if we still hold it; a lock stolen after expiry must
    /// not be clobbered by the old owner.
    pub async fn release(&self, pool: &PgPool) -> Result<(), AppError> {
        let serialized = serde_json::to_string(self)
            .map_err(|e| AppError::Internal(format!("Failed to serialize lock: {e}")))?;
        sqlx::query(
            "UPDATE settings SET value = NULL, updated_at = NOW() WHERE key = $1 AND value = $2",
        )
        .bind(LOCK_KEY)
        .bind(&serialized)
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_inclusive_of_now() {
        let now = Utc::now();
        let live = SchedulerLock {
            owner_id: "a".into(),
            token: Uuid::new_v4(),
            expires_at: now + chrono::Duration::seconds(30),
        };
        assert!(!live.is_expired(now));

        let stale = SchedulerLock {
            owner_id: "a".into(),
            token: Uuid::new_v4(),
            expires_at: now,
        };
        assert!(stale.is_expired(now));
    }

    #[test]
    fn lock_round_trips_through_json() {
        let lock = SchedulerLock {
            owner_id: "worker-1".into(),
            token: Uuid::new_v4(),
            expires_at: Utc::now(),
        };
        let json = serde_json::to_string(&lock).unwrap();
        let back: SchedulerLock = serde_json::from_str(&json).unwrap();
        assert_eq!(lock, back);
    }

    fn serialized(expires_at: DateTime<Utc>) -> String {
        serde_json::to_string(&SchedulerLock {
            owner_id: "worker-1".into(),
            token: Uuid::new_v4(),
            expires_at,
        })
        .unwrap()
    }

    #[test]
    fn missing_row_inserts() {
        assert_eq!(acquire_path(None, Utc::now()), AcquirePath::Insert);
    }

    #[test]
    fn released_row_swaps_instead_of_inserting() {
        // A release nulls the value but leaves the row; the next owner
        // must CAS against it, not insert and lose to the conflict.
        assert_eq!(
            acquire_path(Some(&None), Utc::now()),
            AcquirePath::Swap
        );
    }

    #[test]
    fn live_lock_is_held() {
        let now = Utc::now();
        let raw = serialized(now + chrono::Duration::minutes(5));
        assert_eq!(acquire_path(Some(&Some(raw)), now), AcquirePath::Held);
    }

    #[test]
    fn expired_or_garbled_lock_is_swappable() {
        let now = Utc::now();
        let stale = serialized(now - chrono::Duration::minutes(5));
        assert_eq!(acquire_path(Some(&Some(stale)), now), AcquirePath::Swap);
        assert_eq!(
            acquire_path(Some(&Some("not json".into())), now),
            AcquirePath::Swap
        );
    }
}
