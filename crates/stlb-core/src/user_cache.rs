//! Bounded, time-expiring cache of user directory entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    domain::UserId,
    errors::Error,
    ports::DirectoryPort,
    Result,
};

/// Cached directory entry. Never mutated after creation: a stale entry is
/// discarded and replaced, not updated in place.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    pub timezone: Tz,
    pub is_bot: bool,
    pub inserted_at: Instant,
}

struct CacheEntry {
    record: UserRecord,
    last_access: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<UserId, CacheEntry>,
    tick: u64,
}

/// The only long-lived shared resource in the core: one instance serves every
/// concurrent fan-out for the life of the process.
///
/// Two independent bounds apply: entry count (LRU eviction) and entry age
/// (expiry checked on every access; an expired entry is exactly a miss). A
/// miss releases the lock for the duration of the external lookup and
/// re-inserts under the lock, so two racing lookups for one user resolve
/// last-write-wins with fresh data — duplicate lookups are possible,
/// duplicate stale entries are not.
pub struct UserCache {
    directory: Arc<dyn DirectoryPort>,
    capacity: usize,
    ttl: Duration,
    inner: Mutex<CacheState>,
}

impl UserCache {
    pub fn new(directory: Arc<dyn DirectoryPort>, capacity: usize, ttl: Duration) -> Self {
        Self {
            directory,
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(CacheState::default()),
        }
    }

    pub async fn get(&self, id: &UserId) -> Result<UserRecord> {
        {
            let mut st = self.inner.lock().await;
            st.tick += 1;
            let tick = st.tick;
            if let Some(entry) = st.entries.get_mut(id) {
                if entry.record.inserted_at.elapsed() < self.ttl {
                    entry.last_access = tick;
                    return Ok(entry.record.clone());
                }
                st.entries.remove(id);
            }
        }

        let profile = self.directory.lookup_user(id).await?;
        let timezone = profile.timezone.parse::<Tz>().map_err(|_| {
            Error::UserLookupFailed {
                user: id.0.clone(),
                reason: format!("directory returned unknown timezone {:?}", profile.timezone),
            }
        })?;
        let record = UserRecord {
            id: id.clone(),
            display_name: profile.display_name,
            timezone,
            is_bot: profile.is_bot,
            inserted_at: Instant::now(),
        };

        let mut st = self.inner.lock().await;
        st.tick += 1;
        let tick = st.tick;
        st.entries.insert(
            id.clone(),
            CacheEntry {
                record: record.clone(),
                last_access: tick,
            },
        );
        while st.entries.len() > self.capacity {
            let lru = st
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match lru {
                Some(k) => {
                    st.entries.remove(&k);
                }
                None => break,
            }
        }
        Ok(record)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}
