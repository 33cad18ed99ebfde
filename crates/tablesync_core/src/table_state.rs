//! Persisted per-table synchronization state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tablesync_codec::timestamp;

/// The three advisory locks kept per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    /// Guards pulls.
    Read,
    /// Guards pushes of created/updated records.
    Write,
    /// Guards pushes of deletions.
    Delete,
}

impl LockKind {
    /// Returns the lock name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Read => "read",
            LockKind::Write => "write",
            LockKind::Delete => "delete",
        }
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronization state of one table.
///
/// A lock is a timestamp: it is held while it is younger than the lease
/// TTL and expires on its own afterwards. The UNIX epoch means unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTableState {
    /// Table name (unique key).
    pub table_name: String,
    /// Watermark of the last applied pull. `None` forces a full resync.
    pub last_server_sync: Option<DateTime<Utc>>,
    /// Read lock timestamp.
    pub read_lock: DateTime<Utc>,
    /// Write lock timestamp.
    pub write_lock: DateTime<Utc>,
    /// Delete lock timestamp.
    pub delete_lock: DateTime<Utc>,
    /// Schema version the watermark belongs to.
    pub schema_version: u32,
}

impl SyncTableState {
    /// Creates the initial state: never synced, all locks free.
    pub fn new(table_name: impl Into<String>, schema_version: u32) -> Self {
        Self {
            table_name: table_name.into(),
            last_server_sync: Some(timestamp::epoch()),
            read_lock: timestamp::epoch(),
            write_lock: timestamp::epoch(),
            delete_lock: timestamp::epoch(),
            schema_version,
        }
    }

    /// Returns the timestamp of a lock.
    pub fn lock(&self, kind: LockKind) -> DateTime<Utc> {
        match kind {
            LockKind::Read => self.read_lock,
            LockKind::Write => self.write_lock,
            LockKind::Delete => self.delete_lock,
        }
    }

    /// Sets the timestamp of a lock.
    pub fn set_lock(&mut self, kind: LockKind, at: DateTime<Utc>) {
        match kind {
            LockKind::Read => self.read_lock = at,
            LockKind::Write => self.write_lock = at,
            LockKind::Delete => self.delete_lock = at,
        }
    }

    /// Frees a lock.
    pub fn unlock(&mut self, kind: LockKind) {
        self.set_lock(kind, timestamp::epoch());
    }

    /// Returns true if the lock is younger than `ttl` at `now`.
    ///
    /// A lock stamped in the future (clock skew) counts as held.
    pub fn is_locked(&self, kind: LockKind, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.lock(kind)).to_std() {
            Ok(age) => age < ttl,
            Err(_) => true,
        }
    }

    /// Returns true if the watermark is younger than `freshness` at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, freshness: Duration) -> bool {
        match self.last_server_sync {
            Some(mark) => (now - mark).to_std().is_ok_and(|age| age < freshness),
            None => false,
        }
    }

    /// Returns the `since` value for the next read request.
    pub fn since(&self) -> String {
        self.last_server_sync
            .as_ref()
            .map(timestamp::format)
            .unwrap_or_default()
    }

    /// Moves the watermark forward to `to`.
    ///
    /// Returns false and keeps the stored watermark if `to` is older;
    /// only [`reset_watermark`](Self::reset_watermark) moves it back.
    pub fn advance_watermark(&mut self, to: DateTime<Utc>) -> bool {
        match self.last_server_sync {
            Some(mark) if to < mark => false,
            _ => {
                self.last_server_sync = Some(to);
                true
            }
        }
    }

    /// Resets the watermark so the next pull fetches everything.
    pub fn reset_watermark(&mut self) {
        self.last_server_sync = Some(timestamp::epoch());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn new_state_is_unlocked() {
        let state = SyncTableState::new("Book", 1);
        let now = Utc::now();
        assert_eq!(state.last_server_sync, Some(timestamp::epoch()));
        for kind in [LockKind::Read, LockKind::Write, LockKind::Delete] {
            assert!(!state.is_locked(kind, now, TTL));
        }
    }

    #[test]
    fn lock_expires_after_ttl() {
        let mut state = SyncTableState::new("Book", 1);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        state.set_lock(LockKind::Write, now - chrono::Duration::seconds(59));
        assert!(state.is_locked(LockKind::Write, now, TTL));
        assert!(!state.is_locked(LockKind::Read, now, TTL));

        state.set_lock(LockKind::Write, now - chrono::Duration::seconds(61));
        assert!(!state.is_locked(LockKind::Write, now, TTL));
    }

    #[test]
    fn future_lock_is_held() {
        let mut state = SyncTableState::new("Book", 1);
        let now = Utc::now();
        state.set_lock(LockKind::Delete, now + chrono::Duration::seconds(5));
        assert!(state.is_locked(LockKind::Delete, now, TTL));
        state.unlock(LockKind::Delete);
        assert!(!state.is_locked(LockKind::Delete, now, TTL));
    }

    #[test]
    fn freshness() {
        let mut state = SyncTableState::new("Book", 1);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let hour = Duration::from_secs(3600);

        assert!(!state.is_fresh(now, hour));
        state.last_server_sync = Some(now - chrono::Duration::minutes(10));
        assert!(state.is_fresh(now, hour));
        state.last_server_sync = None;
        assert!(!state.is_fresh(now, hour));
    }

    #[test]
    fn watermark_only_moves_forward() {
        let mut state = SyncTableState::new("Book", 1);
        let noon = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        assert!(state.advance_watermark(noon));
        assert!(state.advance_watermark(noon));
        assert!(!state.advance_watermark(noon - chrono::Duration::hours(1)));
        assert_eq!(state.last_server_sync, Some(noon));

        state.reset_watermark();
        assert_eq!(state.last_server_sync, Some(timestamp::epoch()));
        state.last_server_sync = None;
        assert!(state.advance_watermark(noon - chrono::Duration::hours(1)));
    }

    #[test]
    fn since_formats_watermark() {
        let mut state = SyncTableState::new("Book", 1);
        assert_eq!(state.since(), "1970-01-01T00:00:00Z");
        state.last_server_sync = None;
        assert_eq!(state.since(), "");
    }
}
