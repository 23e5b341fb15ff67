//! `Comment`: an auxiliary record attached to a Checkable (spec §3).

use std::sync::atomic::{AtomicI64, Ordering};

use uuid::Uuid;

static NEXT_LEGACY_ID: AtomicI64 = AtomicI64::new(1);

/// Process-lifetime-unique integer ID, matching the original's
/// `i2-legacy-id` scheme used by status.dat-style consumers.
pub fn next_legacy_id() -> i64 {
    NEXT_LEGACY_ID.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub legacy_id: i64,
    pub name: Uuid,
    pub author: String,
    pub text: String,
    pub entry_time: i64,
    /// Wall-clock expiry; `None` means it never expires on its own.
    pub expire_time: Option<i64>,
}

impl Comment {
    pub fn new(author: impl Into<String>, text: impl Into<String>, entry_time: i64, expire_time: Option<i64>) -> Self {
        Comment {
            legacy_id: next_legacy_id(),
            name: Uuid::new_v4(),
            author: author.into(),
            text: text.into(),
            entry_time,
            expire_time,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expire_time.is_some_and(|t| now >= t)
    }
}
