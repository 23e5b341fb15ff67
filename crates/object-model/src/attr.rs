//! `Attr<T>`: a typed attribute value paired with the wall-clock time it
//! last changed. Used throughout `ConfigObject` so last-writer-wins merge
//! (spec §1 Non-goals: "strong consistency... last-writer-wins on
//! timestamps") has a timestamp to compare without reflection.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as fractional seconds since the epoch.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// A value with a change timestamp. `set` always stamps the current time;
/// `set_at` lets callers apply a remote mutation with its original
/// timestamp for last-writer-wins comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr<T> {
    value: T,
    changed_at: f64,
}

impl<T> Attr<T> {
    pub fn new(value: T) -> Self {
        Attr {
            value,
            changed_at: now(),
        }
    }

    pub fn new_at(value: T, changed_at: f64) -> Self {
        Attr { value, changed_at }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn changed_at(&self) -> f64 {
        self.changed_at
    }

    /// Overwrite unconditionally, stamping `now()`.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.changed_at = now();
    }

    /// Apply a remote mutation using last-writer-wins: only applies if
    /// `at` is not older than the current timestamp. Returns whether the
    /// value was applied.
    pub fn merge(&mut self, value: T, at: f64) -> bool {
        if at < self.changed_at {
            return false;
        }
        self.value = value;
        self.changed_at = at;
        true
    }
}

impl<T: Default> Default for Attr<T> {
    fn default() -> Self {
        Attr::new(T::default())
    }
}
