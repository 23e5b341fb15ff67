//! `Downtime`: scheduled suppression window attached to a Checkable.

use uuid::Uuid;

use crate::comment::next_legacy_id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downtime {
    pub legacy_id: i64,
    pub name: Uuid,
    pub author: String,
    pub text: String,
    pub entry_time: i64,
    pub start_time: i64,
    pub end_time: i64,
    /// Fixed downtimes are active for exactly [start, end]; flexible
    /// downtimes activate on trigger and last `duration` seconds.
    pub fixed: bool,
    pub duration: i64,
    pub triggered_by: Option<Uuid>,
    pub triggered_at: Option<i64>,
}

impl Downtime {
    pub fn new_fixed(
        author: impl Into<String>,
        text: impl Into<String>,
        entry_time: i64,
        start_time: i64,
        end_time: i64,
    ) -> Self {
        Downtime {
            legacy_id: next_legacy_id(),
            name: Uuid::new_v4(),
            author: author.into(),
            text: text.into(),
            entry_time,
            start_time,
            end_time,
            fixed: true,
            duration: end_time - start_time,
            triggered_by: None,
            triggered_at: None,
        }
    }

    pub fn new_flexible(
        author: impl Into<String>,
        text: impl Into<String>,
        entry_time: i64,
        start_time: i64,
        end_time: i64,
        duration: i64,
    ) -> Self {
        Downtime {
            legacy_id: next_legacy_id(),
            name: Uuid::new_v4(),
            author: author.into(),
            text: text.into(),
            entry_time,
            start_time,
            end_time,
            fixed: false,
            duration,
            triggered_by: None,
            triggered_at: None,
        }
    }

    pub fn trigger(&mut self, at: i64, triggered_by: Option<Uuid>) {
        self.triggered_at = Some(at);
        self.triggered_by = triggered_by;
    }

    /// True while the downtime suppresses notifications, per spec §3/§4.J
    /// ("Acknowledgement and downtime suppress problem notifications but
    /// do not alter state transitions").
    pub fn is_in_effect(&self, now: i64) -> bool {
        if now < self.start_time || now > self.end_time {
            return false;
        }
        if self.fixed {
            return true;
        }
        match self.triggered_at {
            Some(t) => now < t + self.duration,
            None => false,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_downtime_is_in_effect_for_its_whole_window() {
        let dt = Downtime::new_fixed("op", "maint", 0, 100, 200);
        assert!(!dt.is_in_effect(99));
        assert!(dt.is_in_effect(100));
        assert!(dt.is_in_effect(200));
        assert!(!dt.is_in_effect(201));
    }

    #[test]
    fn flexible_downtime_requires_trigger_before_taking_effect() {
        let mut dt = Downtime::new_flexible("op", "maint", 0, 100, 300, 50);
        assert!(!dt.is_in_effect(150), "not triggered yet");
        dt.trigger(150, None);
        assert!(dt.is_in_effect(150));
        assert!(dt.is_in_effect(199));
        assert!(!dt.is_in_effect(200), "duration elapsed since trigger");
    }
}
