//! `ConfigObject`: the common supertype of every managed entity (spec §3).
//!
//! The original C++ codebase has two overlapping object bases
//! (`ConfigObject` and `DynamicObject`); only `ConfigObject` is ported here
//! (see `DESIGN.md`). Rather than a deep virtual hierarchy, each concrete
//! type (`Host`, `Service`, `Endpoint`, `Zone`, …) embeds a
//! [`ConfigObjectBase`] by composition and is addressed through the
//! tagged-union [`ObjectRef`] where code needs to operate on "any
//! ConfigObject" generically (the authority election and the relay's
//! routing code both do).

use std::collections::HashMap;

use crate::attr::{now, Attr};

/// A globally unique `type!name` identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName {
    pub object_type: String,
    pub name: String,
}

impl ObjectName {
    pub fn new(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        ObjectName {
            object_type: object_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.object_type, self.name)
    }
}

/// High-availability mode: does this object run on every endpoint in its
/// zone, or on exactly one elected owner?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaMode {
    RunOnAll,
    RunOnOnce,
}

/// Fields shared by every `ConfigObject`. Concrete types embed this and
/// typically `Deref`/expose accessors rather than re-declaring the fields.
#[derive(Debug, Clone)]
pub struct ConfigObjectBase {
    pub object_name: ObjectName,
    /// `None` means "the local zone" (spec §3).
    pub home_zone: Option<String>,
    pub ha_mode: HaMode,
    pub active: bool,
    /// Set by the authority election (§F) for `RunOnOnce` objects; always
    /// `true` for `RunOnAll` objects since there's nothing to elect.
    pub authority: bool,
    /// Freeform attributes beyond the strongly-typed fields each concrete
    /// type declares, each with its own change timestamp for
    /// last-writer-wins merge.
    pub extra_attributes: HashMap<String, Attr<String>>,
}

impl ConfigObjectBase {
    pub fn new(object_name: ObjectName, ha_mode: HaMode) -> Self {
        ConfigObjectBase {
            object_name,
            home_zone: None,
            ha_mode,
            active: false,
            authority: matches!(ha_mode, HaMode::RunOnAll),
            extra_attributes: HashMap::new(),
        }
    }

    /// `paused == !authority`, the invariant spec §8 quantifies over every
    /// object.
    pub fn paused(&self) -> bool {
        !self.authority
    }

    pub fn activate(&mut self) {
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn set_extra_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra_attributes
            .insert(key.into(), Attr::new(value.into()));
    }

    /// Apply a remote mutation to an extra attribute with last-writer-wins
    /// semantics, creating the entry if absent.
    pub fn merge_extra_attribute(&mut self, key: &str, value: impl Into<String>, at: f64) {
        match self.extra_attributes.get_mut(key) {
            Some(existing) => {
                existing.merge(value.into(), at);
            }
            None => {
                self.extra_attributes
                    .insert(key.to_owned(), Attr::new_at(value.into(), at));
            }
        }
    }
}

/// A change-timestamped boolean, the shape most `ConfigObject` setters
/// that flip a flag stamp (e.g. `force_next_check`).
pub fn stamp_now() -> f64 {
    now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_on_all_objects_always_have_authority_and_are_never_paused() {
        let base = ConfigObjectBase::new(ObjectName::new("Host", "h1"), HaMode::RunOnAll);
        assert!(base.authority);
        assert!(!base.paused());
    }

    #[test]
    fn run_on_once_objects_start_without_authority_until_elected() {
        let base = ConfigObjectBase::new(ObjectName::new("Zone", "z1"), HaMode::RunOnOnce);
        assert!(!base.authority);
        assert!(base.paused());
    }

    #[test]
    fn merge_extra_attribute_respects_last_writer_wins() {
        let mut base = ConfigObjectBase::new(ObjectName::new("Host", "h1"), HaMode::RunOnAll);
        base.merge_extra_attribute("notes", "first", 10.0);
        base.merge_extra_attribute("notes", "stale", 5.0);
        assert_eq!(
            base.extra_attributes.get("notes").unwrap().get(),
            "first"
        );
        base.merge_extra_attribute("notes", "second", 20.0);
        assert_eq!(
            base.extra_attributes.get("notes").unwrap().get(),
            "second"
        );
    }

    #[test]
    fn object_name_displays_as_type_bang_name() {
        let name = ObjectName::new("Service", "ping");
        assert_eq!(name.to_string(), "Service!ping");
    }
}
