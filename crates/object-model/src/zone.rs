//! `Zone` config object (spec §3, §4.E): the cluster topology tree.

use std::collections::HashMap;

use crate::config_object::{ConfigObjectBase, HaMode, ObjectName};

pub const MAX_ZONE_DEPTH: u32 = 32;

#[derive(Debug, Clone)]
pub struct Zone {
    pub base: ConfigObjectBase,
    pub parent: Option<String>,
    pub endpoints: Vec<String>,
    pub global: bool,
}

impl Zone {
    pub fn new(name: impl Into<String>, parent: Option<String>, endpoints: Vec<String>) -> Self {
        Zone {
            base: ConfigObjectBase::new(ObjectName::new("Zone", name), HaMode::RunOnAll),
            parent,
            endpoints,
            global: false,
        }
    }

    pub fn new_global(name: impl Into<String>) -> Self {
        Zone {
            base: ConfigObjectBase::new(ObjectName::new("Zone", name), HaMode::RunOnAll),
            parent: None,
            endpoints: Vec::new(),
            global: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.base.object_name.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneTreeError {
    GlobalZoneHasParent,
    UnknownParent,
    TooDeep,
    Cycle,
}

impl std::fmt::Display for ZoneTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneTreeError::GlobalZoneHasParent => write!(f, "global zones may not declare a parent"),
            ZoneTreeError::UnknownParent => write!(f, "parent zone does not exist"),
            ZoneTreeError::TooDeep => write!(f, "zone tree exceeds max depth ({MAX_ZONE_DEPTH})"),
            ZoneTreeError::Cycle => write!(f, "zone tree contains a cycle"),
        }
    }
}
impl std::error::Error for ZoneTreeError {}

/// The validated, in-memory zone tree: parent/child links resolved from
/// `Zone::parent` name strings, with the invariants spec §3/§4.E require
/// (max depth, no cycles, global zones have no parent) checked once at
/// build time rather than on every lookup.
#[derive(Debug, Clone)]
pub struct ZoneTree {
    zones: HashMap<String, Zone>,
    local_zone: String,
}

impl ZoneTree {
    pub fn build(zones: Vec<Zone>, local_zone: impl Into<String>) -> Result<Self, ZoneTreeError> {
        let local_zone = local_zone.into();
        let mut by_name = HashMap::new();
        for z in zones {
            if z.global && z.parent.is_some() {
                return Err(ZoneTreeError::GlobalZoneHasParent);
            }
            by_name.insert(z.name().to_owned(), z);
        }
        let tree = ZoneTree {
            zones: by_name,
            local_zone,
        };
        for name in tree.zones.keys() {
            tree.depth_of(name)?;
        }
        Ok(tree)
    }

    pub fn get(&self, name: &str) -> Option<&Zone> {
        self.zones.get(name)
    }

    pub fn local_zone(&self) -> &str {
        &self.local_zone
    }

    /// Every configured zone, for callers that need to walk the whole
    /// tree (the relay's routing rule finds children by scanning for
    /// `parent == Some(zone)`).
    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Immediate children of `zone` (zones whose `parent` is exactly
    /// `zone`).
    pub fn children_of<'a>(&'a self, zone: &'a str) -> impl Iterator<Item = &'a Zone> {
        self.zones.values().filter(move |z| z.parent.as_deref() == Some(zone))
    }

    /// Ancestors of `zone`, nearest first, not including `zone` itself.
    pub fn ancestors_of(&self, zone: &str) -> Vec<&Zone> {
        let mut out = Vec::new();
        let mut current = self.zones.get(zone).and_then(|z| z.parent.clone());
        while let Some(name) = current {
            match self.zones.get(&name) {
                Some(z) => {
                    current = z.parent.clone();
                    out.push(z);
                }
                None => break,
            }
        }
        out
    }

    /// Distance from `name` up to its root, validating against cycles and
    /// `MAX_ZONE_DEPTH` along the way.
    pub fn depth_of(&self, name: &str) -> Result<u32, ZoneTreeError> {
        let mut seen = std::collections::HashSet::new();
        let mut current = name;
        let mut depth = 0;
        loop {
            if !seen.insert(current.to_owned()) {
                return Err(ZoneTreeError::Cycle);
            }
            if depth > MAX_ZONE_DEPTH {
                return Err(ZoneTreeError::TooDeep);
            }
            let zone = self.zones.get(current).ok_or(ZoneTreeError::UnknownParent)?;
            match &zone.parent {
                Some(parent) => {
                    current = parent;
                    depth += 1;
                }
                None => return Ok(depth),
            }
        }
    }

    /// True if `candidate` is `zone` itself or one of its ancestors — the
    /// chain of zones entitled to see objects homed in `zone` (spec §4.E
    /// `CanAccessObject`).
    pub fn is_ancestor_or_self(&self, candidate: &str, zone: &str) -> bool {
        let mut current = zone.to_owned();
        loop {
            if current == candidate {
                return true;
            }
            match self.zones.get(&current).and_then(|z| z.parent.clone()) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// spec §4.E: a zone may see an object homed in `object_zone` if the
    /// object's zone is the requester's own zone, an ancestor of it, a
    /// descendant of it, or either zone is global.
    pub fn can_access_object(&self, requester_zone: &str, object_zone: &str) -> bool {
        if requester_zone == object_zone {
            return true;
        }
        if self.zones.get(requester_zone).is_some_and(|z| z.global)
            || self.zones.get(object_zone).is_some_and(|z| z.global)
        {
            return true;
        }
        self.is_ancestor_or_self(object_zone, requester_zone) || self.is_ancestor_or_self(requester_zone, object_zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Zone> {
        vec![
            Zone::new("master", None, vec!["master1".to_owned()]),
            Zone::new("satellite", Some("master".to_owned()), vec!["sat1".to_owned()]),
            Zone::new("agent", Some("satellite".to_owned()), vec!["agent1".to_owned()]),
            Zone::new_global("global-templates"),
        ]
    }

    #[test]
    fn depth_is_measured_from_root() {
        let tree = ZoneTree::build(sample(), "master").unwrap();
        assert_eq!(tree.depth_of("master").unwrap(), 0);
        assert_eq!(tree.depth_of("satellite").unwrap(), 1);
        assert_eq!(tree.depth_of("agent").unwrap(), 2);
    }

    #[test]
    fn global_zone_with_parent_is_rejected() {
        let mut zones = sample();
        zones.push(Zone::new(
            "bad-global",
            Some("master".to_owned()),
            vec![],
        ));
        zones.last_mut().unwrap().global = true;
        let err = ZoneTree::build(zones, "master").unwrap_err();
        assert_eq!(err, ZoneTreeError::GlobalZoneHasParent);
    }

    #[test]
    fn cycle_is_detected() {
        let zones = vec![
            Zone::new("a", Some("b".to_owned()), vec![]),
            Zone::new("b", Some("a".to_owned()), vec![]),
        ];
        let err = ZoneTree::build(zones, "a").unwrap_err();
        assert_eq!(err, ZoneTreeError::Cycle);
    }

    #[test]
    fn descendant_and_ancestor_can_access_each_other() {
        let tree = ZoneTree::build(sample(), "master").unwrap();
        assert!(tree.can_access_object("master", "agent"));
        assert!(tree.can_access_object("agent", "master"));
    }

    #[test]
    fn children_of_returns_only_immediate_children() {
        let tree = ZoneTree::build(sample(), "master").unwrap();
        let children: Vec<_> = tree.children_of("master").map(Zone::name).collect();
        assert_eq!(children, vec!["satellite"]);
        assert!(tree.children_of("satellite").any(|z| z.name() == "agent"));
    }

    #[test]
    fn ancestors_of_walks_to_the_root_nearest_first() {
        let tree = ZoneTree::build(sample(), "master").unwrap();
        let ancestors: Vec<_> = tree.ancestors_of("agent").iter().map(|z| z.name().to_owned()).collect();
        assert_eq!(ancestors, vec!["satellite".to_owned(), "master".to_owned()]);
        assert!(tree.ancestors_of("master").is_empty());
    }

    #[test]
    fn unrelated_zones_cannot_access_unless_global() {
        let mut zones = sample();
        zones.push(Zone::new("other-master", None, vec!["other1".to_owned()]));
        let tree = ZoneTree::build(zones, "master").unwrap();
        assert!(!tree.can_access_object("other-master", "agent"));
        assert!(tree.can_access_object("other-master", "global-templates"));
    }
}
