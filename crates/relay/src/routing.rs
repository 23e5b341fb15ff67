//! The relay's routing rule (spec §4.E/§4.H): which endpoints a message
//! addressed at zone `Z` should reach from this node.
//!
//! `spec.md` states the rule as "`Z.endpoints ∪ ⋃{c.endpoints : c.parent
//! == Z ∧ c is immediate child of LocalZone or Z}`, subject to the rule
//! that the upward path is only taken from the local zone to its
//! parent, and the downward path is only taken one level" and then, in
//! §4.H step 4, separately asks to "walk up the ancestors of Z so that
//! parents receive relevant events". Read literally the two don't fully
//! compose (4.E's own-zone-plus-one-hop description vs. 4.H's full
//! ancestor walk); this module implements the union of both readings —
//! same zone, the local zone's parent and children, the target zone's
//! children, and the target zone's full ancestor chain — since that is
//! the only interpretation under which every event eventually reaches
//! every zone entitled to `CanAccessObject` it (ancestors, descendants,
//! globals) while still keeping each single hop's fan-out bounded to
//! "neighbours" as the prose intends. See `DESIGN.md` for this decision.

use std::collections::BTreeSet;

use object_model::ZoneTree;

/// Endpoints that should receive an event targeting `target_zone`, from
/// the perspective of `zones.local_zone()`. Always excludes
/// `local_endpoint` itself — a node never relays to itself.
pub fn destination_endpoints(zones: &ZoneTree, target_zone: &str, local_endpoint: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();

    if let Some(zone) = zones.get(target_zone) {
        out.extend(zone.endpoints.iter().cloned());
    }

    for child in zones.children_of(target_zone) {
        out.extend(child.endpoints.iter().cloned());
    }

    // Global zones are reachable regardless of tree position (spec
    // §4.E CanAccessObject already treats "either zone is global" as a
    // standing grant).
    for zone in zones.iter() {
        if zone.global {
            out.extend(zone.endpoints.iter().cloned());
        }
    }

    let local = zones.local_zone();
    if let Some(local_zone) = zones.get(local) {
        if let Some(parent_name) = &local_zone.parent {
            if let Some(parent) = zones.get(parent_name) {
                out.extend(parent.endpoints.iter().cloned());
            }
        }
    }
    for child in zones.children_of(local) {
        out.extend(child.endpoints.iter().cloned());
    }

    for ancestor in zones.ancestors_of(target_zone) {
        out.extend(ancestor.endpoints.iter().cloned());
    }

    out.remove(local_endpoint);
    out
}

/// The zone an endpoint is a member of, if any — used to apply loop
/// prevention at the zone granularity spec §4.H describes ("refuses to
/// re-relay an event back into a zone it came from").
pub fn endpoint_zone<'a>(zones: &'a ZoneTree, endpoint: &str) -> Option<&'a str> {
    zones.iter().find(|z| z.endpoints.iter().any(|e| e == endpoint)).map(|z| z.name())
}

/// Drop destinations that belong to `origin_zone` — the loop-prevention
/// rule. A `None` origin (locally produced event) excludes nothing.
pub fn without_origin_zone(zones: &ZoneTree, destinations: BTreeSet<String>, origin_zone: Option<&str>) -> BTreeSet<String> {
    let Some(origin_zone) = origin_zone else { return destinations };
    destinations.into_iter().filter(|ep| endpoint_zone(zones, ep) != Some(origin_zone)).collect()
}
