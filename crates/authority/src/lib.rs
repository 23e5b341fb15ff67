//! Authority election for `HARunOnce` objects (spec §4.F), ported
//! directly from `apilistener-authority.cpp`: the object's owner is
//! whichever currently-connected endpoint in its zone sorts to the slot
//! `Utility::SDBM(object_name) % connected.len()`. A fresh node holds off
//! deciding for 30s after startup so it doesn't briefly believe it's
//! alone in the zone before the mesh finishes connecting.

use std::time::Duration;

use object_model::{ObjectRef, Registry, ZoneTree};

pub const RECOMPUTE_INTERVAL: Duration = Duration::from_secs(30);
pub const COLD_START_GUARD_SECS: f64 = 30.0;

/// Same string hash as `cluster_rpc::sdbm_hash` — both are ports of
/// `Utility::SDBM`, kept as separate copies since the crates don't
/// otherwise share a dependency.
pub fn sdbm_hash(s: &str) -> u64 {
    let mut hash: u64 = 0;
    for byte in s.bytes() {
        hash = (byte as u64).wrapping_add(hash << 6).wrapping_add(hash << 16).wrapping_sub(hash);
    }
    hash
}

/// `None` means "cold-start guard: leave authority as it was".
pub fn elect(object_name: &str, connected_endpoints: &[String], local_endpoint: &str, zone_total_endpoints: usize, uptime_secs: f64) -> Option<bool> {
    if zone_total_endpoints > 1 && connected_endpoints.len() <= 1 && uptime_secs < COLD_START_GUARD_SECS {
        return None;
    }
    if connected_endpoints.is_empty() {
        return Some(false);
    }
    let mut sorted = connected_endpoints.to_vec();
    sorted.sort();
    let idx = (sdbm_hash(object_name) % sorted.len() as u64) as usize;
    Some(sorted[idx] == local_endpoint)
}

/// Recomputes authority for every active `RunOnOnce` object in `registry`,
/// using `zones` to find each object's home zone membership and
/// `is_connected` to ask which endpoints in that zone are currently live.
pub fn recompute_all(registry: &mut Registry, zones: &ZoneTree, local_endpoint: &str, uptime_secs: f64, is_connected: impl Fn(&str) -> bool) {
    let names: Vec<_> = registry
        .run_on_once_active()
        .map(|o| o.object_name().clone())
        .collect();

    for name in names {
        let Some(object) = registry.get(&name) else { continue };
        let home_zone = object.base().home_zone.clone().unwrap_or_else(|| zones.local_zone().to_owned());
        let Some(zone) = zones.get(&home_zone) else { continue };

        let total = zone.endpoints.len();
        let connected: Vec<String> = zone
            .endpoints
            .iter()
            .filter(|e| is_connected(e) || e.as_str() == local_endpoint)
            .cloned()
            .collect();

        let decision = elect(&name.to_string(), &connected, local_endpoint, total, uptime_secs);
        if let Some(authority) = decision {
            if let Some(object) = registry.get_mut(&name) {
                if object.base().authority != authority {
                    tracing::info!(object = %name, authority, "authority changed");
                }
                object.base_mut().authority = authority;
            }
        }
    }
}
