//! Summary statistics over a registry snapshot.
//!
//! [`aggregate`] is a pure function: it never touches the registry and is
//! recomputed from a fresh [`ClientRegistry::snapshot`] every time it is
//! needed.
//!
//! [`ClientRegistry::snapshot`]: crate::server::registry::ClientRegistry::snapshot

use crate::server::registry::ClientSession;
use nanabush_core::types::UNKNOWN_BUCKET;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Derived view of the active sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryMetrics {
    pub total_clients: usize,
    pub clients_by_namespace: BTreeMap<String, usize>,
    pub clients_by_version: BTreeMap<String, usize>,
    /// `None` when there are no sessions.
    pub oldest_heartbeat: Option<SystemTime>,
    /// `None` when there are no sessions.
    pub newest_heartbeat: Option<SystemTime>,
}

/// Groups sessions by namespace and version and finds the heartbeat range.
///
/// Empty namespaces and versions are counted under `"unknown"`.
pub fn aggregate(sessions: &[ClientSession]) -> RegistryMetrics {
    let mut metrics = RegistryMetrics {
        total_clients: sessions.len(),
        ..Default::default()
    };

    for session in sessions {
        *metrics
            .clients_by_namespace
            .entry(bucket(&session.namespace))
            .or_default() += 1;
        *metrics
            .clients_by_version
            .entry(bucket(&session.version))
            .or_default() += 1;

        let seen = session.last_heartbeat;
        metrics.oldest_heartbeat = Some(metrics.oldest_heartbeat.map_or(seen, |t| t.min(seen)));
        metrics.newest_heartbeat = Some(metrics.newest_heartbeat.map_or(seen, |t| t.max(seen)));
    }

    metrics
}

fn bucket(value: &str) -> String {
    if value.is_empty() {
        UNKNOWN_BUCKET.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use std::collections::HashMap;
    use std::time::UNIX_EPOCH;

    fn session(id: &str, namespace: &str, version: &str, heartbeat_secs: u64) -> ClientSession {
        let at = UNIX_EPOCH + Duration::from_secs(heartbeat_secs);
        ClientSession {
            id: id.to_string(),
            name: format!("{id}-name"),
            version: version.to_string(),
            namespace: namespace.to_string(),
            metadata: HashMap::new(),
            registered_at: at,
            last_heartbeat: at,
        }
    }

    #[test]
    fn empty_snapshot_has_no_groups_or_timestamps() {
        let metrics = aggregate(&[]);
        assert_eq!(metrics.total_clients, 0);
        assert!(metrics.clients_by_namespace.is_empty());
        assert!(metrics.clients_by_version.is_empty());
        assert_eq!(metrics.oldest_heartbeat, None);
        assert_eq!(metrics.newest_heartbeat, None);
    }

    #[test]
    fn groups_by_namespace_and_version() {
        let sessions = [
            session("1", "a", "1.0", 100),
            session("2", "a", "2.0", 300),
            session("3", "b", "1.0", 200),
        ];
        let metrics = aggregate(&sessions);

        assert_eq!(metrics.total_clients, 3);
        assert_eq!(
            metrics.clients_by_namespace,
            BTreeMap::from([("a".to_string(), 2), ("b".to_string(), 1)])
        );
        assert_eq!(
            metrics.clients_by_version,
            BTreeMap::from([("1.0".to_string(), 2), ("2.0".to_string(), 1)])
        );
        assert_eq!(
            metrics.oldest_heartbeat,
            Some(UNIX_EPOCH + Duration::from_secs(100))
        );
        assert_eq!(
            metrics.newest_heartbeat,
            Some(UNIX_EPOCH + Duration::from_secs(300))
        );
    }

    #[test]
    fn empty_labels_fall_into_unknown() {
        let sessions = [session("1", "", "", 1), session("2", "", "3.1", 1)];
        let metrics = aggregate(&sessions);
        assert_eq!(metrics.clients_by_namespace.get(UNKNOWN_BUCKET), Some(&2));
        assert_eq!(metrics.clients_by_version.get(UNKNOWN_BUCKET), Some(&1));
        assert_eq!(metrics.clients_by_version.get("3.1"), Some(&1));
    }
}
