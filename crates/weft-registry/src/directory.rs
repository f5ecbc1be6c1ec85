//! The endpoint directory — the registry's only state.
//!
//! A mutex-guarded ordered map keyed by server name. Register and lookup
//! linearize at the lock; iteration order (and therefore lookup result
//! order) is deterministic for a given snapshot.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use weft_core::scope::pattern_matches;
use weft_core::Timestamp;

/// One registered provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    pub server_name: String,
    pub address: String,
    pub capabilities: Vec<String>,
    pub registered_at: Timestamp,
}

/// Directory of provider endpoints, optionally expiring stale records.
pub struct EndpointDirectory {
    records: Mutex<BTreeMap<String, EndpointRecord>>,
    max_age: Option<Duration>,
}

impl EndpointDirectory {
    pub fn new(max_age: Option<Duration>) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            max_age,
        }
    }

    /// Insert or overwrite a record. Re-registering the same name is
    /// idempotent and refreshes `registered_at`.
    pub fn register(&self, record: EndpointRecord) {
        let mut records = self.records.lock().expect("directory lock poisoned");
        records.insert(record.server_name.clone(), record);
    }

    /// Remove a record. Returns whether it existed.
    pub fn deregister(&self, server_name: &str) -> bool {
        let mut records = self.records.lock().expect("directory lock poisoned");
        records.remove(server_name).is_some()
    }

    pub fn get(&self, server_name: &str) -> Option<EndpointRecord> {
        let mut records = self.records.lock().expect("directory lock poisoned");
        self.prune_expired(&mut records);
        records.get(server_name).cloned()
    }

    /// All records declaring a capability that matches at least one filter
    /// entry under the wildcard rule, in name order.
    pub fn lookup(&self, capability_filter: &[String]) -> Vec<EndpointRecord> {
        let mut records = self.records.lock().expect("directory lock poisoned");
        self.prune_expired(&mut records);
        records
            .values()
            .filter(|record| {
                record
                    .capabilities
                    .iter()
                    .any(|cap| capability_filter.iter().any(|f| pattern_matches(cap, f)))
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("directory lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune_expired(&self, records: &mut BTreeMap<String, EndpointRecord>) {
        if let Some(max_age) = self.max_age {
            let now = Timestamp::now().seconds_since_epoch;
            records.retain(|_, record| {
                now.saturating_sub(record.registered_at.seconds_since_epoch) <= max_age.as_secs()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(name: &str, capabilities: Vec<&str>) -> EndpointRecord {
        EndpointRecord {
            server_name: name.to_string(),
            address: "localhost:50051".to_string(),
            capabilities: capabilities.into_iter().map(String::from).collect(),
            registered_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_register_and_get() {
        let directory = EndpointDirectory::new(None);
        directory.register(make_record("InventoryDB_Primary", vec!["db:inventory:read"]));
        let record = directory.get("InventoryDB_Primary").unwrap();
        assert_eq!(record.address, "localhost:50051");
    }

    #[test]
    fn test_register_is_idempotent_overwrite() {
        let directory = EndpointDirectory::new(None);
        directory.register(make_record("A", vec!["db:inventory:read"]));
        let mut updated = make_record("A", vec!["db:inventory:read", "telemetry:read"]);
        updated.address = "localhost:60000".into();
        directory.register(updated);

        assert_eq!(directory.len(), 1);
        let record = directory.get("A").unwrap();
        assert_eq!(record.address, "localhost:60000");
        assert_eq!(record.capabilities.len(), 2);
    }

    #[test]
    fn test_deregister() {
        let directory = EndpointDirectory::new(None);
        directory.register(make_record("A", vec!["db:inventory:read"]));
        assert!(directory.deregister("A"));
        assert!(!directory.deregister("A"));
        assert!(directory.is_empty());
    }

    #[test]
    fn test_lookup_exact_capability() {
        let directory = EndpointDirectory::new(None);
        directory.register(make_record("A", vec!["db:inventory:read"]));
        directory.register(make_record("B", vec!["db:orders:read"]));

        let matches = directory.lookup(&["db:inventory:read".to_string()]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].server_name, "A");
    }

    #[test]
    fn test_lookup_wildcard_declared_capability() {
        let directory = EndpointDirectory::new(None);
        directory.register(make_record("A", vec!["db:inventory:*"]));

        let matches = directory.lookup(&["db:inventory:read".to_string()]);
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_lookup_no_match() {
        let directory = EndpointDirectory::new(None);
        directory.register(make_record("A", vec!["db:inventory:read"]));
        assert!(directory.lookup(&["telemetry:read".to_string()]).is_empty());
        assert!(directory.lookup(&[]).is_empty());
    }

    #[test]
    fn test_lookup_order_is_name_sorted() {
        let directory = EndpointDirectory::new(None);
        directory.register(make_record("Zeta", vec!["db:inventory:read"]));
        directory.register(make_record("Alpha", vec!["db:inventory:read"]));

        let matches = directory.lookup(&["db:inventory:read".to_string()]);
        assert_eq!(matches[0].server_name, "Alpha");
        assert_eq!(matches[1].server_name, "Zeta");
    }

    #[test]
    fn test_expired_records_are_pruned() {
        let directory = EndpointDirectory::new(Some(Duration::from_secs(60)));
        let mut stale = make_record("Old", vec!["db:inventory:read"]);
        stale.registered_at =
            Timestamp::from_seconds(Timestamp::now().seconds_since_epoch - 3_600);
        directory.register(stale);
        directory.register(make_record("Fresh", vec!["db:inventory:read"]));

        let matches = directory.lookup(&["db:inventory:read".to_string()]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].server_name, "Fresh");
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_no_expiry_when_unconfigured() {
        let directory = EndpointDirectory::new(None);
        let mut old = make_record("Old", vec!["db:inventory:read"]);
        old.registered_at = Timestamp::from_seconds(1);
        directory.register(old);
        assert_eq!(directory.lookup(&["db:inventory:read".to_string()]).len(), 1);
    }

    #[test]
    fn test_concurrent_register_lookup() {
        use std::sync::Arc;
        let directory = Arc::new(EndpointDirectory::new(None));
        let mut handles = Vec::new();
        for t in 0..4 {
            let directory = Arc::clone(&directory);
            handles.push(std::thread::spawn(move || {
                for i in 0..25 {
                    directory.register(EndpointRecord {
                        server_name: format!("server-{}-{}", t, i),
                        address: "localhost:1".into(),
                        capabilities: vec!["db:inventory:read".into()],
                        registered_at: Timestamp::now(),
                    });
                    let _ = directory.lookup(&["db:inventory:read".to_string()]);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(directory.len(), 100);
    }
}
