//! Request metadata — auxiliary key/value headers carried with a call.

use std::collections::HashMap;

use crate::frame::MetadataPair;

/// Metadata key the transport fills with the peer's socket address.
pub const PEER_ADDR_KEY: &str = "peer-addr";

/// Metadata key carrying a client-propagated deadline, in milliseconds.
pub const DEADLINE_MS_KEY: &str = "deadline-ms";

/// Key/value headers accompanying a call, out of the request body.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    entries: HashMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn from_pairs(pairs: Vec<MetadataPair>) -> Self {
        let mut metadata = Self::new();
        for pair in pairs {
            metadata.entries.insert(pair.key, pair.value);
        }
        metadata
    }

    pub fn to_pairs(&self) -> Vec<MetadataPair> {
        let mut pairs: Vec<MetadataPair> = self
            .entries
            .iter()
            .map(|(k, v)| MetadataPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        pairs.sort_by(|a, b| a.key.cmp(&b.key));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut metadata = Metadata::new();
        metadata.insert("grpc-url", "localhost:50051");
        assert_eq!(metadata.get("grpc-url"), Some("localhost:50051"));
        assert_eq!(metadata.get("absent"), None);
    }

    #[test]
    fn test_pairs_roundtrip() {
        let mut metadata = Metadata::new();
        metadata.insert("a", "1");
        metadata.insert("b", "2");
        let restored = Metadata::from_pairs(metadata.to_pairs());
        assert_eq!(restored.get("a"), Some("1"));
        assert_eq!(restored.get("b"), Some("2"));
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn test_to_pairs_deterministic_order() {
        let mut metadata = Metadata::new();
        metadata.insert("z", "26");
        metadata.insert("a", "1");
        let pairs = metadata.to_pairs();
        assert_eq!(pairs[0].key, "a");
        assert_eq!(pairs[1].key, "z");
    }

    #[test]
    fn test_overwrite() {
        let mut metadata = Metadata::new();
        metadata.insert("k", "old");
        metadata.insert("k", "new");
        assert_eq!(metadata.get("k"), Some("new"));
        assert_eq!(metadata.len(), 1);
    }
}
