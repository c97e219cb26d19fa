use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::KeyValue;

/// Environment snapshot bound to a worker process at spawn time.
///
/// Stored as an ordered list of bindings; a later binding for the same key shadows an
/// earlier one, so layering (host defaults, control-plane values, host overrides) is plain
/// concatenation. On the wire it is a flat `name -> value` JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env(Vec<KeyValue>);

impl Env {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of stored bindings, shadowed ones included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a binding. It shadows any earlier binding with the same key.
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Effective value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Layer `other` on top of `self`.
    pub fn overlay(&self, other: &Env) -> Env {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        Env(out)
    }

    /// Iterate over effective bindings only, one per key, in first-seen key order.
    pub fn effective(&self) -> impl Iterator<Item = (&str, &str)> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .filter(move |kv| seen.insert(kv.key()))
            .map(move |kv| (kv.key(), self.get(kv.key()).unwrap_or(kv.value())))
    }

    /// Effective bindings as a sorted map.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.effective()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Env
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Env(iter.into_iter().map(KeyValue::from).collect())
    }
}

impl From<BTreeMap<String, String>> for Env {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl Serialize for Env {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Env {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<String, String>::deserialize(deserializer).map(Env::from)
    }
}
