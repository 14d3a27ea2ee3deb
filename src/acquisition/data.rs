use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One reading from a device: channel name to value, in insertion order.
///
/// Values are numbers or null. Non-finite numbers are stored as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Map<String, Value>);

impl Snapshot {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, channel: impl Into<String>, value: Option<f64>) {
        let value = value.map_or(Value::Null, Value::from);
        self.0.insert(channel.into(), value);
    }

    #[cfg(test)]
    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.0.get(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Option<f64>)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, Option<f64>)>>(iter: I) -> Self {
        let mut snapshot = Snapshot::new();
        for (channel, value) in iter {
            snapshot.insert(channel, value);
        }
        snapshot
    }
}
