// Telemetry sink consumed by the control core
//
// The core only knows how to publish (key, value) pairs; the runtime decides
// where frames actually go (zenoh, in this crate).

use serde_json::{Map, Value};

pub trait TelemetrySink {
    fn publish(&mut self, key: &str, value: f64);
}

/// Collects one control cycle's worth of telemetry before it is shipped.
#[derive(Debug, Default)]
pub struct TelemetryFrame {
    entries: Vec<(String, f64)>,
}

impl TelemetryFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|&(_, v)| v)
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.entries {
            map.insert(key.clone(), Value::from(*value));
        }
        Value::Object(map)
    }
}

impl TelemetrySink for TelemetryFrame {
    fn publish(&mut self, key: &str, value: f64) {
        self.entries.push((key.to_string(), value));
    }
}
