// Persisted configuration store
//
// String-keyed, typed values backed by a JSON file. A missing or mistyped
// key resolves by falling back to the supplied default and persisting it,
// so a fresh robot boots with a fully populated store. Accessors are typed
// up front; nothing inspects value types at runtime to pick a getter.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Typed key-value store for module configuration. Loads and saves may block
/// on I/O, so they are only called at mode-transition boundaries, never from
/// the per-cycle drive path.
pub trait PreferenceStore {
    /// Read a float key, falling back to (and persisting) `default` when the
    /// key is missing or holds a different type.
    fn get_f64(&mut self, key: &str, default: f64) -> f64;

    fn get_bool(&mut self, key: &str, default: bool) -> bool;

    fn put_f64(&mut self, key: &str, value: f64);

    fn put_bool(&mut self, key: &str, value: bool);
}

/// The per-module key schema: suffix appended to `<module name>-` plus the
/// declared value type. Fixed at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefKind {
    Float,
    Bool,
}

pub const MODULE_KEY_SCHEMA: [(&str, PrefKind); 6] = [
    ("offset", PrefKind::Float),
    ("reversed", PrefKind::Bool),
    ("steer-reversed", PrefKind::Bool),
    ("Sensor Reverse", PrefKind::Bool),
    ("Steer Sensor Reverse", PrefKind::Bool),
    ("Max Wheel Speed", PrefKind::Float),
];

/// Build the full store key for a module config field.
pub fn module_key(name: &str, suffix: &str) -> String {
    format!("{name}-{suffix}")
}

/// JSON-file-backed preference store. Values live in memory; `save` writes
/// the whole map back out.
#[derive(Debug, Default)]
pub struct JsonPreferences {
    path: Option<PathBuf>,
    values: BTreeMap<String, Value>,
}

impl JsonPreferences {
    /// In-memory store with no backing file (tests, simulation).
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`. A missing file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| Error::Configuration {
                    key: path.display().to_string(),
                    reason: format!("unparseable preference file: {e}"),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    /// Write the store back to its file, if it has one.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let text = serde_json::to_string_pretty(&self.values).map_err(|e| {
                Error::Configuration {
                    key: path.display().to_string(),
                    reason: format!("serialize failed: {e}"),
                }
            })?;
            fs::write(path, text)?;
        }
        Ok(())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

impl PreferenceStore for JsonPreferences {
    fn get_f64(&mut self, key: &str, default: f64) -> f64 {
        match self.values.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(other) => {
                warn!("preference '{}' has type {:?}, using default", key, other);
                self.put_f64(key, default);
                default
            }
            None => {
                self.put_f64(key, default);
                default
            }
        }
    }

    fn get_bool(&mut self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                warn!("preference '{}' has type {:?}, using default", key, other);
                self.put_bool(key, default);
                default
            }
            None => {
                self.put_bool(key, default);
                default
            }
        }
    }

    fn put_f64(&mut self, key: &str, value: f64) {
        let number = serde_json::Number::from_f64(value)
            .unwrap_or_else(|| serde_json::Number::from(0));
        self.values.insert(key.to_string(), Value::Number(number));
    }

    fn put_bool(&mut self, key: &str, value: bool) {
        self.values.insert(key.to_string(), Value::Bool(value));
    }
}
