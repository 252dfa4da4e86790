use crate::config::atomic_rename;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Key under which the best survival time (seconds) is kept.
pub(crate) const RECORD_KEY: &str = "recordTime";

/// Application-scoped scalar settings, injected into the game loop.
pub(crate) trait KeyValueStore {
    fn get_f64(&self, key: &str) -> Option<f64>;
    fn set_f64(&mut self, key: &str, value: f64) -> Result<()>;
}

/// Flat JSON object on disk, rewritten atomically on every set.
pub(crate) struct JsonFileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonFileStore {
    pub(crate) fn open(path: &Path) -> Self {
        let values = match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<Map<String, Value>>(&s) {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("ignoring unreadable store {}: {e}", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                log::warn!("cannot read store {}: {e}", path.display());
                Map::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            values,
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    fn set_f64(&mut self, key: &str, value: f64) -> Result<()> {
        let num = serde_json::Number::from_f64(value)
            .with_context(|| format!("{key}: {value} is not a finite number"))?;
        self.values.insert(key.to_string(), Value::Number(num));

        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(&self.values)?;
        fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
        atomic_rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    values: BTreeMap<String, f64>,
}

impl KeyValueStore for MemoryStore {
    fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    fn set_f64(&mut self, key: &str, value: f64) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}
