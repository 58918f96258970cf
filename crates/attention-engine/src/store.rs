//! Key/value persistence for calibration results.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

/// Durable float store the calibration state machine writes through.
///
/// Implementations must tolerate being called from a thread other than the
/// one processing frames.
pub trait CalibrationStore: Send + Sync {
    fn get(&self, key: &str, default: f64) -> f64;
    fn set(&self, key: &str, value: f64) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Process-local store, used in tests and when nothing needs to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, f64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl CalibrationStore for MemoryStore {
    fn get(&self, key: &str, default: f64) -> f64 {
        self.values.lock().get(key).copied().unwrap_or(default)
    }

    fn set(&self, key: &str, value: f64) -> Result<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.values.lock().clear();
        Ok(())
    }
}

/// Store backed by a JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, f64>>,
}

impl JsonFileStore {
    /// Opens `path`, loading existing values if the file is present.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &HashMap<String, f64>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl CalibrationStore for JsonFileStore {
    fn get(&self, key: &str, default: f64) -> f64 {
        self.values.lock().get(key).copied().unwrap_or(default)
    }

    fn set(&self, key: &str, value: f64) -> Result<()> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value);
        self.flush(&values)
    }

    fn clear(&self) -> Result<()> {
        let mut values = self.values.lock();
        values.clear();
        self.flush(&values)
    }
}
