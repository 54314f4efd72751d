//! Small string key-value persistence, used to remember the last searched city.

use std::{
    collections::HashMap,
    fmt::Debug,
    fs,
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;

pub const LAST_CITY_KEY: &str = "last_city";

pub trait KeyValueStore: Send + Sync + Debug {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl KeyValueStore for MemoryStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A TOML table of strings on disk. Every write rewrites the whole file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read store file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse store file: {}", path.display()))?
        } else {
            HashMap::new()
        };

        Ok(Self { path, values: Mutex::new(values) })
    }

    /// Open the store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-lookup", "weather-lookup")
            .ok_or_else(|| anyhow!("Could not determine platform data directory"))?;

        Ok(dirs.data_dir().join("store.toml"))
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create store directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(values).context("Failed to serialize store to TOML")?;

        fs::write(&self.path, toml)
            .with_context(|| format!("Failed to write store file: {}", self.path.display()))
    }
}

impl KeyValueStore for FileStore {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow!("File store lock poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::default();
        assert_eq!(store.get_string(LAST_CITY_KEY), None);

        store.set_string(LAST_CITY_KEY, "London").unwrap();
        store.set_string(LAST_CITY_KEY, "Paris").unwrap();

        assert_eq!(store.get_string(LAST_CITY_KEY).as_deref(), Some("Paris"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.toml");

        let store = FileStore::open(path.clone()).unwrap();
        assert_eq!(store.get_string(LAST_CITY_KEY), None);
        store.set_string(LAST_CITY_KEY, "São Paulo").unwrap();

        let reopened = FileStore::open(path).unwrap();
        assert_eq!(reopened.get_string(LAST_CITY_KEY).as_deref(), Some("São Paulo"));
    }

    #[test]
    fn file_store_reports_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let err = FileStore::open(path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse store file"));
    }
}
