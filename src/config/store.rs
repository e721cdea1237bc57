//! Namespaced JSON key/value store
//!
//! Backs both the alias configuration (`config/config.json`) and the
//! per-alias sync caches (`cache/<alias>.json`). Values are addressed either
//! by a dotted path (`"myalias.token.access_token"`) or by explicit key
//! segments when a key may itself contain dots (remote item identifiers).
//!
//! Numeric segments index into arrays on read (`"credentials.redirect_uris.0"`).
//! With write-through enabled every mutation is flushed to disk immediately.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read store {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write store {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store {0:?} is not a JSON object")]
    NotAnObject(PathBuf),

    #[error("Failed to parse store {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Cannot set '{0}': an intermediate value is not an object")]
    PathConflict(String),

    #[error("Invalid value at '{key}': {source}")]
    Value {
        key: String,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A JSON object persisted at a fixed location
#[derive(Debug, Clone)]
pub struct JsonStore {
    location: PathBuf,
    data: Map<String, Value>,
    write_through: bool,
}

impl JsonStore {
    /// Open the store at `location`; a missing file yields an empty store
    pub fn open<P: AsRef<Path>>(location: P) -> Result<Self> {
        let location = location.as_ref().to_path_buf();

        let data = if location.exists() {
            let contents = fs::read_to_string(&location).map_err(|source| StoreError::Read {
                path: location.clone(),
                source,
            })?;

            if contents.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&contents) {
                    Ok(Value::Object(map)) => map,
                    Ok(_) => return Err(StoreError::NotAnObject(location)),
                    Err(source) => {
                        return Err(StoreError::Parse {
                            path: location,
                            source,
                        })
                    }
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            location,
            data,
            write_through: true,
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Toggle flushing on every mutation
    pub fn set_write_through(&mut self, enabled: bool) {
        self.write_through = enabled;
    }

    /// The whole store as a JSON object
    pub fn root(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Top-level keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.data.keys().cloned().collect()
    }

    /// Get the value at a dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.get_in(&split_path(path))
    }

    /// Get the value addressed by explicit key segments
    pub fn get_in(&self, segments: &[&str]) -> Option<&Value> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.data.get(*first)?;

        for segment in rest {
            current = match current {
                Value::Object(map) => map.get(*segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Deserialize the value at a dotted path; `Ok(None)` when absent or null
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|source| StoreError::Value {
                    key: path.to_string(),
                    source,
                }),
        }
    }

    /// Whether a non-null value exists at a dotted path
    pub fn exists(&self, path: &str) -> bool {
        !matches!(self.get(path), None | Some(Value::Null))
    }

    /// Set a value at a dotted path, creating intermediate objects
    pub fn set<T: Serialize>(&mut self, path: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Value {
            key: path.to_string(),
            source,
        })?;
        self.set_in(&split_path(path), value)
    }

    /// Set a value addressed by explicit key segments
    pub fn set_in(&mut self, segments: &[&str], value: Value) -> Result<()> {
        let Some((last, parents)) = segments.split_last() else {
            return Err(StoreError::PathConflict(String::new()));
        };

        let mut current = &mut self.data;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match entry {
                Value::Object(map) => map,
                _ => return Err(StoreError::PathConflict(segments.join("."))),
            };
        }

        current.insert(last.to_string(), value);
        self.flush_if_write_through()
    }

    /// Remove the value at a dotted path; returns whether something was removed
    pub fn delete(&mut self, path: &str) -> Result<bool> {
        self.delete_in(&split_path(path))
    }

    /// Remove the value addressed by explicit key segments
    pub fn delete_in(&mut self, segments: &[&str]) -> Result<bool> {
        let Some((last, parents)) = segments.split_last() else {
            return Ok(false);
        };

        let mut current = &mut self.data;
        for segment in parents {
            current = match current.get_mut(*segment) {
                Some(Value::Object(map)) => map,
                _ => return Ok(false),
            };
        }

        let removed = current.remove(*last).is_some();
        if removed {
            self.flush_if_write_through()?;
        }
        Ok(removed)
    }

    /// Write the store to disk
    pub fn write(&self) -> Result<()> {
        if let Some(parent) = self.location.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.location.clone(),
                source,
            })?;
        }

        let contents = serde_json::to_string_pretty(&self.data).map_err(|source| StoreError::Value {
            key: String::new(),
            source,
        })?;

        // Stage next to the target, then rename over it
        let staging = self.location.with_extension("json.tmp");
        fs::write(&staging, contents)
            .and_then(|_| fs::rename(&staging, &self.location))
            .map_err(|source| StoreError::Write {
                path: self.location.clone(),
                source,
            })?;

        debug!("Wrote store {:?}", self.location);
        Ok(())
    }

    fn flush_if_write_through(&self) -> Result<()> {
        if self.write_through {
            self.write()
        } else {
            Ok(())
        }
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}
