//! # JSON Store
//!
//! Flat-file key-value store. Each key is one pretty-printed JSON document at
//! `<dir>/<key>.json`.
//!
//! ## Guarantees
//!
//! - Writes go to a temp file in the same directory, are fsynced, then renamed over the
//!   old document, so readers only ever see a complete document
//! - A missing document is seeded with the caller's default on first read
//! - A malformed document is handled by [`CorruptPolicy`]: either moved aside to
//!   `<key>.json.corrupt` and reseeded, or reported as [`StoreError::Corrupt`]
//! - Every operation on a key runs inside that key's async mutex, so
//!   [`JsonStore::update`] is a proper critical section for read-modify-write
use std::{
    fmt, io,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::{fs, sync::Mutex, task::spawn_blocking};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Document {key} is malformed: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("Failed to serialize {key}: {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },
}

/// What to do when a persisted document no longer parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Move the bad file aside and start over from the default.
    #[default]
    Reseed,
    /// Refuse to serve the key until someone repairs it.
    Fail,
}

impl FromStr for CorruptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reseed" => Ok(CorruptPolicy::Reseed),
            "fail" => Ok(CorruptPolicy::Fail),
            other => Err(format!("unknown corrupt policy: {other}")),
        }
    }
}

impl fmt::Display for CorruptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptPolicy::Reseed => f.write_str("reseed"),
            CorruptPolicy::Fail => f.write_str("fail"),
        }
    }
}

pub struct JsonStore {
    dir: PathBuf,
    policy: CorruptPolicy,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JsonStore {
    pub async fn open(dir: impl Into<PathBuf>, policy: CorruptPolicy) -> Result<Self, StoreError> {
        let dir = dir.into();

        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        debug!("Opened store at {} ({policy})", dir.display());

        Ok(Self {
            dir,
            policy,
            locks: DashMap::new(),
        })
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Returns the document under `key`, seeding it with `default` if absent.
    pub async fn read<T>(&self, key: &str, default: T) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let lock = self.lock(key);
        let _guard = lock.lock().await;

        self.read_unlocked(key, default).await
    }

    pub async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let lock = self.lock(key);
        let _guard = lock.lock().await;

        self.write_unlocked(key, value).await
    }

    /// Read-modify-write of `key` under its lock.
    ///
    /// If `apply` fails nothing is written and its error is returned as is.
    pub async fn update<T, R, E, F>(&self, key: &str, default: T, apply: F) -> Result<R, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<StoreError>,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let lock = self.lock(key);
        let _guard = lock.lock().await;

        let mut document = self.read_unlocked(key, default).await?;
        let result = apply(&mut document)?;
        self.write_unlocked(key, &document).await?;

        Ok(result)
    }

    fn lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks.entry(key.to_string()).or_default().clone()
    }

    async fn read_unlocked<T>(&self, key: &str, default: T) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = self.path(key);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{key} not found, seeding default");
                self.write_unlocked(key, &default).await?;
                return Ok(default);
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        match serde_json::from_slice(&bytes) {
            Ok(document) => Ok(document),
            Err(source) => match self.policy {
                CorruptPolicy::Fail => {
                    warn!("{key} is malformed, refusing to reseed: {source}");
                    Err(StoreError::Corrupt {
                        key: key.to_string(),
                        source,
                    })
                }
                CorruptPolicy::Reseed => {
                    let quarantine = path.with_extension("json.corrupt");
                    warn!(
                        "{key} is malformed ({source}), moving it to {} and reseeding",
                        quarantine.display()
                    );

                    fs::rename(&path, &quarantine)
                        .await
                        .map_err(|source| StoreError::Io {
                            path: quarantine.clone(),
                            source,
                        })?;

                    self.write_unlocked(key, &default).await?;
                    Ok(default)
                }
            },
        }
    }

    async fn write_unlocked<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let dir = self.dir.clone();
        let path = self.path(key);

        spawn_blocking(move || atomic_write(&dir, &path, &bytes))
            .await
            .map_err(|e| StoreError::Io {
                path: self.path(key),
                source: io::Error::other(e),
            })?
    }
}

fn atomic_write(dir: &Path, path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let io_err = |source: io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    temp.write_all(data).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    Ok(())
}
