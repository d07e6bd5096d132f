//! Flat-file authorization store.
//!
//! Keeps the whole state as one JSON document, matching the layout the
//! service has always persisted: `{"keys": [], "banned": [], "deactivated": []}`.
//! A mutex guards the in-memory copy, so every operation is atomic with
//! respect to the others; each mutation rewrites the file (write to a temp
//! file, fsync, rename) before returning.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::models::{Ban, Deactivation, IssuedKey};

use super::{LicenseStore, StoreDump, StoreError, StoreResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DataFile {
    #[serde(default)]
    keys: Vec<IssuedKey>,
    #[serde(default)]
    banned: Vec<Ban>,
    #[serde(default)]
    deactivated: Vec<Deactivation>,
}

pub struct FileStore {
    path: PathBuf,
    state: Mutex<DataFile>,
}

impl FileStore {
    /// Open the store, loading existing state from `path`. A missing file
    /// starts empty; a corrupt file is an error - silently resetting would
    /// resurrect banned keys.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DataFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &DataFile) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut DataFile) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl LicenseStore for FileStore {
    fn get_issued(&self, key: &str) -> StoreResult<Option<IssuedKey>> {
        self.with_state(|state| Ok(state.keys.iter().find(|k| k.key == key).cloned()))
    }

    fn create_issued(&self, key: &str, hwid: &str, now: i64) -> StoreResult<()> {
        self.with_state(|state| {
            if state.keys.iter().any(|k| k.key == key) {
                return Err(StoreError::AlreadyExists);
            }
            state.keys.push(IssuedKey {
                key: key.to_string(),
                hwid: hwid.to_string(),
                created_at: now,
                last_seen_at: None,
            });
            self.persist(state)
        })
    }

    fn upsert_issued_on_verify(&self, key: &str, hwid: &str, now: i64) -> StoreResult<()> {
        self.with_state(|state| {
            match state.keys.iter_mut().find(|k| k.key == key) {
                Some(record) => {
                    record.hwid = hwid.to_string();
                    record.last_seen_at = Some(now);
                }
                None => state.keys.push(IssuedKey {
                    key: key.to_string(),
                    hwid: hwid.to_string(),
                    created_at: now,
                    last_seen_at: Some(now),
                }),
            }
            self.persist(state)
        })
    }

    fn find_ban(&self, key: &str, hwid: &str) -> StoreResult<Option<Ban>> {
        self.with_state(|state| {
            // A key match wins over an hwid-only match.
            let by_key = state.banned.iter().find(|b| b.key == key);
            let hit = by_key.or_else(|| {
                state
                    .banned
                    .iter()
                    .find(|b| !hwid.is_empty() && b.hwid == hwid)
            });
            Ok(hit.cloned())
        })
    }

    fn find_deactivation(&self, key: &str) -> StoreResult<Option<Deactivation>> {
        self.with_state(|state| Ok(state.deactivated.iter().find(|d| d.key == key).cloned()))
    }

    fn ban(&self, key: &str, reason: &str, now: i64) -> StoreResult<()> {
        self.with_state(|state| {
            let hwid = state
                .keys
                .iter()
                .find(|k| k.key == key)
                .map(|k| k.hwid.clone())
                .unwrap_or_default();

            // A ban supersedes any deactivation for the key.
            state.deactivated.retain(|d| d.key != key);

            match state.banned.iter_mut().find(|b| b.key == key) {
                Some(ban) => {
                    ban.hwid = hwid;
                    ban.reason = reason.to_string();
                    ban.banned_at = now;
                }
                None => state.banned.push(Ban {
                    key: key.to_string(),
                    hwid,
                    reason: reason.to_string(),
                    banned_at: now,
                }),
            }
            self.persist(state)
        })
    }

    fn unban(&self, key: &str) -> StoreResult<()> {
        self.with_state(|state| {
            state.banned.retain(|b| b.key != key);
            self.persist(state)
        })
    }

    fn deactivate(&self, key: &str, reason: &str, now: i64) -> StoreResult<()> {
        self.with_state(|state| {
            match state.deactivated.iter_mut().find(|d| d.key == key) {
                Some(record) => {
                    record.reason = reason.to_string();
                    record.deactivated_at = now;
                }
                None => state.deactivated.push(Deactivation {
                    key: key.to_string(),
                    reason: reason.to_string(),
                    deactivated_at: now,
                }),
            }
            self.persist(state)
        })
    }

    fn reactivate(&self, key: &str) -> StoreResult<()> {
        self.with_state(|state| {
            state.deactivated.retain(|d| d.key != key);
            state.banned.retain(|b| b.key != key);
            self.persist(state)
        })
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.with_state(|state| {
            state.keys.retain(|k| k.key != key);
            state.banned.retain(|b| b.key != key);
            state.deactivated.retain(|d| d.key != key);
            self.persist(state)
        })
    }

    fn list_all(&self) -> StoreResult<StoreDump> {
        self.with_state(|state| {
            // Newest-first by each set's own timestamp; reverse before the
            // stable sort so same-second records keep newest-insertion order.
            let mut keys: Vec<_> = state.keys.iter().rev().cloned().collect();
            keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));

            let mut banned: Vec<_> = state.banned.iter().rev().cloned().collect();
            banned.sort_by(|a, b| b.banned_at.cmp(&a.banned_at));

            let mut deactivated: Vec<_> = state.deactivated.iter().rev().cloned().collect();
            deactivated.sort_by(|a, b| b.deactivated_at.cmp(&a.deactivated_at));

            Ok(StoreDump {
                keys,
                banned,
                deactivated,
            })
        })
    }
}
