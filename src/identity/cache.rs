//! Session-scoped identity cache.
//!
//! One slot (`CACHE_KEY`) holds at most one `CacheEntry`, so writing an entry for one
//! authority replaces whatever the other authority had stored. The backing `CacheStore`
//! is a plain string key/value store; two ship here, an in-process map and a JSON file
//! that survives restarts the way tab storage survives reloads.
//!
//! Next to the slot, `PRIOR_KEY` remembers which authority an evicted entry belonged to,
//! so a caller whose session expired is sent back to the matching login page even after
//! a reload. It never holds an identity.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GateError, GateResult};
use super::principal::{Authority, Identity, Principal};

pub const CACHE_KEY: &str = "gatekeeper.identity";
pub const PRIOR_KEY: &str = "gatekeeper.identity.prior";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub authority: Authority,
    pub role: String,
    pub principal: Principal,
    pub written_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn from_identity(id: &Identity) -> Self {
        Self {
            authority: id.authority,
            role: id.role.clone(),
            principal: id.principal.clone(),
            written_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.authority, self.role.clone(), self.principal.clone())
    }

    fn validate(&self) -> GateResult<()> {
        if self.role.trim().is_empty() {
            return Err(GateError::malformed("empty role"));
        }
        if !self.principal.fits(self.authority) {
            return Err(GateError::malformed(format!(
                "{} principal without '{}'", self.authority, self.authority.required_field()
            )));
        }
        Ok(())
    }
}

/// Authority-only marker left behind when an entry is evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRole {
    pub authority: Authority,
    pub evicted_at: DateTime<Utc>,
}

/// Backing key/value storage.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> GateResult<Option<String>>;
    fn set(&self, key: &str, value: String) -> GateResult<()>;
    fn remove(&self, key: &str) -> GateResult<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> GateResult<Option<String>> { Ok(self.map.read().get(key).cloned()) }
    fn set(&self, key: &str, value: String) -> GateResult<()> {
        self.map.write().insert(key.to_string(), value);
        Ok(())
    }
    fn remove(&self, key: &str) -> GateResult<()> {
        self.map.write().remove(key);
        Ok(())
    }
}

/// All keys in one JSON object on disk. Writes go to a sibling temp file first and are
/// renamed into place so a reader never sees a half-written document.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn load_map(&self) -> GateResult<HashMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store_map(&self, map: &HashMap<String, String>) -> GateResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() { std::fs::create_dir_all(dir)?; }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> GateResult<Option<String>> {
        let _g = self.lock.lock();
        Ok(self.load_map()?.remove(key))
    }

    fn set(&self, key: &str, value: String) -> GateResult<()> {
        let _g = self.lock.lock();
        // an unreadable document is replaced rather than blocking every future write
        let mut map = self.load_map().unwrap_or_default();
        map.insert(key.to_string(), value);
        self.store_map(&map)
    }

    fn remove(&self, key: &str) -> GateResult<()> {
        let _g = self.lock.lock();
        match self.load_map() {
            Ok(mut map) => {
                if map.remove(key).is_some() { self.store_map(&map)?; }
                Ok(())
            }
            // unreadable document: nothing in it can be trusted, start over
            Err(_) => self.store_map(&HashMap::new()),
        }
    }
}

/// What a read found in the slot.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLoad {
    Hit(CacheEntry),
    Miss,
    /// Unusable value; `authority` is its tag when that much was readable.
    Malformed { authority: Option<Authority> },
}

#[derive(Clone)]
pub struct IdentityCache {
    store: Arc<dyn CacheStore>,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self { Self { store } }

    pub fn in_memory() -> Self { Self::new(Arc::new(MemoryStore::new())) }

    pub fn read(&self) -> Option<CacheEntry> {
        match self.load() {
            CacheLoad::Hit(e) => Some(e),
            _ => None,
        }
    }

    /// Read with malformed values reported instead of folded into a miss. A malformed
    /// value is removed from the store before returning.
    pub fn load(&self) -> CacheLoad {
        let raw = match self.store.get(CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheLoad::Miss,
            Err(e) => {
                warn!(target: "gatekeeper::cache", "cache read failed, treating as miss: {}", e);
                return CacheLoad::Miss;
            }
        };
        match parse_entry(&raw) {
            Ok(entry) => CacheLoad::Hit(entry),
            Err(e) => {
                let authority = serde_json::from_str::<serde_json::Value>(&raw)
                    .ok()
                    .and_then(|v| v.get("authority").cloned())
                    .and_then(|v| serde_json::from_value::<Authority>(v).ok());
                warn!(target: "gatekeeper::cache", "discarding cache entry ({}): {}", e.code_str(), e);
                let discarded = match authority {
                    Some(a) => self.evict(a),
                    None => self.store.remove(CACHE_KEY),
                };
                if let Err(e) = discarded {
                    warn!(target: "gatekeeper::cache", "failed to remove malformed entry: {}", e);
                }
                CacheLoad::Malformed { authority }
            }
        }
    }

    /// Replace the slot. A live entry supersedes any remembered prior role.
    pub fn write(&self, entry: &CacheEntry) -> GateResult<()> {
        let raw = serde_json::to_string(entry)?;
        self.store.set(CACHE_KEY, raw)?;
        self.forget_prior()?;
        debug!(target: "gatekeeper::cache", "cache.write authority={} principal={}", entry.authority, entry.principal.display_name());
        Ok(())
    }

    pub fn write_identity(&self, id: &Identity) -> GateResult<()> {
        self.write(&CacheEntry::from_identity(id))
    }

    pub fn clear(&self) -> GateResult<()> {
        self.store.remove(CACHE_KEY)?;
        debug!(target: "gatekeeper::cache", "cache.clear");
        Ok(())
    }

    /// Clear the slot and remember whose entry it was.
    pub fn evict(&self, authority: Authority) -> GateResult<()> {
        self.clear()?;
        let marker = PriorRole { authority, evicted_at: Utc::now() };
        self.store.set(PRIOR_KEY, serde_json::to_string(&marker)?)?;
        debug!(target: "gatekeeper::cache", "cache.evict authority={}", authority);
        Ok(())
    }

    /// Authority of the last evicted entry, if no login or resolution has happened since.
    pub fn prior(&self) -> Option<Authority> {
        let raw = match self.store.get(PRIOR_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(target: "gatekeeper::cache", "prior role read failed: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<PriorRole>(&raw) {
            Ok(marker) => Some(marker.authority),
            Err(e) => {
                warn!(target: "gatekeeper::cache", "ignoring unreadable prior role: {}", e);
                None
            }
        }
    }

    pub fn forget_prior(&self) -> GateResult<()> {
        if self.store.get(PRIOR_KEY)?.is_some() {
            self.store.remove(PRIOR_KEY)?;
        }
        Ok(())
    }
}

fn parse_entry(raw: &str) -> GateResult<CacheEntry> {
    let entry: CacheEntry = serde_json::from_str(raw)?;
    entry.validate()?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn admin() -> Identity {
        Identity::new(Authority::Admin, "admin", Principal::from_value(json!({"username": "ops"})).unwrap())
    }

    fn super_admin() -> Identity {
        Identity::new(Authority::SuperAdmin, "super_admin", Principal::from_value(json!({"email": "root@example.com"})).unwrap())
    }

    #[test]
    fn write_replaces_other_authority() {
        let cache = IdentityCache::in_memory();
        cache.write_identity(&admin()).unwrap();
        cache.write_identity(&super_admin()).unwrap();
        let e = cache.read().expect("entry");
        assert_eq!(e.authority, Authority::SuperAdmin);
        assert_eq!(e.identity(), super_admin());
    }

    #[test]
    fn clear_empties_slot() {
        let cache = IdentityCache::in_memory();
        cache.write_identity(&admin()).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.load(), CacheLoad::Miss);
        // clearing an empty slot is fine
        cache.clear().unwrap();
    }

    #[test]
    fn unparseable_value_is_malformed_and_removed() {
        let store = Arc::new(MemoryStore::new());
        store.set(CACHE_KEY, "{oops".into()).unwrap();
        let cache = IdentityCache::new(store.clone());
        assert_eq!(cache.load(), CacheLoad::Malformed { authority: None });
        assert_eq!(store.get(CACHE_KEY).unwrap(), None);
    }

    #[test]
    fn shape_mismatch_keeps_readable_tag() {
        let store = Arc::new(MemoryStore::new());
        let raw = json!({
            "authority": "super_admin",
            "role": "super_admin",
            "principal": {"username": "not-an-email-principal"},
            "written_at": "2026-01-01T00:00:00Z"
        });
        store.set(CACHE_KEY, raw.to_string()).unwrap();
        let cache = IdentityCache::new(store);
        assert_eq!(cache.load(), CacheLoad::Malformed { authority: Some(Authority::SuperAdmin) });
        assert!(cache.read().is_none());
    }

    #[test]
    fn eviction_remembers_authority_until_next_write() {
        let cache = IdentityCache::in_memory();
        cache.write_identity(&super_admin()).unwrap();
        cache.evict(Authority::SuperAdmin).unwrap();
        assert_eq!(cache.load(), CacheLoad::Miss);
        assert_eq!(cache.prior(), Some(Authority::SuperAdmin));
        // a plain clear leaves the marker alone
        cache.clear().unwrap();
        assert_eq!(cache.prior(), Some(Authority::SuperAdmin));

        cache.write_identity(&admin()).unwrap();
        assert_eq!(cache.prior(), None);
    }

    #[test]
    fn tagged_malformed_value_leaves_prior_role() {
        let store = Arc::new(MemoryStore::new());
        let raw = json!({"authority": "admin", "role": "", "principal": {"username": "ops"}});
        store.set(CACHE_KEY, raw.to_string()).unwrap();
        let cache = IdentityCache::new(store.clone());
        assert_eq!(cache.load(), CacheLoad::Malformed { authority: Some(Authority::Admin) });
        assert_eq!(store.get(CACHE_KEY).unwrap(), None);
        assert_eq!(cache.prior(), Some(Authority::Admin));
    }

    #[test]
    fn empty_role_is_malformed() {
        let mut e = CacheEntry::from_identity(&admin());
        e.role = " ".into();
        assert!(matches!(e.validate(), Err(GateError::MalformedCache(_))));
    }
}
