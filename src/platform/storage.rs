//! Key/value storage backends
//!
//! Everything persisted by the crate goes through [`Storage`]. In the browser
//! that is `window.localStorage`; natively and in tests it is a map in memory.
//! [`FallbackStorage`] keeps the app running when the browser medium is
//! missing (private browsing) or full.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use thiserror::Error;

/// Storage failures. Callers degrade instead of propagating these to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage medium unavailable: {0}")]
    Unavailable(String),
    #[error("storage quota exceeded writing {key}")]
    QuotaExceeded { key: String },
    #[error("failed to serialize {0}")]
    Serialize(String),
}

/// Minimal string key/value store, mirroring the Web Storage API.
///
/// Methods take `&self`: the browser object is internally mutable and the
/// whole crate runs on one event loop.
pub trait Storage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Approximate bytes used (keys + values, UTF-16 like the browser counts)
    fn used_bytes(&self) -> Result<usize, StorageError> {
        let mut total = 0;
        for key in self.keys()? {
            let value = self.get_item(&key)?.unwrap_or_default();
            total += (key.encode_utf16().count() + value.encode_utf16().count()) * 2;
        }
        Ok(total)
    }

    /// True when writes no longer reach a persistent medium
    fn is_degraded(&self) -> bool {
        false
    }
}

/// Handle shared by the store, session manager and personal bests
pub type SharedStorage = Rc<dyn Storage>;

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RefCell<BTreeMap<String, String>>,
    /// Optional byte limit to emulate quota errors
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory storage that rejects writes past `quota` bytes
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: RefCell::new(BTreeMap::new()),
            quota: Some(quota),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            let others: usize = self
                .items
                .borrow()
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.items.borrow().keys().cloned().collect())
    }
}

/// Browser LocalStorage (WASM only)
#[cfg(target_arch = "wasm32")]
pub struct LocalStorage {
    inner: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    /// Open `window.localStorage`, `None` when the page may not use it
    pub fn open() -> Option<Self> {
        let inner = web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten()?;
        Some(Self { inner })
    }
}

#[cfg(target_arch = "wasm32")]
impl Storage for LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner
            .get_item(key)
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Browsers report quota errors as a DOMException on setItem
        self.inner
            .set_item(key, value)
            .map_err(|_| StorageError::QuotaExceeded {
                key: key.to_string(),
            })
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner
            .remove_item(key)
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let len = self
            .inner
            .length()
            .map_err(|e| StorageError::Unavailable(format!("{:?}", e)))?;
        let mut keys = Vec::with_capacity(len as usize);
        for i in 0..len {
            if let Ok(Some(key)) = self.inner.key(i) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

/// Primary storage with an in-memory fallback.
///
/// The first failing operation flips the wrapper into memory-only mode for
/// the rest of the page's life. Data written before the failure stays in the
/// primary medium; the session simply stops persisting.
pub struct FallbackStorage {
    primary: Option<Box<dyn Storage>>,
    memory: MemoryStorage,
    degraded: Cell<bool>,
}

impl FallbackStorage {
    pub fn new(primary: Option<Box<dyn Storage>>) -> Self {
        let degraded = primary.is_none();
        if degraded {
            log::warn!("No persistent storage available, progress is memory-only");
        }
        Self {
            primary,
            memory: MemoryStorage::new(),
            degraded: Cell::new(degraded),
        }
    }

    /// Memory-only storage
    pub fn memory_only() -> Self {
        Self {
            primary: None,
            memory: MemoryStorage::new(),
            degraded: Cell::new(true),
        }
    }

    fn active(&self) -> Option<&dyn Storage> {
        if self.degraded.get() {
            None
        } else {
            self.primary.as_deref()
        }
    }

    /// Switch to memory, carrying over whatever the primary can still read
    fn degrade(&self, err: &StorageError) {
        if self.degraded.replace(true) {
            return;
        }
        log::warn!("Storage failed ({}), continuing in memory-only mode", err);
        let Some(primary) = self.primary.as_deref() else {
            return;
        };
        let Ok(keys) = primary.keys() else {
            return;
        };
        for key in keys {
            if let Ok(Some(value)) = primary.get_item(&key) {
                if let Err(e) = self.memory.set_item(&key, &value) {
                    log::warn!("Could not carry {} over to memory: {}", key, e);
                }
            }
        }
    }

    /// Run `op` against the primary medium, or memory once degraded
    fn with<T>(
        &self,
        op: impl Fn(&dyn Storage) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        if let Some(primary) = self.active() {
            match op(primary) {
                Ok(value) => return Ok(value),
                Err(err) => self.degrade(&err),
            }
        }
        op(&self.memory)
    }
}

impl Storage for FallbackStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with(|s| s.get_item(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with(|s| s.set_item(key, value))
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.with(|s| s.remove_item(key))
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.with(|s| s.keys())
    }

    fn is_degraded(&self) -> bool {
        self.degraded.get()
    }
}
