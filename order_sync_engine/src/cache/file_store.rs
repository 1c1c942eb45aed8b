use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use log::*;
use tokio::sync::broadcast;

use crate::{
    cache::{CacheChange, CacheError, OrderCache},
    order_types::Order,
};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// The default cache store: an in-memory map of owner key to order set, with an optional JSON snapshot on disk.
///
/// Durability model: every mutation rewrites the snapshot via a temp file followed by a rename, so the file on disk
/// is always a complete, parseable snapshot. A store opened without a path is purely in-memory; the engine behaves
/// identically, it just starts cold on every session.
pub struct FileStore {
    inner: Mutex<HashMap<String, Vec<Order>>>,
    path: Option<PathBuf>,
    changes: broadcast::Sender<CacheChange>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(p) => write!(f, "FileStore({})", p.display()),
            None => write!(f, "FileStore(in-memory)"),
        }
    }
}

impl FileStore {
    pub fn in_memory() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { inner: Mutex::new(HashMap::new()), path: None, changes }
    }

    /// Open a durable store backed by the given snapshot file. A missing file is an empty store; a corrupt file is
    /// an error so that a damaged snapshot is never silently thrown away.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let orders = match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt(format!("{}: {e}", path.display())))?
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(CacheError::Io(format!("{}: {e}", path.display()))),
        };
        debug!("🗃️ Opened cache snapshot {} ({} owners)", path.display(), count_owners(&orders));
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self { inner: Mutex::new(orders), path: Some(path), changes })
    }

    fn persist(&self, state: &HashMap<String, Vec<Order>>) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(state).map_err(|e| CacheError::Io(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| CacheError::Io(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, path).map_err(|e| CacheError::Io(format!("{}: {e}", path.display())))?;
        Ok(())
    }

    fn emit(&self, change: CacheChange) {
        // Nobody listening is fine; the signal is advisory.
        let _ = self.changes.send(change);
    }
}

fn count_owners(state: &HashMap<String, Vec<Order>>) -> usize {
    state.len()
}

impl OrderCache for FileStore {
    fn orders_for(&self, owner_key: &str) -> Result<Vec<Order>, CacheError> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.get(owner_key).cloned().unwrap_or_default())
    }

    fn replace_all(&self, owner_key: &str, orders: Vec<Order>) -> Result<(), CacheError> {
        let count = orders.len();
        {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            state.insert(owner_key.to_string(), orders);
            self.persist(&state)?;
        }
        trace!("🗃️ Replaced order set for {owner_key} ({count} orders)");
        self.emit(CacheChange::Replaced { owner_key: owner_key.to_string(), count });
        Ok(())
    }

    fn upsert(&self, order: Order) -> Result<(), CacheError> {
        let owner_key = order.owner.key.clone();
        let order_id = order.id.clone();
        {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let orders = state.entry(owner_key.clone()).or_default();
            match orders.iter_mut().find(|o| o.id == order.id) {
                Some(existing) => *existing = order,
                None => orders.push(order),
            }
            self.persist(&state)?;
        }
        trace!("🗃️ Upserted order {order_id} for {owner_key}");
        self.emit(CacheChange::Upserted { owner_key, order_id });
        Ok(())
    }

    fn clear_owner(&self, owner_key: &str) -> Result<(), CacheError> {
        {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            state.remove(owner_key);
            self.persist(&state)?;
        }
        warn!("🗃️ Cleared all cached orders for {owner_key}");
        self.emit(CacheChange::Cleared { owner_key: owner_key.to_string() });
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<CacheChange> {
        self.changes.subscribe()
    }
}
