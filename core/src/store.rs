use crate::error::{IndexError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::Path;

/// Key types usable in a [`StoreMap`]. The byte encoding must preserve the
/// key's natural ordering, since sled iterates trees in byte order and that
/// order doubles as the map's logical order.
pub trait StoreKey: Sized {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl StoreKey for u32 {
    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| IndexError::Inconsistent("malformed u32 key in store".into()))?;
        Ok(u32::from_be_bytes(bytes))
    }
}

impl StoreKey for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| IndexError::Inconsistent("malformed utf-8 key in store".into()))
    }
}

/// One durable backing store holding every named map. Opened once at process
/// start; callers must [`commit`](Store::commit) before exit or the session's
/// writes may be lost.
pub struct Store {
    db: sled::Db,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Store> {
        Ok(Store { db: sled::open(path)? })
    }

    /// Load-or-create a named map. Idempotent: opening the same name twice
    /// yields handles onto the same durable tree.
    pub fn open_map<K: StoreKey, V: Serialize + DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<StoreMap<K, V>> {
        Ok(StoreMap {
            tree: self.db.open_tree(name)?,
            _marker: PhantomData,
        })
    }

    /// Load-or-create a named persistent counter, starting at 0.
    pub fn open_counter(&self, name: &str) -> Result<Counter> {
        Ok(Counter {
            tree: self.db.open_tree("counters")?,
            key: name.to_string(),
        })
    }

    pub fn commit(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// Typed view over one named sled tree. Values round-trip through bincode;
/// keys through [`StoreKey`], so full-range iteration is ascending.
pub struct StoreMap<K, V> {
    tree: sled::Tree,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: StoreKey, V: Serialize + DeserializeOwned> StoreMap<K, V> {
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        match self.tree.get(key.encode())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &K, value: &V) -> Result<()> {
        self.tree.insert(key.encode(), bincode::serialize(value)?)?;
        Ok(())
    }

    pub fn remove(&self, key: &K) -> Result<()> {
        self.tree.remove(key.encode())?;
        Ok(())
    }

    pub fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.tree.contains_key(key.encode())?)
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<(K, V)>> + '_ {
        self.tree.iter().map(|entry| {
            let (key, value) = entry?;
            Ok((K::decode(&key)?, bincode::deserialize(&value)?))
        })
    }
}

/// Persistent monotonic counter backing dense ID assignment. Kept explicit
/// (rather than derived from map size) so IDs stay stable across deletions
/// elsewhere in the store.
pub struct Counter {
    tree: sled::Tree,
    key: String,
}

impl Counter {
    pub fn value(&self) -> Result<u32> {
        match self.tree.get(self.key.as_bytes())? {
            Some(bytes) => u32::decode(&bytes),
            None => Ok(0),
        }
    }

    /// Increments and persists the counter, returning the new value.
    pub fn next(&self) -> Result<u32> {
        let next = self.value()? + 1;
        self.tree.insert(self.key.as_bytes(), next.encode())?;
        Ok(next)
    }
}
