use crate::error::{IndexError, Result};
use crate::store::{Counter, Store, StoreMap};

/// Bidirectional mapping between strings and dense integer IDs, used for
/// both the URL and the term dictionaries.
///
/// IDs are monotonic and never freed: postings and link edges reference them
/// by value with no reference counting, so reusing an ID would silently
/// corrupt unrelated entries. Dictionary growth is unbounded by design.
pub struct IdDictionary {
    forward: StoreMap<String, u32>,
    reverse: StoreMap<u32, String>,
    counter: Counter,
}

impl IdDictionary {
    pub fn open(store: &Store, forward_name: &str, reverse_name: &str) -> Result<IdDictionary> {
        Ok(IdDictionary {
            forward: store.open_map(forward_name)?,
            reverse: store.open_map(reverse_name)?,
            counter: store.open_counter(forward_name)?,
        })
    }

    /// Returns the existing ID for `key`, or assigns the next dense ID and
    /// records both directions of the mapping.
    pub fn get_or_create_id(&self, key: &str) -> Result<u32> {
        if key.is_empty() {
            return Err(IndexError::InvalidArgument("empty dictionary key".into()));
        }
        if let Some(id) = self.forward.get(&key.to_string())? {
            return Ok(id);
        }

        let id = self.counter.next()?;
        self.forward.put(&key.to_string(), &id)?;
        self.reverse.put(&id, &key.to_string())?;
        Ok(id)
    }

    pub fn id(&self, key: &str) -> Result<Option<u32>> {
        self.forward.get(&key.to_string())
    }

    pub fn key(&self, id: u32) -> Result<Option<String>> {
        self.reverse.get(&id)
    }

    /// Number of IDs ever assigned.
    pub fn len(&self) -> Result<u32> {
        self.counter.value()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
