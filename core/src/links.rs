use crate::error::{IndexError, Result};
use crate::store::{Store, StoreMap};
use crate::DocId;
use std::collections::BTreeSet;

/// Bidirectional link adjacency over document IDs.
///
/// Invariant: `b ∈ children(a)` iff `a ∈ parents(b)`, for every pair,
/// including self-loops.
pub struct LinkGraph {
    children: StoreMap<DocId, BTreeSet<DocId>>,
    parents: StoreMap<DocId, BTreeSet<DocId>>,
}

impl LinkGraph {
    pub fn open(store: &Store) -> Result<LinkGraph> {
        Ok(LinkGraph {
            children: store.open_map("parent-to-children")?,
            parents: store.open_map("child-to-parents")?,
        })
    }

    /// Replaces the full outgoing edge set of `doc_id`: detaches it from the
    /// parent sets of children that dropped out, records the new forward
    /// set, then attaches it to the parent sets of children that appeared.
    pub fn set_outgoing(&self, doc_id: DocId, new_children: &BTreeSet<DocId>) -> Result<()> {
        if doc_id == 0 || new_children.contains(&0) {
            return Err(IndexError::InvalidArgument("document id 0 in link edge".into()));
        }

        let old_children = self.children(doc_id)?;

        for &removed in old_children.difference(new_children) {
            let mut parents = self.parents(removed)?;
            parents.remove(&doc_id);
            if parents.is_empty() {
                self.parents.remove(&removed)?;
            } else {
                self.parents.put(&removed, &parents)?;
            }
        }

        if new_children.is_empty() {
            self.children.remove(&doc_id)?;
        } else {
            self.children.put(&doc_id, new_children)?;
        }

        for &added in new_children.difference(&old_children) {
            let mut parents = self.parents(added)?;
            parents.insert(doc_id);
            self.parents.put(&added, &parents)?;
        }

        Ok(())
    }

    /// Outgoing edges; empty for unknown IDs.
    pub fn children(&self, doc_id: DocId) -> Result<BTreeSet<DocId>> {
        Ok(self.children.get(&doc_id)?.unwrap_or_default())
    }

    /// Incoming edges; empty for unknown IDs.
    pub fn parents(&self, doc_id: DocId) -> Result<BTreeSet<DocId>> {
        Ok(self.parents.get(&doc_id)?.unwrap_or_default())
    }
}
