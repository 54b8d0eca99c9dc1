use crate::error::{IndexError, Result};
use crate::store::{Store, StoreMap};
use crate::{DocId, TermId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Weight given to title occurrences when scoring; body occurrences get the
/// complement.
pub const DEFAULT_TITLE_WEIGHT: f64 = 0.9;

/// Which field of a document an occurrence belongs to. Title and body keep
/// independent position spaces: a phrase never spans the field boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Body,
}

/// The positions of one term within one field of one document.
///
/// Postings are immutable values: an update builds the successor posting and
/// replaces the list entry, so no caller ever holds a mutable alias into the
/// backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub positions: BTreeSet<u32>,
}

impl Posting {
    fn new(doc_id: DocId, position: u32) -> Posting {
        Posting {
            doc_id,
            positions: BTreeSet::from([position]),
        }
    }

    fn with_position(&self, position: u32) -> Posting {
        let mut positions = self.positions.clone();
        positions.insert(position);
        Posting { doc_id: self.doc_id, positions }
    }

    pub fn tf(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Forward (doc → terms) and inverted (term → postings) index for a single
/// field. Posting lists stay sorted ascending by `doc_id`, maintained by
/// binary search on insert and removal; the phrase merge and the scoring
/// co-scan both rely on that order.
struct FieldIndex {
    forward: StoreMap<DocId, BTreeSet<TermId>>,
    inverted: StoreMap<TermId, Vec<Posting>>,
}

impl FieldIndex {
    fn open(store: &Store, forward_name: &str, inverted_name: &str) -> Result<FieldIndex> {
        Ok(FieldIndex {
            forward: store.open_map(forward_name)?,
            inverted: store.open_map(inverted_name)?,
        })
    }

    fn add(&self, doc_id: DocId, term_id: TermId, position: u32) -> Result<()> {
        let mut forward = self.forward.get(&doc_id)?.unwrap_or_default();
        if forward.insert(term_id) {
            self.forward.put(&doc_id, &forward)?;
        }

        let mut postings = self.inverted.get(&term_id)?.unwrap_or_default();
        match postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
            Ok(idx) => {
                let updated = postings[idx].with_position(position);
                postings[idx] = updated;
            }
            Err(idx) => postings.insert(idx, Posting::new(doc_id, position)),
        }
        self.inverted.put(&term_id, &postings)
    }

    /// Splices the document out of every posting list its forward set names
    /// and returns those terms. No-op (empty set) for unknown documents.
    fn remove_document(&self, doc_id: DocId) -> Result<BTreeSet<TermId>> {
        let Some(forward) = self.forward.get(&doc_id)? else {
            return Ok(BTreeSet::new());
        };
        self.forward.remove(&doc_id)?;

        for &term_id in &forward {
            let mut postings = self.inverted.get(&term_id)?.ok_or_else(|| {
                IndexError::Inconsistent(format!(
                    "term {term_id} in forward set of document {doc_id} has no posting list"
                ))
            })?;
            match postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
                Ok(idx) => {
                    postings.remove(idx);
                    if postings.is_empty() {
                        self.inverted.remove(&term_id)?;
                    } else {
                        self.inverted.put(&term_id, &postings)?;
                    }
                }
                Err(_) => {
                    return Err(IndexError::Inconsistent(format!(
                        "term {term_id} has no posting for document {doc_id}"
                    )))
                }
            }
        }

        Ok(forward)
    }

    fn postings(&self, term_id: TermId) -> Result<Vec<Posting>> {
        Ok(self.inverted.get(&term_id)?.unwrap_or_default())
    }

    fn forward_terms(&self, doc_id: DocId) -> Result<BTreeSet<TermId>> {
        Ok(self.forward.get(&doc_id)?.unwrap_or_default())
    }

    /// Term frequency of `term_id` in `doc_id`, 0 when absent.
    fn tf(&self, doc_id: DocId, term_id: TermId) -> Result<u32> {
        let postings = self.inverted.get(&term_id)?.unwrap_or_default();
        Ok(match postings.binary_search_by_key(&doc_id, |p| p.doc_id) {
            Ok(idx) => postings[idx].tf(),
            Err(_) => 0,
        })
    }

    /// Documents containing the phrase within this field: a left fold of
    /// pairwise positional merges, each step keeping the positions where the
    /// next term extends a match by exactly one slot.
    fn documents_with_phrase(&self, phrase: &[TermId]) -> Result<BTreeSet<DocId>> {
        let Some((&first, rest)) = phrase.split_first() else {
            return Ok(BTreeSet::new());
        };

        // (doc, positions where the phrase-so-far ends), sorted by doc.
        let mut matches: Vec<(DocId, BTreeSet<u32>)> = self
            .postings(first)?
            .into_iter()
            .map(|p| (p.doc_id, p.positions))
            .collect();

        for &term_id in rest {
            if matches.is_empty() {
                break;
            }
            matches = merge_adjacent(&matches, &self.postings(term_id)?);
        }

        Ok(matches.into_iter().map(|(doc_id, _)| doc_id).collect())
    }
}

/// Linear co-scan of two doc-sorted lists. A document survives when the next
/// term occurs at `p + 1` for some current end position `p`; the surviving
/// end positions are the next term's occurrences that did.
fn merge_adjacent(
    current: &[(DocId, BTreeSet<u32>)],
    next: &[Posting],
) -> Vec<(DocId, BTreeSet<u32>)> {
    let mut merged = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < current.len() && j < next.len() {
        let (doc_id, ends) = &current[i];
        match doc_id.cmp(&next[j].doc_id) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                let extended: BTreeSet<u32> = next[j]
                    .positions
                    .iter()
                    .copied()
                    .filter(|&pos| pos > 0 && ends.contains(&(pos - 1)))
                    .collect();
                if !extended.is_empty() {
                    merged.push((*doc_id, extended));
                }
                i += 1;
                j += 1;
            }
        }
    }
    merged
}

/// Two-field posting index with the aggregate statistics scoring needs:
/// document frequency per term and the maximum combined term frequency per
/// document.
pub struct PostingIndex {
    title: FieldIndex,
    body: FieldIndex,
    tf_max: StoreMap<DocId, u32>,
    df: StoreMap<TermId, u32>,
    title_weight: f64,
}

impl PostingIndex {
    pub fn open(store: &Store) -> Result<PostingIndex> {
        Ok(PostingIndex {
            title: FieldIndex::open(store, "title-forward", "title-postings")?,
            body: FieldIndex::open(store, "body-forward", "body-postings")?,
            tf_max: store.open_map("doc-tf-max")?,
            df: store.open_map("term-df")?,
            title_weight: DEFAULT_TITLE_WEIGHT,
        })
    }

    fn field(&self, field: Field) -> &FieldIndex {
        match field {
            Field::Title => &self.title,
            Field::Body => &self.body,
        }
    }

    /// Records one occurrence of `term_id` at `position` within a field of
    /// `doc_id`, then refreshes the aggregates for that term and document.
    pub fn add_occurrence(
        &self,
        doc_id: DocId,
        term_id: TermId,
        position: u32,
        field: Field,
    ) -> Result<()> {
        if doc_id == 0 || term_id == 0 {
            return Err(IndexError::InvalidArgument("document or term id 0".into()));
        }
        self.field(field).add(doc_id, term_id, position)?;
        self.update_tf_max(doc_id, term_id)?;
        self.update_df(term_id)
    }

    /// Indexes a whole document: token order is position order, per field.
    pub fn add_document(
        &self,
        doc_id: DocId,
        title_ids: &[TermId],
        body_ids: &[TermId],
    ) -> Result<()> {
        if doc_id == 0 || title_ids.contains(&0) || body_ids.contains(&0) {
            return Err(IndexError::InvalidArgument("document or term id 0".into()));
        }
        for (position, &term_id) in title_ids.iter().enumerate() {
            self.add_occurrence(doc_id, term_id, position as u32, Field::Title)?;
        }
        for (position, &term_id) in body_ids.iter().enumerate() {
            self.add_occurrence(doc_id, term_id, position as u32, Field::Body)?;
        }
        Ok(())
    }

    /// Removes every posting of `doc_id` from both fields and refreshes the
    /// document frequency of each affected term. Idempotent: removing a
    /// document with no postings is a no-op.
    pub fn remove_document(&self, doc_id: DocId) -> Result<()> {
        let title_terms = self.title.remove_document(doc_id)?;
        let body_terms = self.body.remove_document(doc_id)?;
        self.tf_max.remove(&doc_id)?;

        for &term_id in title_terms.union(&body_terms) {
            self.update_df(term_id)?;
        }
        Ok(())
    }

    /// DF is the count of distinct documents holding a non-empty posting for
    /// the term in either field; the entry is dropped when that reaches 0.
    fn update_df(&self, term_id: TermId) -> Result<()> {
        let mut doc_ids: BTreeSet<DocId> = self
            .title
            .postings(term_id)?
            .iter()
            .map(|p| p.doc_id)
            .collect();
        doc_ids.extend(self.body.postings(term_id)?.iter().map(|p| p.doc_id));

        if doc_ids.is_empty() {
            self.df.remove(&term_id)
        } else {
            self.df.put(&term_id, &(doc_ids.len() as u32))
        }
    }

    /// Raises the document's TFMax to the combined frequency of the term
    /// just updated. Between full removals a document's postings only grow,
    /// so the running maximum is exact.
    fn update_tf_max(&self, doc_id: DocId, term_id: TermId) -> Result<()> {
        let combined = self.title.tf(doc_id, term_id)? + self.body.tf(doc_id, term_id)?;
        let current = self.tf_max.get(&doc_id)?.unwrap_or(0);
        if combined > current {
            self.tf_max.put(&doc_id, &combined)?;
        }
        Ok(())
    }

    /// Number of indexed documents (documents with at least one posting).
    pub fn doc_count(&self) -> usize {
        self.tf_max.len()
    }

    pub fn tf_max(&self, doc_id: DocId) -> Result<Option<u32>> {
        self.tf_max.get(&doc_id)
    }

    /// Document frequency of a term; 0 when it occurs nowhere.
    pub fn df(&self, term_id: TermId) -> Result<u32> {
        Ok(self.df.get(&term_id)?.unwrap_or(0))
    }

    pub fn postings(&self, term_id: TermId, field: Field) -> Result<Vec<Posting>> {
        self.field(field).postings(term_id)
    }

    /// Terms present in either field of the document; empty after removal.
    pub fn forward_terms(&self, doc_id: DocId) -> Result<BTreeSet<TermId>> {
        let mut terms = self.title.forward_terms(doc_id)?;
        terms.extend(self.body.forward_terms(doc_id)?);
        Ok(terms)
    }

    /// Combined (title + body) frequency of every term in the document.
    pub fn keyword_frequencies(&self, doc_id: DocId) -> Result<HashMap<TermId, u32>> {
        let mut frequencies = HashMap::new();
        for term_id in self.forward_terms(doc_id)? {
            let combined = self.title.tf(doc_id, term_id)? + self.body.tf(doc_id, term_id)?;
            frequencies.insert(term_id, combined);
        }
        Ok(frequencies)
    }

    /// TF-IDF scores for a query term set, cosine-normalized against each
    /// document's own full term vector.
    ///
    /// Per query term with df > 0: `idf = ln(N / df)`; each posting
    /// contributes `(w·title_tf + (1−w)·body_tf) · idf / tf_max(doc)`. The
    /// per-document sum is then divided by the document length. Query terms
    /// the index has never seen contribute nothing, and documents without
    /// any query-term posting get no entry at all.
    pub fn compute_scores(&self, query: &BTreeSet<TermId>) -> Result<HashMap<DocId, f64>> {
        let total_docs = self.doc_count() as f64;
        let mut sums: HashMap<DocId, f64> = HashMap::new();

        for &term_id in query {
            let df = self.df(term_id)?;
            if df == 0 {
                continue;
            }
            let idf = (total_docs / df as f64).ln();

            let title_postings = self.title.postings(term_id)?;
            let body_postings = self.body.postings(term_id)?;

            // Sorted co-scan over both field lists so each document is
            // visited once with both term frequencies in hand.
            let (mut i, mut j) = (0, 0);
            while i < title_postings.len() || j < body_postings.len() {
                let doc_id = match (title_postings.get(i), body_postings.get(j)) {
                    (Some(t), Some(b)) => t.doc_id.min(b.doc_id),
                    (Some(t), None) => t.doc_id,
                    (None, Some(b)) => b.doc_id,
                    (None, None) => break,
                };

                let mut title_tf = 0u32;
                if title_postings.get(i).map_or(false, |p| p.doc_id == doc_id) {
                    title_tf = title_postings[i].tf();
                    i += 1;
                }
                let mut body_tf = 0u32;
                if body_postings.get(j).map_or(false, |p| p.doc_id == doc_id) {
                    body_tf = body_postings[j].tf();
                    j += 1;
                }

                let tf_max = self.tf_max.get(&doc_id)?.ok_or_else(|| {
                    IndexError::Inconsistent(format!("document {doc_id} has postings but no tf-max"))
                })? as f64;
                let adjusted_tf = self.title_weight * title_tf as f64
                    + (1.0 - self.title_weight) * body_tf as f64;
                *sums.entry(doc_id).or_insert(0.0) += adjusted_tf * idf / tf_max;
            }
        }

        let mut scores = HashMap::with_capacity(sums.len());
        for (doc_id, sum) in sums {
            let length = self.document_length(doc_id)?;
            // A zero-length vector means every term of the document has
            // idf 0; its contributions are all 0 as well, so drop it
            // rather than produce NaN.
            if length > 0.0 {
                scores.insert(doc_id, sum / length);
            }
        }
        Ok(scores)
    }

    /// Cosine-normalization denominator: `sqrt(Σ (tf·idf/tf_max)²)` over
    /// every term the document contains, with raw combined frequencies.
    fn document_length(&self, doc_id: DocId) -> Result<f64> {
        let total_docs = self.doc_count() as f64;
        let tf_max = self.tf_max.get(&doc_id)?.ok_or_else(|| {
            IndexError::Inconsistent(format!("document {doc_id} has postings but no tf-max"))
        })? as f64;

        let mut sum = 0.0;
        for term_id in self.forward_terms(doc_id)? {
            let tf = (self.title.tf(doc_id, term_id)? + self.body.tf(doc_id, term_id)?) as f64;
            let df = self.df(term_id)?;
            if df == 0 {
                return Err(IndexError::Inconsistent(format!(
                    "term {term_id} in document {doc_id} has zero document frequency"
                )));
            }
            let idf = (total_docs / df as f64).ln();
            sum += (tf * idf / tf_max).powi(2);
        }
        Ok(sum.sqrt())
    }

    /// Documents containing the terms consecutively, in order, within a
    /// single field; a match in either field counts. A single-term phrase
    /// reduces to "has a posting for that term". Callers treat an empty
    /// phrase as "no constraint" and must not call this with one; for an
    /// empty input this returns the empty set.
    pub fn documents_with_phrase(&self, phrase: &[TermId]) -> Result<BTreeSet<DocId>> {
        let mut doc_ids = self.title.documents_with_phrase(phrase)?;
        doc_ids.extend(self.body.documents_with_phrase(phrase)?);
        Ok(doc_ids)
    }
}
