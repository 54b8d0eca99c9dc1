use orbweaver_core::dictionary::IdDictionary;
use orbweaver_core::links::LinkGraph;
use orbweaver_core::postings::{Field, PostingIndex};
use orbweaver_core::store::Store;
use orbweaver_core::{DocId, TermId};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn open_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

fn docs(ids: &[DocId]) -> BTreeSet<DocId> {
    ids.iter().copied().collect()
}

/// The three-document corpus the scoring and phrase scenarios run against:
/// doc1 title `[w1, w1, w2, w3]` with no body, doc2 body `[w4, w4, w5, w6]`
/// with no title, doc3 title `[w7, w8, w9]` and body `[w10, w11, w12]`,
/// where `wN` is term ID N.
fn build_scenario(index: &PostingIndex) {
    index.add_document(1, &[1, 1, 2, 3], &[]).unwrap();
    index.add_document(2, &[], &[4, 4, 5, 6]).unwrap();
    index.add_document(3, &[7, 8, 9], &[10, 11, 12]).unwrap();
}

#[test]
fn dictionary_ids_are_idempotent_and_distinct() {
    let (_dir, store) = open_store();
    let dict = IdDictionary::open(&store, "term-to-id", "id-to-term").unwrap();

    let first = dict.get_or_create_id("alpha").unwrap();
    let second = dict.get_or_create_id("beta").unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_ne!(first, second);

    assert_eq!(dict.get_or_create_id("alpha").unwrap(), first);
    assert_eq!(dict.get_or_create_id("beta").unwrap(), second);
    assert_eq!(dict.key(first).unwrap().as_deref(), Some("alpha"));
    assert_eq!(dict.id("beta").unwrap(), Some(second));
    assert_eq!(dict.key(99).unwrap(), None);
    assert_eq!(dict.len().unwrap(), 2);
}

#[test]
fn dictionary_rejects_empty_keys() {
    let (_dir, store) = open_store();
    let dict = IdDictionary::open(&store, "term-to-id", "id-to-term").unwrap();
    assert!(dict.get_or_create_id("").is_err());
}

#[test]
fn removal_round_trips_to_pre_add_state() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();

    index.add_document(1, &[1, 2], &[2, 3]).unwrap();
    let df_before: Vec<u32> = (1..=3).map(|t| index.df(t).unwrap()).collect();

    // doc2 shares terms 2 and 3 and introduces term 4.
    index.add_document(2, &[2], &[3, 4, 4]).unwrap();
    assert_eq!(index.df(2).unwrap(), 2);
    assert_eq!(index.df(4).unwrap(), 1);

    index.remove_document(2).unwrap();

    assert!(index.forward_terms(2).unwrap().is_empty());
    assert_eq!(index.tf_max(2).unwrap(), None);
    let df_after: Vec<u32> = (1..=3).map(|t| index.df(t).unwrap()).collect();
    assert_eq!(df_before, df_after);
    assert_eq!(index.df(4).unwrap(), 0);
}

#[test]
fn remove_unknown_document_is_a_noop() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();

    index.add_document(1, &[1], &[2]).unwrap();
    index.remove_document(7).unwrap();
    index.remove_document(7).unwrap();

    assert_eq!(index.df(1).unwrap(), 1);
    assert_eq!(index.df(2).unwrap(), 1);
    assert_eq!(index.doc_count(), 1);
}

/// DF must equal the number of distinct documents with a non-empty posting
/// in either field, after any add/remove sequence.
#[test]
fn df_matches_distinct_documents_after_mutation() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();

    index.add_document(1, &[1, 2], &[1, 3]).unwrap();
    index.add_document(2, &[1], &[3, 4]).unwrap();
    index.add_document(3, &[], &[1, 4, 4]).unwrap();
    index.remove_document(2).unwrap();
    index.add_document(2, &[4], &[2]).unwrap();
    index.remove_document(1).unwrap();

    for term_id in 1..=4u32 {
        let mut expected: BTreeSet<DocId> = index
            .postings(term_id, Field::Title)
            .unwrap()
            .iter()
            .map(|p| p.doc_id)
            .collect();
        expected.extend(
            index
                .postings(term_id, Field::Body)
                .unwrap()
                .iter()
                .map(|p| p.doc_id),
        );
        assert_eq!(
            index.df(term_id).unwrap() as usize,
            expected.len(),
            "df mismatch for term {term_id}"
        );
    }
}

/// TFMax must equal the max combined (title + body) frequency over the
/// document's terms.
#[test]
fn tf_max_matches_max_combined_frequency() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();

    index.add_document(1, &[1, 1, 2], &[1, 2, 2, 3]).unwrap();
    index.add_document(2, &[4], &[4, 4, 4, 5]).unwrap();

    for doc_id in [1, 2] {
        let expected = index
            .forward_terms(doc_id)
            .unwrap()
            .into_iter()
            .map(|term_id| {
                let tf = |field| {
                    index
                        .postings(term_id, field)
                        .unwrap()
                        .iter()
                        .find(|p| p.doc_id == doc_id)
                        .map_or(0, |p| p.tf())
                };
                tf(Field::Title) + tf(Field::Body)
            })
            .max()
            .unwrap();
        assert_eq!(index.tf_max(doc_id).unwrap(), Some(expected));
    }
    // doc1: term 1 appears twice in title and once in body.
    assert_eq!(index.tf_max(1).unwrap(), Some(3));
    assert_eq!(index.tf_max(2).unwrap(), Some(4));
}

#[test]
fn scoring_matches_reference_values() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();
    build_scenario(&index);

    let query: BTreeSet<TermId> = [1, 4, 7, 10].into_iter().collect();
    let scores = index.compute_scores(&query).unwrap();

    // With title weight 0.9 every query term has df 1 and idf ln 3, and the
    // idf cancels against the length term, leaving:
    //   doc1: 0.9·2 / sqrt(2² + 1² + 1²)         = 1.8 / sqrt(6)
    //   doc2: 0.1·2 / sqrt(2² + 1² + 1²)         = 0.2 / sqrt(6)
    //   doc3: (0.9 + 0.1) / sqrt(6·1²)           = 1.0 / sqrt(6)
    let sqrt6 = 6.0f64.sqrt();
    assert!((scores[&1] - 1.8 / sqrt6).abs() < 1e-9);
    assert!((scores[&2] - 0.2 / sqrt6).abs() < 1e-9);
    assert!((scores[&3] - 1.0 / sqrt6).abs() < 1e-9);
    assert_eq!(scores.len(), 3);
}

#[test]
fn scoring_skips_unseen_terms_and_unmatched_documents() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();
    build_scenario(&index);

    // Term 99 was never indexed; doc2 and doc3 contain no query term.
    let query: BTreeSet<TermId> = [1, 99].into_iter().collect();
    let scores = index.compute_scores(&query).unwrap();
    assert_eq!(scores.keys().copied().collect::<Vec<_>>(), vec![1]);

    let none = index.compute_scores(&BTreeSet::new()).unwrap();
    assert!(none.is_empty());
}

#[test]
fn phrase_single_term_reduces_to_has_posting() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();
    build_scenario(&index);

    for term_id in 1..=3u32 {
        let expected: BTreeSet<DocId> = {
            let mut set: BTreeSet<DocId> = index
                .postings(term_id, Field::Title)
                .unwrap()
                .iter()
                .map(|p| p.doc_id)
                .collect();
            set.extend(
                index
                    .postings(term_id, Field::Body)
                    .unwrap()
                    .iter()
                    .map(|p| p.doc_id),
            );
            set
        };
        assert_eq!(index.documents_with_phrase(&[term_id]).unwrap(), expected);
    }
}

#[test]
fn phrase_merge_respects_order_and_adjacency() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();
    build_scenario(&index);

    // doc1 title: w1 at {0, 1}, w2 at {2}, w3 at {3}.
    assert_eq!(index.documents_with_phrase(&[1, 1]).unwrap(), docs(&[1]));
    assert_eq!(index.documents_with_phrase(&[2, 3]).unwrap(), docs(&[1]));
    assert_eq!(index.documents_with_phrase(&[1, 2, 3]).unwrap(), docs(&[1]));
    assert_eq!(index.documents_with_phrase(&[1, 1, 2, 3]).unwrap(), docs(&[1]));
    // Wrong order never matches.
    assert_eq!(index.documents_with_phrase(&[3, 2]).unwrap(), docs(&[]));
    // Adjacency does not cross the title/body boundary: doc3 has w9 last in
    // the title and w10 first in the body.
    assert_eq!(index.documents_with_phrase(&[9, 10]).unwrap(), docs(&[]));
    // Body-side phrases match too.
    assert_eq!(index.documents_with_phrase(&[4, 4, 5]).unwrap(), docs(&[2]));
    assert_eq!(index.documents_with_phrase(&[10, 11, 12]).unwrap(), docs(&[3]));
}

#[test]
fn phrase_with_empty_input_matches_nothing() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();
    build_scenario(&index);
    assert!(index.documents_with_phrase(&[]).unwrap().is_empty());
}

#[test]
fn link_graph_stays_symmetric() {
    let (_dir, store) = open_store();
    let graph = LinkGraph::open(&store).unwrap();

    graph.set_outgoing(1, &docs(&[2, 3])).unwrap();
    graph.set_outgoing(2, &docs(&[3])).unwrap();
    assert_eq!(graph.children(1).unwrap(), docs(&[2, 3]));
    assert_eq!(graph.parents(3).unwrap(), docs(&[1, 2]));
    assert_eq!(graph.parents(2).unwrap(), docs(&[1]));

    // Overwrite: 1 drops 2, keeps 3, gains 4.
    graph.set_outgoing(1, &docs(&[3, 4])).unwrap();
    assert_eq!(graph.parents(2).unwrap(), docs(&[]));
    assert_eq!(graph.parents(3).unwrap(), docs(&[1, 2]));
    assert_eq!(graph.parents(4).unwrap(), docs(&[1]));

    // Self-loop is recorded in both directions.
    graph.set_outgoing(5, &docs(&[5])).unwrap();
    assert_eq!(graph.children(5).unwrap(), docs(&[5]));
    assert_eq!(graph.parents(5).unwrap(), docs(&[5]));

    // Clearing detaches everywhere.
    graph.set_outgoing(1, &docs(&[])).unwrap();
    assert_eq!(graph.children(1).unwrap(), docs(&[]));
    assert_eq!(graph.parents(3).unwrap(), docs(&[2]));
    assert_eq!(graph.parents(4).unwrap(), docs(&[]));

    // Unknown IDs read as empty, not as errors.
    assert_eq!(graph.children(42).unwrap(), docs(&[]));
    assert_eq!(graph.parents(42).unwrap(), docs(&[]));
}

#[test]
fn rejects_zero_ids() {
    let (_dir, store) = open_store();
    let index = PostingIndex::open(&store).unwrap();
    let graph = LinkGraph::open(&store).unwrap();

    assert!(index.add_occurrence(0, 1, 0, Field::Body).is_err());
    assert!(index.add_occurrence(1, 0, 0, Field::Title).is_err());
    assert!(index.add_document(1, &[1, 0], &[]).is_err());
    assert!(graph.set_outgoing(0, &docs(&[1])).is_err());
    assert!(graph.set_outgoing(1, &docs(&[0])).is_err());

    // The rejected calls must not have written anything.
    assert_eq!(index.doc_count(), 0);
    assert_eq!(index.df(1).unwrap(), 0);
    assert_eq!(graph.children(1).unwrap(), docs(&[]));
}
