use crate::dictionary::IdDictionary;
use crate::error::{IndexError, Result};
use crate::links::LinkGraph;
use crate::metadata::{Metadata, MetadataStore};
use crate::postings::PostingIndex;
use crate::store::Store;
use crate::tokenizer;
use crate::{DocId, TermId};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One fetched page, already split into raw ordered token lists. Tokens are
/// raw: the engine normalizes them and assigns positions to the kept ones.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub title_tokens: Vec<String>,
    pub body_tokens: Vec<String>,
    pub links: BTreeSet<String>,
    pub last_modified: OffsetDateTime,
    pub size_bytes: u64,
}

/// Collaborator boundary for page retrieval. A failed fetch never aborts a
/// crawl; the engine logs it and skips the URL.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> anyhow::Result<FetchedPage>;
}

/// One hydrated search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub score: f64,
    pub title: String,
    pub url: String,
    pub last_modified: OffsetDateTime,
    pub size_bytes: u64,
    /// Term text to combined (title + body) frequency.
    pub keywords: HashMap<String, u32>,
    pub parent_links: BTreeSet<String>,
    pub child_links: BTreeSet<String>,
}

/// The indexing and retrieval engine: dictionaries, metadata, link graph and
/// posting index over one durable store.
pub struct Engine {
    store: Store,
    urls: IdDictionary,
    terms: IdDictionary,
    metadata: MetadataStore,
    links: LinkGraph,
    postings: PostingIndex,
}

impl Engine {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Engine> {
        let store = Store::open(path)?;
        let urls = IdDictionary::open(&store, "url-to-id", "id-to-url")?;
        let terms = IdDictionary::open(&store, "term-to-id", "id-to-term")?;
        let metadata = MetadataStore::open(&store)?;
        let links = LinkGraph::open(&store)?;
        let postings = PostingIndex::open(&store)?;
        Ok(Engine { store, urls, terms, metadata, links, postings })
    }

    /// Flushes all session writes to the backing store. Call on every exit
    /// path; there is no write-ahead log to replay after a crash.
    pub fn commit(&self) -> Result<()> {
        self.store.commit()
    }

    /// Number of documents currently indexed.
    pub fn doc_count(&self) -> usize {
        self.postings.doc_count()
    }

    /// Bounded BFS from `seed`. Every discovered URL is marked visited
    /// exactly once (failures included, so a broken link can't be retried
    /// forever), and a page's links only enter the frontier when the page
    /// itself needed indexing. Stops when the frontier drains or the visited
    /// count reaches `max_pages`.
    pub fn crawl<F: PageFetcher>(&self, seed: &str, max_pages: usize, fetcher: &F) -> Result<()> {
        if max_pages == 0 {
            return Ok(());
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: VecDeque<BTreeSet<String>> = VecDeque::new();

        visited.insert(seed.to_string());
        if let Some(links) = self.index_page(seed, fetcher)? {
            frontier.push_back(links);
        }

        'bfs: while let Some(links) = frontier.pop_front() {
            for link in links {
                if visited.len() >= max_pages {
                    break 'bfs;
                }
                if !visited.insert(link.clone()) {
                    continue;
                }
                if let Some(next) = self.index_page(&link, fetcher)? {
                    frontier.push_back(next);
                }
            }
        }

        tracing::info!(visited = visited.len(), indexed = self.doc_count(), "crawl finished");
        Ok(())
    }

    /// Fetches one page and re-indexes it unless it is fresh. Returns the
    /// page's outgoing links when it was (re)indexed, `None` when it was
    /// skipped (fresh, or the fetch failed).
    pub fn index_page<F: PageFetcher>(
        &self,
        url: &str,
        fetcher: &F,
    ) -> Result<Option<BTreeSet<String>>> {
        let page = match fetcher.fetch(url) {
            Ok(page) => page,
            Err(error) => {
                tracing::warn!(url, %error, "fetch failed, skipping page");
                return Ok(None);
            }
        };

        let doc_id = self.urls.get_or_create_id(url)?;
        if self.metadata.is_fresh(doc_id, page.last_modified)? {
            tracing::debug!(url, doc_id, "document unchanged, skipping");
            return Ok(None);
        }

        // Stale or never indexed: postings are rebuilt from scratch, the
        // other stores overwrite in place. A crash between the removal and
        // the rewrite leaves the document unindexed until the next crawl,
        // never inconsistent.
        self.postings.remove_document(doc_id)?;

        self.metadata.put(
            doc_id,
            &Metadata {
                title: page.title_tokens.join(" "),
                last_modified: page.last_modified,
                size_bytes: page.size_bytes,
            },
        )?;

        let mut children = BTreeSet::new();
        for link in &page.links {
            children.insert(self.urls.get_or_create_id(link)?);
        }
        self.links.set_outgoing(doc_id, &children)?;

        let title_ids = self.term_ids(&page.title_tokens)?;
        let body_ids = self.term_ids(&page.body_tokens)?;
        self.postings.add_document(doc_id, &title_ids, &body_ids)?;

        tracing::info!(url, doc_id, "indexed document");
        Ok(Some(page.links))
    }

    /// Normalizes raw tokens and maps the kept ones through the term
    /// dictionary, in order.
    fn term_ids(&self, raw_tokens: &[String]) -> Result<Vec<TermId>> {
        let mut ids = Vec::with_capacity(raw_tokens.len());
        for raw in raw_tokens {
            if let Some(term) = tokenizer::normalize(raw) {
                ids.push(self.terms.get_or_create_id(&term)?);
            }
        }
        Ok(ids)
    }

    /// Ranked retrieval: scores the normalized query terms, filters by the
    /// phrase when one is given, and hydrates each surviving document.
    ///
    /// Unknown query terms are assigned IDs (harmless: they have no
    /// postings) and yield no hits, never an error. An empty phrase is no
    /// constraint — the keyword result set passes through unfiltered.
    pub fn search(
        &self,
        words: &BTreeSet<String>,
        phrase: &[String],
    ) -> Result<HashMap<DocId, SearchResult>> {
        let mut query_ids = BTreeSet::new();
        for word in words {
            if let Some(term) = tokenizer::normalize(word) {
                query_ids.insert(self.terms.get_or_create_id(&term)?);
            }
        }

        let mut phrase_ids = Vec::with_capacity(phrase.len());
        for word in phrase {
            if let Some(term) = tokenizer::normalize(word) {
                phrase_ids.push(self.terms.get_or_create_id(&term)?);
            }
        }

        let mut scores = self.postings.compute_scores(&query_ids)?;
        if !phrase_ids.is_empty() {
            let matching = self.postings.documents_with_phrase(&phrase_ids)?;
            scores.retain(|doc_id, _| matching.contains(doc_id));
        }

        let mut results = HashMap::with_capacity(scores.len());
        for (doc_id, score) in scores {
            results.insert(doc_id, self.hydrate(doc_id, score)?);
        }
        Ok(results)
    }

    fn hydrate(&self, doc_id: DocId, score: f64) -> Result<SearchResult> {
        let metadata = self.metadata.get(doc_id)?.ok_or_else(|| {
            IndexError::Inconsistent(format!("scored document {doc_id} has no metadata"))
        })?;
        let url = self.urls.key(doc_id)?.ok_or_else(|| {
            IndexError::Inconsistent(format!("scored document {doc_id} has no url"))
        })?;

        let mut keywords = HashMap::new();
        for (term_id, count) in self.postings.keyword_frequencies(doc_id)? {
            let term = self.terms.key(term_id)?.ok_or_else(|| {
                IndexError::Inconsistent(format!("term {term_id} missing from dictionary"))
            })?;
            keywords.insert(term, count);
        }

        Ok(SearchResult {
            score,
            title: metadata.title,
            url,
            last_modified: metadata.last_modified,
            size_bytes: metadata.size_bytes,
            keywords,
            parent_links: self.link_urls(self.links.parents(doc_id)?)?,
            child_links: self.link_urls(self.links.children(doc_id)?)?,
        })
    }

    fn link_urls(&self, doc_ids: BTreeSet<DocId>) -> Result<BTreeSet<String>> {
        doc_ids
            .into_iter()
            .map(|doc_id| {
                self.urls.key(doc_id)?.ok_or_else(|| {
                    IndexError::Inconsistent(format!("linked document {doc_id} has no url"))
                })
            })
            .collect()
    }

    /// Plain-text summary of every indexed document: title, url, timestamp
    /// and size, the most frequent keywords, and child links.
    pub fn spider_report(&self) -> Result<String> {
        const MAX_KEYWORDS: usize = 10;
        const MAX_LINKS: usize = 10;

        let mut report = String::new();
        for (doc_id, metadata) in self.metadata.all()? {
            let url = self.urls.key(doc_id)?.unwrap_or_default();
            let last_modified = metadata
                .last_modified
                .format(&Rfc3339)
                .unwrap_or_else(|_| metadata.last_modified.to_string());

            let _ = writeln!(report, "{}", metadata.title);
            let _ = writeln!(report, "{url}");
            let _ = writeln!(report, "{last_modified}, {}", metadata.size_bytes);

            let mut keywords: Vec<(String, u32)> = Vec::new();
            for (term_id, count) in self.postings.keyword_frequencies(doc_id)? {
                if let Some(term) = self.terms.key(term_id)? {
                    keywords.push((term, count));
                }
            }
            keywords.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (term, count) in keywords.into_iter().take(MAX_KEYWORDS) {
                let _ = write!(report, "{term} {count}; ");
            }
            let _ = writeln!(report);

            for child_url in self
                .link_urls(self.links.children(doc_id)?)?
                .into_iter()
                .take(MAX_LINKS)
            {
                let _ = writeln!(report, "{child_url}");
            }
            let _ = writeln!(report, "--------------------");
        }
        Ok(report)
    }
}
