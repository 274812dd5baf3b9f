//! Query evaluation over a [`TermIndex`].
//!
//! [`Searcher`] expands wildcard terms through the k-gram index, evaluates the
//! query in one of three modes and, when a plain term is unknown, returns
//! spelling suggestions instead of results.

use crate::config::EngineConfig;
use crate::error::{IndexError, Result};
use crate::graph::LinkGraph;
use crate::hits::HitsRanker;
use crate::importance::ImportanceTable;
use crate::index::{DocTable, TermIndex};
use crate::kgram::{is_wildcard, KGramIndex};
use crate::persist::PersistentHashedIndex;
use crate::postings::{intersect, merge, merge_positions, phrase_merge, PostingsEntry, PostingsList};
use crate::query::{FeedbackParams, Query, QueryTerm};
use crate::spelling::SpellChecker;
use crate::tokenizer::Tokenizer;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryType {
    Intersection,
    Phrase,
    #[default]
    Ranked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankingType {
    #[default]
    TfIdf,
    PageRank,
    Combination,
    Hits,
}

impl FromStr for QueryType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "intersection" => Ok(QueryType::Intersection),
            "phrase" => Ok(QueryType::Phrase),
            "ranked" => Ok(QueryType::Ranked),
            other => Err(IndexError::InvalidConfig(format!("unknown query type '{other}'"))),
        }
    }
}

impl FromStr for RankingType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tf-idf" | "tfidf" => Ok(RankingType::TfIdf),
            "pagerank" | "page-rank" => Ok(RankingType::PageRank),
            "combination" => Ok(RankingType::Combination),
            "hits" => Ok(RankingType::Hits),
            other => Err(IndexError::InvalidConfig(format!("unknown ranking type '{other}'"))),
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryType::Intersection => "intersection",
            QueryType::Phrase => "phrase",
            QueryType::Ranked => "ranked",
        })
    }
}

impl fmt::Display for RankingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RankingType::TfIdf => "tf-idf",
            RankingType::PageRank => "pagerank",
            RankingType::Combination => "combination",
            RankingType::Hits => "hits",
        })
    }
}

/// Result of one search. When `unknown_terms` is non-empty the results are
/// empty and `suggestions` holds corrected queries, best first.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub results: PostingsList,
    pub unknown_terms: Vec<String>,
    pub suggestions: Vec<String>,
}

pub struct Searcher {
    index: Box<dyn TermIndex>,
    kgrams: KGramIndex,
    graph: LinkGraph,
    importance: ImportanceTable,
    tokenizer: Tokenizer,
    config: EngineConfig,
}

impl Searcher {
    pub fn new(index: Box<dyn TermIndex>, kgrams: KGramIndex, config: EngineConfig) -> Result<Self> {
        let tokenizer = Tokenizer::new(config.tokenizer.clone())?;
        Ok(Self {
            index,
            kgrams,
            graph: LinkGraph::new(),
            importance: ImportanceTable::new(),
            tokenizer,
            config,
        })
    }

    pub fn with_graph(mut self, graph: LinkGraph) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_importance(mut self, importance: ImportanceTable) -> Self {
        self.importance = importance;
        self
    }

    /// Opens the persistent index in `config.index_dir` together with its
    /// k-gram index, and the link graph and importance scores if configured.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let started = Instant::now();
        let index = PersistentHashedIndex::open(&config.index_dir)?;
        let kgrams = KGramIndex::load(&index.paths().kgram())?;

        let graph = match (&config.links_file, &config.titles_file) {
            (Some(links), Some(titles)) => LinkGraph::load(links, titles),
            _ => LinkGraph::new(),
        };
        let importance = match &config.importance_file {
            Some(path) => ImportanceTable::load(path, index.docs()),
            None => ImportanceTable::new(),
        };

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            num_docs = index.num_docs(),
            kgram_terms = kgrams.len(),
            "searcher ready"
        );
        Ok(Searcher::new(Box::new(index), kgrams, config)?
            .with_graph(graph)
            .with_importance(importance))
    }

    pub fn index(&self) -> &dyn TermIndex {
        self.index.as_ref()
    }

    pub fn docs(&self) -> &DocTable {
        self.index.docs()
    }

    pub fn kgrams(&self) -> &KGramIndex {
        &self.kgrams
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a query from user text, normalizing plain words the same way
    /// documents were tokenized. Wildcard words are only case folded.
    pub fn parse_query(&self, text: &str) -> Query {
        let mut query = Query::new();
        for word in text.split_whitespace() {
            if is_wildcard(word) {
                let word = word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '*'));
                let word = if self.tokenizer.config().case_folding { word.to_lowercase() } else { word.to_string() };
                query.push(word, 1.0);
            } else {
                for (token, _) in self.tokenizer.tokenize(word) {
                    query.push(token, 1.0);
                }
            }
        }
        query
    }

    pub fn search(&self, query: &Query, query_type: QueryType, ranking: RankingType) -> Result<SearchOutcome> {
        let started = Instant::now();
        if query.is_empty() {
            return Ok(SearchOutcome::default());
        }

        let unknown = self.unknown_terms(query)?;
        if !unknown.is_empty() {
            let plain = Query::from_terms(query.terms().iter().filter(|t| !is_wildcard(&t.term)).cloned().collect());
            let suggestions = self.spell_check(&plain, self.config.spelling_limit)?.unwrap_or_default();
            tracing::debug!(unknown = ?unknown, suggestions = suggestions.len(), "query has unknown terms");
            return Ok(SearchOutcome { results: PostingsList::new(), unknown_terms: unknown, suggestions });
        }

        let results = match query_type {
            QueryType::Intersection => self.intersection_query(query)?,
            QueryType::Phrase => self.phrase_query(query)?,
            QueryType::Ranked => match ranking {
                RankingType::Hits => self.hits_query(query)?,
                other => self.ranked_query(query, other)?,
            },
        };
        tracing::debug!(
            query = %query.text(),
            %query_type,
            %ranking,
            hits = results.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "search done"
        );
        Ok(SearchOutcome { results, unknown_terms: Vec::new(), suggestions: Vec::new() })
    }

    /// Corrected phrasings of `query`; see [`SpellChecker::check`].
    pub fn spell_check(&self, query: &Query, limit: usize) -> Result<Option<Vec<String>>> {
        SpellChecker::new(self.index.as_ref(), &self.kgrams).check(query, limit)
    }

    /// Re-weights `query` from judgements on `results` using the configured weights.
    pub fn relevance_feedback(&self, query: &mut Query, results: &PostingsList, relevant: &[bool]) -> Result<()> {
        let params = FeedbackParams {
            alpha: self.config.feedback_alpha,
            beta: self.config.feedback_beta(),
            max_terms: self.config.feedback_max_terms,
        };
        query.relevance_feedback(results, relevant, self.index.as_ref(), &self.tokenizer, params)
    }

    /// Plain terms the index has never seen, in query order without repeats.
    fn unknown_terms(&self, query: &Query) -> Result<Vec<String>> {
        let mut unknown: Vec<String> = Vec::new();
        for qt in query.terms() {
            if is_wildcard(&qt.term) || unknown.contains(&qt.term) {
                continue;
            }
            if self.index.get_postings(&qt.term)?.is_none() {
                unknown.push(qt.term.clone());
            }
        }
        Ok(unknown)
    }

    /// Vocabulary terms matched by a wildcard pattern, sorted.
    fn expand(&self, pattern: &str) -> Result<Vec<String>> {
        let mut terms: Vec<String> = self.kgrams.get_wc_tokens(pattern)?.into_iter().collect();
        terms.sort();
        Ok(terms)
    }

    /// One postings list per query term, combining the alternatives of a
    /// wildcard term with `union`.
    fn term_lists(&self, query: &Query, union: fn(&PostingsList, &PostingsList) -> PostingsList) -> Result<Vec<PostingsList>> {
        let mut lists = Vec::with_capacity(query.len());
        for qt in query.terms() {
            if !is_wildcard(&qt.term) {
                lists.push(self.index.get_postings(&qt.term)?.unwrap_or_default());
                continue;
            }
            let mut combined = PostingsList::new();
            for term in self.expand(&qt.term)? {
                if let Some(p) = self.index.get_postings(&term)? {
                    combined = union(&combined, &p);
                }
            }
            lists.push(combined);
        }
        Ok(lists)
    }

    fn intersection_query(&self, query: &Query) -> Result<PostingsList> {
        let mut lists = self.term_lists(query, merge)?.into_iter();
        let Some(first) = lists.next() else { return Ok(PostingsList::new()) };
        Ok(lists.fold(first, |acc, next| intersect(&acc, &next)))
    }

    fn phrase_query(&self, query: &Query) -> Result<PostingsList> {
        let mut lists = self.term_lists(query, merge_positions)?.into_iter();
        let Some(first) = lists.next() else { return Ok(PostingsList::new()) };
        Ok(lists.fold(first, |acc, next| phrase_merge(&acc, &next)))
    }

    /// Distinct query terms after wildcard expansion, each with the weight
    /// of the query term it came from. The first occurrence wins.
    fn expanded_terms(&self, query: &Query) -> Result<Vec<QueryTerm>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for qt in query.terms() {
            let alternatives = if is_wildcard(&qt.term) { self.expand(&qt.term)? } else { vec![qt.term.clone()] };
            for term in alternatives {
                if seen.insert(term.clone()) {
                    out.push(QueryTerm::new(term, qt.weight));
                }
            }
        }
        Ok(out)
    }

    fn tf_idf_scores(&self, query: &Query) -> Result<BTreeMap<DocId, f64>> {
        let n_docs = self.index.num_docs().max(1) as f64;
        let mut scores: BTreeMap<DocId, f64> = BTreeMap::new();
        for qt in self.expanded_terms(query)? {
            let Some(postings) = self.index.get_postings(&qt.term)? else { continue };
            let idf = (n_docs / postings.len() as f64).log10();
            for entry in &postings {
                *scores.entry(entry.doc_id).or_insert(0.0) += qt.weight * idf * entry.tf() as f64;
            }
        }
        for (doc_id, score) in scores.iter_mut() {
            let length = self.index.docs().length(*doc_id).unwrap_or(1).max(1);
            *score /= f64::from(length);
        }
        Ok(scores)
    }

    fn ranked_query(&self, query: &Query, ranking: RankingType) -> Result<PostingsList> {
        let tf_idf = self.tf_idf_scores(query)?;
        let mut results = PostingsList::from_entries(
            tf_idf
                .into_iter()
                .map(|(doc_id, tf_idf)| {
                    let score = match ranking {
                        RankingType::PageRank => self.importance.score(doc_id),
                        RankingType::Combination => 0.5 * tf_idf + 0.5 * self.importance.score(doc_id),
                        _ => tf_idf,
                    };
                    PostingsEntry::with_score(doc_id, score)
                })
                .collect(),
        );
        results.sort_by_score();
        Ok(results)
    }

    /// Root set: documents matching any term. Base set: the root set plus the
    /// documents its pages link to or are linked from.
    fn hits_query(&self, query: &Query) -> Result<PostingsList> {
        let docs = self.index.docs();
        let mut base: BTreeSet<DocId> = BTreeSet::new();
        for qt in self.expanded_terms(query)? {
            if let Some(postings) = self.index.get_postings(&qt.term)? {
                base.extend(postings.iter().map(|e| e.doc_id));
            }
        }

        let root: Vec<DocId> = base.iter().copied().collect();
        for doc_id in root {
            let Some(node) = docs.get(doc_id).and_then(|d| self.graph.id_by_title(d.name())) else { continue };
            let neighbours = self.graph.out_links(node).iter().chain(self.graph.in_links(node));
            for &other in neighbours {
                if let Some(id) = self.graph.title(other).and_then(|t| docs.id_by_name(t)) {
                    base.insert(id);
                }
            }
        }

        let nodes: Vec<_> = base
            .iter()
            .map(|&doc_id| (doc_id, docs.get(doc_id).and_then(|d| self.graph.id_by_title(d.name()))))
            .collect();
        let graph_nodes: Vec<_> = nodes.iter().filter_map(|(_, n)| *n).collect();
        let scores = HitsRanker::new(self.config.hits_query_iterations).rank(&self.graph, &graph_nodes);

        let mut results = PostingsList::from_entries(
            nodes
                .into_iter()
                .map(|(doc_id, node)| {
                    let score = node.map_or(0.0, |n| 0.5 * scores.hub(n) + 0.5 * scores.authority(n));
                    PostingsEntry::with_score(doc_id, score)
                })
                .collect(),
        );
        results.sort_by_score();
        Ok(results)
    }
}
