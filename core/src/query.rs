use crate::error::Result;
use crate::index::TermIndex;
use crate::postings::PostingsList;
use crate::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTerm {
    pub term: String,
    pub weight: f64,
}

impl QueryTerm {
    pub fn new(term: impl Into<String>, weight: f64) -> Self {
        Self { term: term.into(), weight }
    }
}

/// An ordered list of weighted terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    terms: Vec<QueryTerm>,
}

/// Relevance feedback weights: `alpha` for the original query, `beta` for the judged documents.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackParams {
    pub alpha: f64,
    pub beta: f64,
    pub max_terms: Option<usize>,
}

impl Default for FeedbackParams {
    fn default() -> Self {
        Self { alpha: 0.2, beta: 0.8, max_terms: None }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitespace-separated terms, each with weight 1.
    pub fn parse(text: &str) -> Self {
        Self { terms: text.split_whitespace().map(|t| QueryTerm::new(t, 1.0)).collect() }
    }

    pub fn from_terms(terms: Vec<QueryTerm>) -> Self {
        Self { terms }
    }

    pub fn push(&mut self, term: impl Into<String>, weight: f64) {
        self.terms.push(QueryTerm::new(term, weight));
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Manhattan length: the sum of the weights.
    pub fn length(&self) -> f64 {
        self.terms.iter().map(|t| t.weight).sum()
    }

    /// Number of times `term` occurs in the query.
    pub fn tf(&self, term: &str) -> usize {
        self.terms.iter().filter(|t| t.term == term).count()
    }

    pub fn text(&self) -> String {
        self.terms.iter().map(|t| t.term.as_str()).collect::<Vec<_>>().join(" ")
    }

    /// Re-weights the query from the user's relevance judgements on `results`.
    ///
    /// Original terms keep `alpha * tf * idf`. Every token of every relevant
    /// document adds `beta / |relevant| * idf / docLength` per occurrence. The
    /// term list is replaced by the resulting vocabulary, heaviest first.
    /// Unreadable documents are skipped with a warning.
    pub fn relevance_feedback(
        &mut self,
        results: &PostingsList,
        relevant: &[bool],
        index: &dyn TermIndex,
        tokenizer: &Tokenizer,
        params: FeedbackParams,
    ) -> Result<()> {
        let relevant_docs: Vec<_> = results
            .iter()
            .zip(relevant)
            .filter(|(_, flag)| **flag)
            .map(|(e, _)| e.doc_id)
            .collect();
        if relevant_docs.is_empty() {
            return Ok(());
        }

        let n_docs = index.num_docs() as f64;
        let beta = params.beta / relevant_docs.len() as f64;
        let mut idf_cache: HashMap<String, Option<f64>> = HashMap::new();
        let mut idf = |term: &str| -> Result<Option<f64>> {
            if let Some(v) = idf_cache.get(term) {
                return Ok(*v);
            }
            let df = index.doc_frequency(term)?;
            let v = (df > 0).then(|| (n_docs / df as f64).log10());
            idf_cache.insert(term.to_string(), v);
            Ok(v)
        };

        let mut weights: HashMap<String, f64> = HashMap::new();
        let mut seen = HashSet::new();
        for qt in &self.terms {
            if !seen.insert(qt.term.as_str()) {
                continue;
            }
            if let Some(term_idf) = idf(&qt.term)? {
                weights.insert(qt.term.clone(), params.alpha * self.tf(&qt.term) as f64 * term_idf);
            }
        }

        for doc_id in relevant_docs {
            let Some(info) = index.docs().get(doc_id) else { continue };
            let length = f64::from(info.length.max(1));
            let text = match std::fs::read_to_string(&info.path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(doc_id, path = %info.path, error = %e, "cannot read document for relevance feedback");
                    continue;
                }
            };
            for (token, _) in tokenizer.tokenize(&text) {
                if let Some(term_idf) = idf(&token)? {
                    *weights.entry(token).or_insert(0.0) += beta * term_idf / length;
                }
            }
        }

        let mut terms: Vec<QueryTerm> = weights.into_iter().map(|(t, w)| QueryTerm::new(t, w)).collect();
        terms.sort_by(|a, b| {
            b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal).then_with(|| a.term.cmp(&b.term))
        });
        if let Some(max) = params.max_terms {
            terms.truncate(max);
        }
        self.terms = terms;
        Ok(())
    }
}
