use crate::error::{IndexError, Result};
use crate::TermId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Marks the start of a term when forming k-grams.
pub const START_MARKER: char = '^';
/// Marks the end of a term when forming k-grams.
pub const END_MARKER: char = '$';

/// Index from k-grams to the ids of the terms containing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KGramIndex {
    k: usize,
    id2term: Vec<String>,
    term2id: HashMap<String, TermId>,
    /// Each list is sorted by term id and holds an id at most once.
    index: HashMap<String, Vec<TermId>>,
}

impl KGramIndex {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(IndexError::InvalidConfig("k-gram size must be positive".into()));
        }
        Ok(Self { k, id2term: Vec::new(), term2id: HashMap::new(), index: HashMap::new() })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.id2term.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2term.is_empty()
    }

    pub fn insert(&mut self, term: &str) {
        if self.term2id.contains_key(term) {
            return;
        }
        let id = self.id2term.len() as TermId;
        self.id2term.push(term.to_string());
        self.term2id.insert(term.to_string(), id);

        for gram in self.term_kgrams(term) {
            let ids = self.index.entry(gram).or_default();
            // Ids are handed out in increasing order, so a repeat can only be at the tail.
            if ids.last() != Some(&id) {
                ids.push(id);
            }
        }
    }

    pub fn get_postings(&self, kgram: &str) -> Option<&[TermId]> {
        self.index.get(kgram).map(Vec::as_slice)
    }

    pub fn term_by_id(&self, id: TermId) -> Option<&str> {
        self.id2term.get(id as usize).map(String::as_str)
    }

    pub fn id_by_term(&self, term: &str) -> Option<TermId> {
        self.term2id.get(term).copied()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.id2term.iter().map(String::as_str)
    }

    /// Distinct k-grams of `term` padded with the boundary markers.
    pub fn term_kgrams(&self, term: &str) -> Vec<String> {
        let padded: String = std::iter::once(START_MARKER)
            .chain(term.chars())
            .chain(std::iter::once(END_MARKER))
            .collect();
        self.kgrams(&padded)
    }

    fn kgrams(&self, s: &str) -> Vec<String> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < self.k {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        chars
            .windows(self.k)
            .map(|w| w.iter().collect::<String>())
            .filter(|g| seen.insert(g.clone()))
            .collect()
    }

    /// Terms matching a wildcard pattern such as `col*r`, where `*` stands for
    /// any run of non-space characters.
    ///
    /// K-grams of the literal fragments select candidates; each candidate is then
    /// checked against the pattern itself, since sharing k-grams says nothing
    /// about their order.
    pub fn get_wc_tokens(&self, pattern: &str) -> Result<HashSet<String>> {
        let padded = format!("{START_MARKER}{pattern}{END_MARKER}");
        let grams: Vec<String> = padded
            .split('*')
            .filter(|frag| frag.chars().count() >= self.k)
            .flat_map(|frag| self.kgrams(frag))
            .collect();

        let matcher = wildcard_regex(pattern)?;
        let mut result = HashSet::new();
        if grams.is_empty() {
            // Nothing to narrow with; fall back to checking the whole vocabulary.
            result.extend(self.terms().filter(|t| matcher.is_match(t)).map(str::to_string));
            return Ok(result);
        }

        let mut candidates: Option<Vec<TermId>> = None;
        for gram in &grams {
            let postings = self.get_postings(gram).unwrap_or(&[]);
            candidates = Some(match candidates {
                None => postings.to_vec(),
                Some(current) => Self::intersect(&current, postings),
            });
            if candidates.as_ref().is_some_and(Vec::is_empty) {
                return Ok(result);
            }
        }

        for id in candidates.unwrap_or_default() {
            if let Some(term) = self.term_by_id(id) {
                if matcher.is_match(term) {
                    result.insert(term.to_string());
                }
            }
        }
        Ok(result)
    }

    /// Merge-intersection of two id-sorted lists.
    pub fn intersect(p1: &[TermId], p2: &[TermId]) -> Vec<TermId> {
        let mut out = Vec::with_capacity(p1.len().min(p2.len()));
        let (mut i, mut j) = (0, 0);
        while i < p1.len() && j < p2.len() {
            match p1[i].cmp(&p2[j]) {
                Ordering::Equal => {
                    out.push(p1[i]);
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let index: KGramIndex = bincode::deserialize_from(reader)?;
        Ok(index)
    }
}

pub fn is_wildcard(term: &str) -> bool {
    term.contains('*')
}

fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(r"\S*");
    Ok(Regex::new(&format!("^{body}$"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(words: &[&str]) -> KGramIndex {
        let mut idx = KGramIndex::new(3).unwrap();
        for w in words {
            idx.insert(w);
        }
        idx
    }

    fn sorted(set: HashSet<String>) -> Vec<String> {
        let mut v: Vec<String> = set.into_iter().collect();
        v.sort();
        v
    }

    #[test]
    fn ids_are_sequential_and_stable() {
        let idx = index(&["color", "colour", "color"]);
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.id_by_term("colour"), Some(1));
        assert_eq!(idx.term_by_id(0), Some("color"));
    }

    #[test]
    fn repeated_kgram_is_listed_once() {
        let idx = index(&["banana"]);
        assert_eq!(idx.get_postings("ana"), Some(&[0][..]));
        assert_eq!(idx.get_postings("^ba"), Some(&[0][..]));
        assert_eq!(idx.get_postings("na$"), Some(&[0][..]));
    }

    #[test]
    fn wildcard_checks_fragment_order() {
        let idx = index(&["color", "colour", "colder"]);
        assert_eq!(sorted(idx.get_wc_tokens("colo*r").unwrap()), vec!["color", "colour"]);
        // Every vocabulary word starts with "col" and ends with "r".
        assert_eq!(sorted(idx.get_wc_tokens("col*r").unwrap()), vec!["colder", "color", "colour"]);
    }

    #[test]
    fn wildcard_rejects_shared_kgrams_in_wrong_order() {
        // "redder" holds both "der" and "red", but "red" comes first.
        let idx = index(&["redder", "derived"]);
        assert!(idx.get_wc_tokens("*der*red*").unwrap().is_empty());
        assert_eq!(sorted(idx.get_wc_tokens("*red*der*").unwrap()), vec!["redder"]);
    }

    #[test]
    fn wildcard_without_usable_fragment_scans_vocabulary() {
        let idx = index(&["ox", "ax", "box"]);
        assert_eq!(sorted(idx.get_wc_tokens("*x").unwrap()), vec!["ax", "box", "ox"]);
    }

    #[test]
    fn wildcard_with_unknown_kgram_is_empty() {
        let idx = index(&["color"]);
        assert!(idx.get_wc_tokens("zzz*").unwrap().is_empty());
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let idx = index(&["a.b", "axb"]);
        assert_eq!(sorted(idx.get_wc_tokens("a.*").unwrap()), vec!["a.b"]);
    }

    #[test]
    fn intersect_sorted_ids() {
        assert_eq!(KGramIndex::intersect(&[1, 3, 5, 8], &[2, 3, 8, 9]), vec![3, 8]);
    }

    #[test]
    fn zero_k_is_rejected() {
        assert!(KGramIndex::new(0).is_err());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kgram.bin");
        index(&["color", "colour"]).save(&path).unwrap();
        let back = KGramIndex::load(&path).unwrap();
        assert_eq!(back.k(), 3);
        assert_eq!(back.id_by_term("colour"), Some(1));
    }
}
