use crate::error::{IndexError, Result};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One document's occurrences of a term.
///
/// `score` is an accumulator used while ranking; equality only looks at the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingsEntry {
    pub doc_id: DocId,
    pub score: f64,
    /// Token offsets, ascending and unique.
    pub positions: Vec<u32>,
}

impl PostingsEntry {
    pub fn new(doc_id: DocId) -> Self {
        Self { doc_id, score: 0.0, positions: Vec::new() }
    }

    pub fn with_score(doc_id: DocId, score: f64) -> Self {
        Self { doc_id, score, positions: Vec::new() }
    }

    /// Term frequency within the document.
    pub fn tf(&self) -> usize {
        self.positions.len()
    }

    fn push_position(&mut self, offset: u32) {
        if self.positions.last().map_or(true, |&last| offset > last) {
            self.positions.push(offset);
        } else if let Err(at) = self.positions.binary_search(&offset) {
            self.positions.insert(at, offset);
        }
    }

    fn encode(&self, out: &mut String) {
        out.push_str(&self.doc_id.to_string());
        for p in &self.positions {
            out.push(' ');
            out.push_str(&p.to_string());
        }
    }

    fn decode(line: &str) -> Result<Self> {
        let mut parts = line.split(' ').filter(|s| !s.is_empty());
        let doc_id = parts
            .next()
            .ok_or_else(|| IndexError::Malformed("empty postings entry".into()))?
            .parse::<DocId>()
            .map_err(|e| IndexError::Malformed(format!("bad docID in {line:?}: {e}")))?;
        let mut positions = Vec::new();
        for p in parts {
            let p = p
                .parse::<u32>()
                .map_err(|e| IndexError::Malformed(format!("bad offset in {line:?}: {e}")))?;
            positions.push(p);
        }
        Ok(Self { doc_id, score: 0.0, positions })
    }
}

impl PartialEq for PostingsEntry {
    fn eq(&self, other: &Self) -> bool {
        self.doc_id == other.doc_id
    }
}

impl Eq for PostingsEntry {}

/// DocID-ascending, docID-unique list of postings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostingsList {
    entries: Vec<PostingsEntry>,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps entries that are already in the order the caller wants to keep,
    /// e.g. a ranked result.
    pub fn from_entries(entries: Vec<PostingsEntry>) -> Self {
        Self { entries }
    }

    /// Records one occurrence. DocIDs must arrive non-decreasing.
    pub fn add(&mut self, doc_id: DocId, offset: u32) {
        match self.entries.last_mut() {
            Some(last) if last.doc_id == doc_id => last.push_position(offset),
            _ => {
                debug_assert!(self.entries.last().map_or(true, |l| l.doc_id < doc_id));
                let mut entry = PostingsEntry::new(doc_id);
                entry.positions.push(offset);
                self.entries.push(entry);
            }
        }
    }

    pub fn push(&mut self, entry: PostingsEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&PostingsEntry> {
        self.entries.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostingsEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[PostingsEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PostingsEntry> {
        self.entries
    }

    pub fn doc_ids(&self) -> Vec<DocId> {
        self.entries.iter().map(|e| e.doc_id).collect()
    }

    /// Orders by descending score; ties keep docID order so rankings are reproducible.
    pub fn sort_by_score(&mut self) {
        self.entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc_id.cmp(&b.doc_id))
        });
    }

    /// `docID sp pos sp pos ...` per entry, entries joined by newlines.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            e.encode(&mut out);
        }
        out
    }

    pub fn deserialize(s: &str) -> Result<Self> {
        let entries = s
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(PostingsEntry::decode)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a PostingsEntry;
    type IntoIter = std::slice::Iter<'a, PostingsEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Union by docID. On a shared docID the entry from `a` is kept as is.
pub fn merge(a: &PostingsList, b: &PostingsList) -> PostingsList {
    union_with(a, b, |x, _| x.clone())
}

/// Union by docID that also unions the positions of shared documents.
/// Used to fold wildcard alternatives together before a phrase match.
pub fn merge_positions(a: &PostingsList, b: &PostingsList) -> PostingsList {
    union_with(a, b, |x, y| {
        let mut entry = x.clone();
        entry.positions = union_sorted(&x.positions, &y.positions);
        entry
    })
}

/// Entries of `a` whose docID also occurs in `b`.
pub fn intersect(a: &PostingsList, b: &PostingsList) -> PostingsList {
    let (a, b) = (&a.entries, &b.entries);
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Equal => {
                out.push(a[i].clone());
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    PostingsList { entries: out }
}

/// Adjacency join: keeps offsets `q` of `b` for which `a` has `q - 1` in the same document.
///
/// The surviving offsets are those of the right-hand term, so the result can be
/// joined again with the next term of a phrase. Documents left without offsets are dropped.
pub fn phrase_merge(a: &PostingsList, b: &PostingsList) -> PostingsList {
    let (a, b) = (&a.entries, &b.entries);
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Equal => {
                let positions = adjacent_positions(&a[i].positions, &b[j].positions);
                if !positions.is_empty() {
                    out.push(PostingsEntry { doc_id: a[i].doc_id, score: a[i].score, positions });
                }
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    PostingsList { entries: out }
}

fn adjacent_positions(left: &[u32], right: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let want = u64::from(left[i]) + 1;
        let have = u64::from(right[j]);
        match want.cmp(&have) {
            Ordering::Equal => {
                out.push(right[j]);
                i += 1;
                j += 1;
            }
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
        }
    }
    out
}

fn union_with<F>(a: &PostingsList, b: &PostingsList, on_equal: F) -> PostingsList
where
    F: Fn(&PostingsEntry, &PostingsEntry) -> PostingsEntry,
{
    let (a, b) = (&a.entries, &b.entries);
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].doc_id.cmp(&b[j].doc_id) {
            Ordering::Equal => {
                out.push(on_equal(&a[i], &b[j]));
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                out.push(a[i].clone());
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j].clone());
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    PostingsList { entries: out }
}

fn union_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[DocId]) -> PostingsList {
        let mut l = PostingsList::new();
        for &id in ids {
            l.add(id, 0);
        }
        l
    }

    fn positional(doc_id: DocId, positions: &[u32]) -> PostingsList {
        let mut l = PostingsList::new();
        for &p in positions {
            l.add(doc_id, p);
        }
        l
    }

    #[test]
    fn add_appends_to_last_entry() {
        let mut l = PostingsList::new();
        l.add(1, 3);
        l.add(1, 8);
        l.add(4, 0);
        assert_eq!(l.len(), 2);
        assert_eq!(l.get(0).unwrap().positions, vec![3, 8]);
        assert_eq!(l.get(1).unwrap().doc_id, 4);
    }

    #[test]
    fn intersect_keeps_shared_docs() {
        let r = intersect(&list(&[1, 3, 5, 7]), &list(&[2, 3, 5, 9]));
        assert_eq!(r.doc_ids(), vec![3, 5]);
    }

    #[test]
    fn intersect_with_empty_is_empty() {
        assert!(intersect(&list(&[1, 2]), &PostingsList::new()).is_empty());
    }

    #[test]
    fn merge_unions_without_touching_positions() {
        let a = positional(2, &[1, 4]);
        let mut b = positional(2, &[9]);
        b.add(6, 0);
        let r = merge(&list(&[1]), &merge(&a, &b));
        assert_eq!(r.doc_ids(), vec![1, 2, 6]);
        assert_eq!(r.get(1).unwrap().positions, vec![1, 4]);
    }

    #[test]
    fn merge_positions_unions_offsets() {
        let r = merge_positions(&positional(2, &[1, 4]), &positional(2, &[3, 4]));
        assert_eq!(r.get(0).unwrap().positions, vec![1, 3, 4]);
    }

    #[test]
    fn phrase_merge_requires_adjacency() {
        let r = phrase_merge(&positional(10, &[2, 5]), &positional(10, &[3, 9]));
        assert_eq!(r.len(), 1);
        assert_eq!(r.get(0).unwrap().positions, vec![3]);
    }

    #[test]
    fn phrase_merge_drops_docs_without_adjacent_hits() {
        let r = phrase_merge(&positional(4, &[7]), &positional(4, &[2]));
        assert!(r.is_empty());
    }

    #[test]
    fn serialized_form_is_line_per_entry() {
        let mut l = positional(4, &[7, 9]);
        l.add(12, 0);
        assert_eq!(l.serialize(), "4 7 9\n12 0");
        let back = PostingsList::deserialize("4 7 9\n12 0").unwrap();
        assert_eq!(back.get(0).unwrap().positions, vec![7, 9]);
        assert_eq!(back.doc_ids(), vec![4, 12]);
    }

    #[test]
    fn deserialize_rejects_garbage() {
        assert!(matches!(PostingsList::deserialize("x 1"), Err(IndexError::Malformed(_))));
    }

    #[test]
    fn sort_by_score_breaks_ties_by_doc() {
        let mut l = PostingsList::from_entries(vec![
            PostingsEntry::with_score(5, 1.0),
            PostingsEntry::with_score(2, 3.0),
            PostingsEntry::with_score(1, 1.0),
        ]);
        l.sort_by_score();
        assert_eq!(l.doc_ids(), vec![2, 1, 5]);
    }
}
