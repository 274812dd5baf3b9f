use crate::error::{IndexError, Result};
use crate::postings::PostingsList;
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocInfo {
    pub path: String,
    /// Number of tokens in the document.
    pub length: u32,
}

impl DocInfo {
    /// Last path component; this is how documents are named in the link graph
    /// and the importance table.
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// docID -> (path, length), plus a reverse lookup by file name.
#[derive(Debug, Clone, Default)]
pub struct DocTable {
    docs: BTreeMap<DocId, DocInfo>,
    by_name: HashMap<String, DocId>,
}

impl DocTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, doc_id: DocId, path: impl Into<String>, length: u32) {
        let info = DocInfo { path: path.into(), length };
        self.by_name.insert(info.name().to_string(), doc_id);
        self.docs.insert(doc_id, info);
    }

    pub fn get(&self, doc_id: DocId) -> Option<&DocInfo> {
        self.docs.get(&doc_id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<DocId> {
        self.by_name.get(name).copied()
    }

    pub fn length(&self, doc_id: DocId) -> Option<u32> {
        self.docs.get(&doc_id).map(|d| d.length)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &DocInfo)> {
        self.docs.iter().map(|(id, info)| (*id, info))
    }

    /// Writes one `docID;path;length` line per document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        for (id, info) in &self.docs {
            writeln!(w, "{};{};{}", id, info.path, info.length)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut table = DocTable::new();
        let reader = BufReader::new(File::open(path)?);
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // Paths may contain ';', so the id is taken from the front and the length from the back.
            let malformed = || IndexError::Malformed(format!("docInfo line {}: {line:?}", n + 1));
            let (id, rest) = line.split_once(';').ok_or_else(malformed)?;
            let (doc_path, length) = rest.rsplit_once(';').ok_or_else(malformed)?;
            let id = id.parse::<DocId>().map_err(|_| malformed())?;
            let length = length.parse::<u32>().map_err(|_| malformed())?;
            table.insert(id, doc_path, length);
        }
        Ok(table)
    }
}

/// The inverted index capability shared by the in-memory and on-disk variants.
pub trait TermIndex: Send + Sync {
    /// Records `term` at `offset` in `doc_id`. DocIDs must be non-decreasing over a build.
    fn insert(&mut self, term: &str, doc_id: DocId, offset: u32) -> Result<()>;

    /// `Ok(None)` means the term is unknown; a known term always has at least one posting.
    fn get_postings(&self, term: &str) -> Result<Option<PostingsList>>;

    /// Ends the build. No inserts are accepted afterwards.
    fn finalize(&mut self) -> Result<()>;

    fn docs(&self) -> &DocTable;

    fn docs_mut(&mut self) -> &mut DocTable;

    /// Document frequency of `term`, 0 when unknown.
    fn doc_frequency(&self, term: &str) -> Result<usize> {
        Ok(self.get_postings(term)?.map_or(0, |p| p.len()))
    }

    fn num_docs(&self) -> usize {
        self.docs().len()
    }
}

/// Term index held entirely in memory.
#[derive(Debug, Default)]
pub struct HashedIndex {
    index: HashMap<String, PostingsList>,
    docs: DocTable,
    finalized: bool,
}

impl HashedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_terms(&self) -> usize {
        self.index.len()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}

impl TermIndex for HashedIndex {
    fn insert(&mut self, term: &str, doc_id: DocId, offset: u32) -> Result<()> {
        if self.finalized {
            return Err(IndexError::Finalized);
        }
        match self.index.get_mut(term) {
            Some(list) => list.add(doc_id, offset),
            None => {
                let mut list = PostingsList::new();
                list.add(doc_id, offset);
                self.index.insert(term.to_string(), list);
            }
        }
        Ok(())
    }

    fn get_postings(&self, term: &str) -> Result<Option<PostingsList>> {
        Ok(self.index.get(term).cloned())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finalized = true;
        tracing::info!(num_terms = self.index.len(), num_docs = self.docs.len(), "in-memory index ready");
        Ok(())
    }

    fn docs(&self) -> &DocTable {
        &self.docs
    }

    fn docs_mut(&mut self) -> &mut DocTable {
        &mut self.docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_term_is_none() {
        let idx = HashedIndex::new();
        assert!(idx.get_postings("nothing").unwrap().is_none());
    }

    #[test]
    fn insert_groups_offsets_by_doc() {
        let mut idx = HashedIndex::new();
        idx.insert("wiki", 0, 1).unwrap();
        idx.insert("wiki", 0, 5).unwrap();
        idx.insert("wiki", 3, 2).unwrap();
        let p = idx.get_postings("wiki").unwrap().unwrap();
        assert_eq!(p.doc_ids(), vec![0, 3]);
        assert_eq!(p.get(0).unwrap().positions, vec![1, 5]);
        assert_eq!(idx.doc_frequency("wiki").unwrap(), 2);
    }

    #[test]
    fn inserts_after_finalize_are_rejected() {
        let mut idx = HashedIndex::new();
        idx.finalize().unwrap();
        assert!(matches!(idx.insert("a", 0, 0), Err(IndexError::Finalized)));
    }

    #[test]
    fn doc_table_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docInfo");
        let mut table = DocTable::new();
        table.insert(0, "corpus/Anteater.f", 120);
        table.insert(1, "corpus/odd;name.f", 7);
        table.save(&path).unwrap();

        let back = DocTable::load(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.get(1).unwrap().path, "corpus/odd;name.f");
        assert_eq!(back.id_by_name("Anteater.f"), Some(0));
        assert_eq!(back.length(0), Some(120));
    }

    #[test]
    fn file_name_handles_both_separators() {
        assert_eq!(file_name("a/b/c.f"), "c.f");
        assert_eq!(file_name("a\\b\\c.f"), "c.f");
        assert_eq!(file_name("c.f"), "c.f");
    }
}
