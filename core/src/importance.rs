use crate::index::DocTable;
use crate::DocId;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Precomputed document importance (e.g. PageRank), keyed by docID.
#[derive(Debug, Clone, Default)]
pub struct ImportanceTable {
    scores: HashMap<DocId, f64>,
}

impl ImportanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `docName;score` lines, resolving names through `docs`. Unknown
    /// names and malformed lines are skipped; an unreadable file gives an empty table.
    pub fn load(path: &Path, docs: &DocTable) -> Self {
        let mut table = ImportanceTable::new();
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "cannot read importance file");
                return table;
            }
        };
        let mut unknown = 0usize;
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "importance file read aborted");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let parsed = line
                .rsplit_once(';')
                .and_then(|(name, score)| score.trim().parse::<f64>().ok().map(|s| (name.trim(), s)));
            match parsed {
                Some((name, score)) => match docs.id_by_name(name) {
                    Some(id) => table.insert(id, score),
                    None => unknown += 1,
                },
                None => tracing::warn!(file = %path.display(), line = n + 1, "malformed importance line"),
            }
        }
        tracing::info!(entries = table.len(), unknown, "importance scores loaded");
        table
    }

    pub fn insert(&mut self, doc_id: DocId, score: f64) {
        self.scores.insert(doc_id, score);
    }

    /// The stored score, or 0 for documents without one.
    pub fn score(&self, doc_id: DocId) -> f64 {
        self.scores.get(&doc_id).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_names_to_doc_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pagerank");
        std::fs::write(&path, "Alpha.f;0.25\nGhost.f;0.5\nbroken\nBeta.f;0.1\n").unwrap();
        let mut docs = DocTable::new();
        docs.insert(0, "c/Alpha.f", 3);
        docs.insert(1, "c/Beta.f", 3);

        let t = ImportanceTable::load(&path, &docs);
        assert_eq!(t.len(), 2);
        assert_eq!(t.score(0), 0.25);
        assert_eq!(t.score(1), 0.1);
        assert_eq!(t.score(9), 0.0);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImportanceTable::load(&dir.path().join("none"), &DocTable::new()).is_empty());
    }
}
