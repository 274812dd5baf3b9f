use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::TermIndex;
use crate::kgram::KGramIndex;
use crate::persist::PersistentHashedIndex;
use crate::tokenizer::Tokenizer;
use crate::DocId;
use std::path::Path;
use std::time::Instant;

/// Summary returned by [`IndexBuilder::finish`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildStats {
    pub num_docs: usize,
    pub num_tokens: u64,
    pub kgram_terms: usize,
}

/// Feeds documents through the tokenizer into a term index and a k-gram
/// index. DocIDs are handed out in the order documents are added.
pub struct IndexBuilder<I: TermIndex> {
    index: I,
    kgrams: KGramIndex,
    tokenizer: Tokenizer,
    next_doc: DocId,
    num_tokens: u64,
}

impl IndexBuilder<PersistentHashedIndex> {
    /// A builder writing a fresh persistent index into `cfg.index_dir`.
    pub fn persistent(cfg: &EngineConfig) -> Result<Self> {
        let index = PersistentHashedIndex::create(&cfg.index_dir, cfg)?;
        IndexBuilder::new(index, KGramIndex::new(cfg.kgram_k)?, Tokenizer::new(cfg.tokenizer.clone())?)
    }

    /// Finalizes a persistent build, writing `kgram.bin` next to the index files.
    pub fn finish_persistent(self) -> Result<(PersistentHashedIndex, KGramIndex, BuildStats)> {
        let kgram_path = self.index.paths().kgram();
        self.finish(Some(&kgram_path))
    }
}

impl<I: TermIndex> IndexBuilder<I> {
    pub fn new(index: I, kgrams: KGramIndex, tokenizer: Tokenizer) -> Result<Self> {
        Ok(Self { index, kgrams, tokenizer, next_doc: 0, num_tokens: 0 })
    }

    /// Tokenizes `text` and indexes it under `path`. Returns the new docID.
    pub fn add_document(&mut self, path: &str, text: &str) -> Result<DocId> {
        let doc_id = self.next_doc;
        let tokens = self.tokenizer.tokenize(text);
        let length = tokens.len() as u32;
        for (token, offset) in tokens {
            self.kgrams.insert(&token);
            self.index.insert(&token, doc_id, offset)?;
        }
        self.index.docs_mut().insert(doc_id, path, length);
        self.num_tokens += u64::from(length);
        self.next_doc += 1;
        if self.next_doc % 1000 == 0 {
            tracing::info!(docs = self.next_doc, tokens = self.num_tokens, "indexing progress");
        }
        Ok(doc_id)
    }

    /// Reads a file from disk and indexes it under its path.
    pub fn add_file(&mut self, path: &Path) -> Result<DocId> {
        let text = std::fs::read_to_string(path)?;
        self.add_document(&path.to_string_lossy(), &text)
    }

    pub fn num_docs(&self) -> usize {
        self.next_doc as usize
    }

    /// Finalizes the term index and, if `kgram_path` is given, saves the
    /// k-gram index there.
    pub fn finish(mut self, kgram_path: Option<&Path>) -> Result<(I, KGramIndex, BuildStats)> {
        let started = Instant::now();
        self.index.finalize()?;
        if let Some(path) = kgram_path {
            self.kgrams.save(path)?;
        }
        let stats = BuildStats {
            num_docs: self.num_docs(),
            num_tokens: self.num_tokens,
            kgram_terms: self.kgrams.len(),
        };
        tracing::info!(
            docs = stats.num_docs,
            tokens = stats.num_tokens,
            kgram_terms = stats.kgram_terms,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index finalized"
        );
        Ok((self.index, self.kgrams, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HashedIndex;

    #[test]
    fn assigns_sequential_doc_ids() {
        let mut b = IndexBuilder::new(HashedIndex::new(), KGramIndex::new(2).unwrap(), Tokenizer::default()).unwrap();
        assert_eq!(b.add_document("d/one.txt", "Hello world").unwrap(), 0);
        assert_eq!(b.add_document("d/two.txt", "hello again, world").unwrap(), 1);
        let (index, kgrams, stats) = b.finish(None).unwrap();
        assert_eq!(stats.num_docs, 2);
        assert_eq!(stats.num_tokens, 5);
        assert_eq!(index.docs().length(1), Some(3));
        assert_eq!(index.get_postings("world").unwrap().unwrap().doc_ids(), vec![0, 1]);
        assert!(kgrams.id_by_term("again").is_some());
    }

    #[test]
    fn persistent_build_writes_kgram_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig { index_dir: dir.path().to_path_buf(), table_size: 101, ..Default::default() };
        let mut b = IndexBuilder::persistent(&cfg).unwrap();
        b.add_document("x/a.txt", "wildcard words").unwrap();
        let (index, _, _) = b.finish_persistent().unwrap();
        assert!(index.paths().kgram().exists());
        let reloaded = KGramIndex::load(&index.paths().kgram()).unwrap();
        assert!(reloaded.id_by_term("wildcard").is_some());
    }
}
