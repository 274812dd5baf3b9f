//! Inverted index stored as an open-addressed hash table on disk.
//!
//! Two files make up the index. `dictionary` is a fixed array of slots, each
//! holding the (offset, length) of a record in `data`. A record is the term's
//! bytes, one space, then the serialized postings list. Slots never hold the
//! term itself, so a lookup reads the record head to tell colliding terms apart.
//!
//! Terms are buffered in memory during the build and written in one pass by
//! [`TermIndex::finalize`]. After that the files are immutable and any number
//! of read-only handles may be opened on them.

use crate::config::EngineConfig;
use crate::error::{IndexError, Result};
use crate::index::{DocTable, TermIndex};
use crate::postings::PostingsList;
use crate::DocId;
use bit_vec::BitVec;
use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Bytes per dictionary slot: two big-endian u64s.
pub const SLOT_BYTES: u64 = 16;

const META_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u64,
    pub table_size: u64,
    pub probe_skip: u64,
    pub kgram_k: usize,
    pub created_at: String,
    pub version: u32,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn dictionary(&self) -> PathBuf { self.root.join("dictionary") }
    pub fn data(&self) -> PathBuf { self.root.join("data") }
    pub fn doc_info(&self) -> PathBuf { self.root.join("docInfo") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn kgram(&self) -> PathBuf { self.root.join("kgram.bin") }
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

/// Slot count and probe step of the dictionary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableGeometry {
    pub capacity: u64,
    pub skip: u64,
}

impl TableGeometry {
    pub fn new(capacity: u64, skip: u64) -> Result<Self> {
        if capacity == 0 {
            return Err(IndexError::InvalidConfig("table_size must be positive".into()));
        }
        Ok(Self { capacity, skip: skip % capacity })
    }

    pub fn home(&self, term: &str) -> u64 {
        u64::from(crc32fast::hash(term.as_bytes())) % self.capacity
    }

    pub fn next(&self, slot: u64) -> u64 {
        (slot + self.skip) % self.capacity
    }

    /// Distinct slots visited by the probe sequence before it cycles.
    pub fn probe_limit(&self) -> u64 {
        if self.skip == 0 {
            return 1;
        }
        self.capacity / gcd(self.capacity, self.skip)
    }

    fn byte_len(&self) -> u64 {
        self.capacity * SLOT_BYTES
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub struct PersistentHashedIndex {
    paths: IndexPaths,
    geometry: TableGeometry,
    kgram_k: usize,
    dictionary: Mutex<File>,
    data: Mutex<File>,
    buffer: HashMap<String, PostingsList>,
    docs: DocTable,
    finalized: bool,
}

impl PersistentHashedIndex {
    /// Starts a fresh build in `root`, truncating any previous index files.
    pub fn create<P: AsRef<Path>>(root: P, cfg: &EngineConfig) -> Result<Self> {
        let paths = IndexPaths::new(root);
        create_dir_all(&paths.root)?;
        let geometry = TableGeometry::new(cfg.table_size, cfg.probe_skip())?;
        let open = |p: PathBuf| {
            OpenOptions::new().read(true).write(true).create(true).truncate(true).open(p)
        };
        let dictionary = open(paths.dictionary())?;
        let data = open(paths.data())?;
        Ok(Self {
            paths,
            geometry,
            kgram_k: cfg.kgram_k,
            dictionary: Mutex::new(dictionary),
            data: Mutex::new(data),
            buffer: HashMap::new(),
            docs: DocTable::new(),
            finalized: false,
        })
    }

    /// Opens a finalized index read-only, using the table geometry recorded at build time.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let paths = IndexPaths::new(root);
        let meta = load_meta(&paths)?;
        let geometry = TableGeometry::new(meta.table_size, meta.probe_skip)?;
        let dictionary = File::open(paths.dictionary())?;
        let actual = dictionary.metadata()?.len();
        if actual != geometry.byte_len() {
            return Err(IndexError::Malformed(format!(
                "dictionary is {actual} bytes, expected {} for {} slots",
                geometry.byte_len(),
                geometry.capacity
            )));
        }
        let data = File::open(paths.data())?;
        let docs = DocTable::load(&paths.doc_info())?;
        tracing::info!(root = %paths.root.display(), num_docs = docs.len(), num_terms = meta.num_terms, "opened persistent index");
        Ok(Self {
            paths,
            geometry,
            kgram_k: meta.kgram_k,
            dictionary: Mutex::new(dictionary),
            data: Mutex::new(data),
            buffer: HashMap::new(),
            docs,
            finalized: true,
        })
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    pub fn geometry(&self) -> TableGeometry {
        self.geometry
    }

    pub fn kgram_k(&self) -> usize {
        self.kgram_k
    }

    fn write_index(&mut self) -> Result<MetaFile> {
        let mut terms: Vec<&String> = self.buffer.keys().collect();
        terms.sort();

        let mut occupied = BitVec::from_elem(self.geometry.capacity as usize, false);
        let mut slots = vec![0u8; self.geometry.byte_len() as usize];
        let mut data = BufWriter::new(self.data.get_mut().try_clone()?);
        data.seek(SeekFrom::Start(0))?;

        let mut free: u64 = 0;
        let mut collisions: u64 = 0;
        for (count, term) in terms.iter().enumerate() {
            let mut slot = self.geometry.home(term);
            let mut probes = 1;
            while occupied.get(slot as usize).unwrap_or(false) {
                if probes >= self.geometry.probe_limit() {
                    return Err(IndexError::TableFull { capacity: self.geometry.capacity });
                }
                collisions += 1;
                probes += 1;
                slot = self.geometry.next(slot);
            }
            occupied.set(slot as usize, true);

            let mut record = String::with_capacity(term.len() + 16);
            record.push_str(term);
            record.push(' ');
            record.push_str(&self.buffer[*term].serialize());
            data.write_all(record.as_bytes())?;

            let at = (slot * SLOT_BYTES) as usize;
            BigEndian::write_u64(&mut slots[at..at + 8], free);
            BigEndian::write_u64(&mut slots[at + 8..at + 16], record.len() as u64);
            free += record.len() as u64;

            if (count + 1) % 10_000 == 0 {
                tracing::info!(written = count + 1, "writing dictionary");
            }
        }
        data.flush()?;

        let dictionary = self.dictionary.get_mut();
        dictionary.seek(SeekFrom::Start(0))?;
        dictionary.write_all(&slots)?;
        dictionary.flush()?;

        tracing::info!(num_terms = terms.len(), collisions, data_bytes = free, "index written");
        Ok(MetaFile {
            num_docs: self.docs.len() as u32,
            num_terms: terms.len() as u64,
            table_size: self.geometry.capacity,
            probe_skip: self.geometry.skip,
            kgram_k: self.kgram_k,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            version: META_VERSION,
        })
    }

    fn read_slot(&self, slot: u64) -> Result<(u64, u64)> {
        let mut f = self.dictionary.lock();
        f.seek(SeekFrom::Start(slot * SLOT_BYTES))?;
        let offset = f.read_u64::<BigEndian>()?;
        let len = f.read_u64::<BigEndian>()?;
        Ok((offset, len))
    }

    /// Reads the record at `offset` if it belongs to `term`.
    fn read_record(&self, term: &str, offset: u64, len: u64) -> Result<Option<String>> {
        let head_len = term.len() as u64 + 1;
        if len < head_len {
            return Ok(None);
        }
        let mut f = self.data.lock();
        f.seek(SeekFrom::Start(offset))?;
        let mut head = vec![0u8; head_len as usize];
        f.read_exact(&mut head)?;
        if &head[..term.len()] != term.as_bytes() || head[term.len()] != b' ' {
            return Ok(None);
        }
        let mut body = vec![0u8; (len - head_len) as usize];
        f.read_exact(&mut body)?;
        let body = String::from_utf8(body)
            .map_err(|e| IndexError::Malformed(format!("postings for {term:?} are not UTF-8: {e}")))?;
        Ok(Some(body))
    }

    fn lookup(&self, term: &str) -> Result<Option<PostingsList>> {
        let mut slot = self.geometry.home(term);
        for _ in 0..self.geometry.probe_limit() {
            let (offset, len) = self.read_slot(slot)?;
            if len == 0 {
                return Ok(None);
            }
            if let Some(body) = self.read_record(term, offset, len)? {
                return PostingsList::deserialize(&body).map(Some);
            }
            slot = self.geometry.next(slot);
        }
        tracing::debug!(term, "probe sequence exhausted");
        Ok(None)
    }
}

impl TermIndex for PersistentHashedIndex {
    fn insert(&mut self, term: &str, doc_id: DocId, offset: u32) -> Result<()> {
        if self.finalized {
            return Err(IndexError::Finalized);
        }
        match self.buffer.get_mut(term) {
            Some(list) => list.add(doc_id, offset),
            None => {
                let mut list = PostingsList::new();
                list.add(doc_id, offset);
                self.buffer.insert(term.to_string(), list);
            }
        }
        Ok(())
    }

    fn get_postings(&self, term: &str) -> Result<Option<PostingsList>> {
        if !self.finalized {
            return Ok(self.buffer.get(term).cloned());
        }
        self.lookup(term)
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Err(IndexError::Finalized);
        }
        tracing::info!(unique_terms = self.buffer.len(), "writing index to disk");
        self.docs.save(&self.paths.doc_info())?;
        let meta = self.write_index()?;
        save_meta(&self.paths, &meta)?;
        self.buffer = HashMap::new();
        self.finalized = true;
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
    use tempfile::tempdir;

    fn small_config(table_size: u64) -> EngineConfig {
        EngineConfig { table_size, ..Default::default() }
    }

    #[test]
    fn round_trip_after_reopen() {
        let dir = tempdir().unwrap();
        let mut idx = PersistentHashedIndex::create(dir.path(), &small_config(101)).unwrap();
        idx.docs_mut().insert(4, "docs/wiki.f", 10);
        idx.insert("wiki", 4, 7).unwrap();
        idx.finalize().unwrap();
        drop(idx);

        let idx = PersistentHashedIndex::open(dir.path()).unwrap();
        let p = idx.get_postings("wiki").unwrap().unwrap();
        assert_eq!(p.doc_ids(), vec![4]);
        assert_eq!(p.get(0).unwrap().positions, vec![7]);
        assert!(idx.get_postings("wikipedia").unwrap().is_none());
        assert_eq!(idx.docs().length(4), Some(10));
    }

    #[test]
    fn colliding_terms_are_told_apart() {
        let dir = tempdir().unwrap();
        let mut idx = PersistentHashedIndex::create(dir.path(), &small_config(3)).unwrap();
        for (doc, term) in ["alpha", "beta", "gamma"].iter().enumerate() {
            idx.insert(term, doc as DocId, 0).unwrap();
        }
        idx.finalize().unwrap();

        for (doc, term) in ["alpha", "beta", "gamma"].iter().enumerate() {
            let p = idx.get_postings(term).unwrap().unwrap();
            assert_eq!(p.doc_ids(), vec![doc as DocId], "term {term}");
        }
        assert!(idx.get_postings("delta").unwrap().is_none());
    }

    #[test]
    fn prefix_of_stored_term_is_not_a_match() {
        let dir = tempdir().unwrap();
        let mut idx = PersistentHashedIndex::create(dir.path(), &small_config(1)).unwrap();
        idx.insert("wiki2", 4, 7).unwrap();
        idx.finalize().unwrap();
        assert!(idx.get_postings("wiki").unwrap().is_none());
        assert!(idx.get_postings("wiki2").unwrap().is_some());
    }

    #[test]
    fn overfull_table_reports_table_full() {
        let dir = tempdir().unwrap();
        let mut idx = PersistentHashedIndex::create(dir.path(), &small_config(2)).unwrap();
        for (doc, term) in ["a", "b", "c"].iter().enumerate() {
            idx.insert(term, doc as DocId, 0).unwrap();
        }
        assert!(matches!(idx.finalize(), Err(IndexError::TableFull { capacity: 2 })));
    }

    #[test]
    fn probe_limit_follows_skip_cycle() {
        assert_eq!(TableGeometry::new(10, 4).unwrap().probe_limit(), 5);
        assert_eq!(TableGeometry::new(7, 3).unwrap().probe_limit(), 7);
        assert_eq!(TableGeometry::new(1, 1).unwrap().probe_limit(), 1);
        assert_eq!(TableGeometry::new(5, 5).unwrap().probe_limit(), 1);
    }

    #[test]
    fn reads_before_finalize_come_from_buffer() {
        let dir = tempdir().unwrap();
        let mut idx = PersistentHashedIndex::create(dir.path(), &small_config(11)).unwrap();
        idx.insert("fox", 0, 3).unwrap();
        assert_eq!(idx.get_postings("fox").unwrap().unwrap().doc_ids(), vec![0]);
    }

    #[test]
    fn open_rejects_truncated_dictionary() {
        let dir = tempdir().unwrap();
        let mut idx = PersistentHashedIndex::create(dir.path(), &small_config(11)).unwrap();
        idx.insert("fox", 0, 3).unwrap();
        idx.finalize().unwrap();
        drop(idx);
        let f = OpenOptions::new().write(true).open(dir.path().join("dictionary")).unwrap();
        f.set_len(SLOT_BYTES * 3).unwrap();
        assert!(matches!(PersistentHashedIndex::open(dir.path()), Err(IndexError::Malformed(_))));
    }
}
