use crate::error::{IndexError, Result};
use crate::tokenizer::TokenizerConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Slot count of the on-disk dictionary.
pub const DEFAULT_TABLE_SIZE: u64 = 611_953;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub index_dir: PathBuf,
    pub table_size: u64,
    /// Linear probe step; `table_size / 10` when unset.
    pub probe_skip: Option<u64>,
    pub kgram_k: usize,
    pub hits_max_iterations: usize,
    /// Iteration cap used when HITS runs inside an interactive query.
    pub hits_query_iterations: usize,
    /// Weight of the original query in relevance feedback; feedback terms get `1 - alpha`.
    pub feedback_alpha: f64,
    pub feedback_max_terms: Option<usize>,
    pub spelling_limit: usize,
    pub links_file: Option<PathBuf>,
    pub titles_file: Option<PathBuf>,
    pub importance_file: Option<PathBuf>,
    pub tokenizer: TokenizerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./index"),
            table_size: DEFAULT_TABLE_SIZE,
            probe_skip: None,
            kgram_k: 3,
            hits_max_iterations: 1000,
            hits_query_iterations: 10,
            feedback_alpha: 0.2,
            feedback_max_terms: None,
            spelling_limit: 10,
            links_file: None,
            titles_file: None,
            importance_file: None,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let cfg: EngineConfig = serde_json::from_reader(reader)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_size == 0 {
            return Err(IndexError::InvalidConfig("table_size must be positive".into()));
        }
        if self.kgram_k == 0 {
            return Err(IndexError::InvalidConfig("kgram_k must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.feedback_alpha) {
            return Err(IndexError::InvalidConfig(format!(
                "feedback_alpha must lie in [0, 1], got {}",
                self.feedback_alpha
            )));
        }
        Ok(())
    }

    pub fn probe_skip(&self) -> u64 {
        self.probe_skip.unwrap_or(self.table_size / 10).max(1)
    }

    pub fn feedback_beta(&self) -> f64 {
        1.0 - self.feedback_alpha
    }
}
