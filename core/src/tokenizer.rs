use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

const WORD: &str = r"\p{L}[\p{L}\p{N}_']*|\p{N}+";

lazy_static! {
    static ref RE: Regex = Regex::new(WORD).expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Normalization switches. The defaults fold case and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub case_folding: bool,
    pub remove_diacritics: bool,
    pub stem: bool,
    pub remove_stopwords: bool,
    /// One regex per line; text matching any of them becomes a single token.
    pub patterns_file: Option<PathBuf>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            case_folding: true,
            remove_diacritics: false,
            stem: false,
            remove_stopwords: false,
            patterns_file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    config: TokenizerConfig,
    special: Option<Regex>,
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Result<Self> {
        let patterns = match &config.patterns_file {
            Some(path) => {
                let text = fs::read_to_string(path)?;
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with("//"))
                    .map(str::to_string)
                    .collect()
            }
            None => Vec::new(),
        };
        Self::with_patterns(config, &patterns)
    }

    pub fn with_patterns<S: AsRef<str>>(config: TokenizerConfig, patterns: &[S]) -> Result<Self> {
        let special = if patterns.is_empty() {
            None
        } else {
            let alternation = patterns
                .iter()
                .map(|p| format!("(?:{})", p.as_ref()))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!("(?P<special>{alternation})|{WORD}"))?)
        };
        Ok(Self { config, special })
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Splits `text` into `(token, offset)` pairs, offset being the ordinal of
    /// the token in the document. Dropped stopwords still consume an offset.
    pub fn tokenize(&self, text: &str) -> Vec<(String, u32)> {
        let normalized = self.normalize(text);
        let mut tokens = Vec::new();
        match &self.special {
            Some(re) => {
                for (pos, caps) in re.captures_iter(&normalized).enumerate() {
                    let Some(m) = caps.get(0) else { continue };
                    if caps.name("special").is_some() {
                        tokens.push((m.as_str().to_string(), pos as u32));
                    } else if let Some(word) = self.word(m.as_str()) {
                        tokens.push((word, pos as u32));
                    }
                }
            }
            None => {
                for (pos, m) in RE.find_iter(&normalized).enumerate() {
                    if let Some(word) = self.word(m.as_str()) {
                        tokens.push((word, pos as u32));
                    }
                }
            }
        }
        tokens
    }

    fn normalize(&self, text: &str) -> String {
        let s: String = if self.config.remove_diacritics {
            text.nfkd().filter(|c| !is_combining_mark(*c)).collect()
        } else {
            text.nfkc().collect()
        };
        if self.config.case_folding {
            s.to_lowercase()
        } else {
            s
        }
    }

    fn word(&self, token: &str) -> Option<String> {
        if self.config.remove_stopwords && STOPWORDS.contains(token.to_lowercase().as_str()) {
            return None;
        }
        if self.config.stem {
            Some(STEMMER.stem(token).to_string())
        } else {
            Some(token.to_string())
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self { config: TokenizerConfig::default(), special: None }
    }
}

/// Tokenizes with the default configuration.
pub fn tokenize(text: &str) -> Vec<(String, u32)> {
    Tokenizer::default().tokenize(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        let words: Vec<&str> = t.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["running", "runner's", "run"]);
        assert_eq!(t[2].1, 2);
    }

    #[test]
    fn patterns_keep_special_tokens_whole() {
        let tok = Tokenizer::with_patterns(TokenizerConfig::default(), &[r"https?://\S+"]).unwrap();
        let t = tok.tokenize("see http://example.com/a now");
        let words: Vec<&str> = t.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(words, vec!["see", "http://example.com/a", "now"]);
    }

    #[test]
    fn bad_pattern_is_an_error() {
        assert!(Tokenizer::with_patterns(TokenizerConfig::default(), &["("]).is_err());
    }
}
