use searchcore::tokenizer::{tokenize, Tokenizer, TokenizerConfig};

fn words(toks: Vec<(String, u32)>) -> Vec<String> {
    toks.into_iter().map(|(w, _)| w).collect()
}

#[test]
fn it_folds_case_and_keeps_offsets() {
    let toks = tokenize("Running Runners RUN!");
    assert_eq!(
        toks,
        vec![("running".to_string(), 0), ("runners".to_string(), 1), ("run".to_string(), 2)]
    );
}

#[test]
fn it_normalizes_and_stems_when_enabled() {
    let cfg = TokenizerConfig { stem: true, remove_diacritics: true, ..Default::default() };
    let tok = Tokenizer::new(cfg).unwrap();
    let words = words(tok.tokenize("Running Runners RUN! The café's menu."));
    assert!(words.contains(&"run".to_string()));
    assert!(!words.iter().any(|w| w.contains('é')));
}

#[test]
fn it_filters_stopwords_when_enabled() {
    let cfg = TokenizerConfig { remove_stopwords: true, ..Default::default() };
    let tok = Tokenizer::new(cfg).unwrap();
    let toks = tok.tokenize("The quick brown fox and the lazy dog");
    let kept = words(toks.clone());
    assert!(!kept.contains(&"the".to_string()));
    assert!(!kept.contains(&"and".to_string()));
    // dropped words still take up an offset
    assert_eq!(toks.first(), Some(&("quick".to_string(), 1)));
}

#[test]
fn it_keeps_stopwords_by_default() {
    let kept = words(tokenize("The quick brown fox"));
    assert_eq!(kept, vec!["the", "quick", "brown", "fox"]);
}

#[test]
fn it_keeps_special_patterns_whole() {
    let dir = tempfile::tempdir().unwrap();
    let patterns = dir.path().join("patterns.txt");
    std::fs::write(&patterns, "// e-mail addresses\n[a-z0-9.]+@[a-z0-9.]+\n").unwrap();
    let cfg = TokenizerConfig { patterns_file: Some(patterns), ..Default::default() };
    let tok = Tokenizer::new(cfg).unwrap();
    let kept = words(tok.tokenize("Mail john.doe@kth.se today"));
    assert_eq!(kept, vec!["mail", "john.doe@kth.se", "today"]);
}
