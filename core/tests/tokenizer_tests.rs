use orbweaver_core::tokenizer::{normalize, tokenize};

#[test]
fn it_normalizes_and_stems() {
    let toks = tokenize("Running Runners RUN! Ｆｕｌｌｗｉｄｔｈ menu.");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    // Stemming to "run" should appear
    assert!(words.contains(&"run".to_string()));
    // NFKC folds fullwidth letters to ASCII
    assert!(words.contains(&"fullwidth".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let toks = tokenize("The quick brown fox and the lazy dog");
    let words: Vec<String> = toks.into_iter().map(|(w, _)| w).collect();
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
}

#[test]
fn single_token_normalization_matches_tokenize() {
    assert_eq!(normalize("Crawling"), Some("crawl".to_string()));
    assert_eq!(normalize("the"), None);
    assert_eq!(normalize("!!"), None);
}
