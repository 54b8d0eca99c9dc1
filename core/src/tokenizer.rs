use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
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

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Extracts raw word tokens in document order, without normalization. The
/// caller decides which tokens survive and therefore which consume position
/// slots.
pub fn raw_tokens(text: &str) -> Vec<String> {
    RE.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Normalizes a single raw token: NFKC fold, lowercase, stopword removal,
/// stemming. `None` means the token is discarded.
pub fn normalize(raw: &str) -> Option<String> {
    let folded = raw.nfkc().collect::<String>().to_lowercase();
    let token = RE.find(&folded)?.as_str();
    if is_stopword(token) {
        return None;
    }
    let stem = STEMMER.stem(token).to_string();
    if stem.is_empty() {
        return None;
    }
    Some(stem)
}

/// Tokenizes text into (term, position). Positions index kept tokens only:
/// a discarded token does not advance the position counter.
pub fn tokenize(text: &str) -> Vec<(String, usize)> {
    raw_tokens(text)
        .into_iter()
        .filter_map(|raw| normalize(&raw))
        .enumerate()
        .map(|(pos, term)| (term, pos))
        .collect()
}
