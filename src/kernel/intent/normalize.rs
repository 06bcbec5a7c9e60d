/// Multi-word phrases folded into one canonical token before matching.
/// Order matters: longer phrases first.
const SYNONYMS: &[(&str, &str)] = &[
    ("shut down", "shutdown"),
    ("power off", "shutdown"),
    ("switch off", "turn off"),
    ("switch on", "turn on"),
    ("log off", "logoff"),
    ("log out", "logoff"),
    ("sign out", "logoff"),
    ("look up", "lookup"),
    ("web browser", "browser"),
    ("whats", "what is"),
    ("wheres", "where is"),
    ("whos", "who is"),
    ("thats", "that is"),
];

/// Characters kept when they sit inside a token (`report.pdf`, `my-notes_v2`).
const INTERIOR: &[char] = &['.', '-', '_'];

/// Lowercase, strip punctuation, collapse whitespace, canonicalize synonyms.
///
/// Punctuation at the edges of a token is dropped; `.`, `-` and `_` survive when they
/// sit between other characters so file names come through intact.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let tokens: Vec<String> = lowered
        .split_whitespace()
        .map(clean_token)
        .filter(|t| !t.is_empty())
        .collect();

    let mut joined = tokens.join(" ");
    for (phrase, canonical) in SYNONYMS {
        joined = replace_phrase(&joined, phrase, canonical);
    }
    joined
}

fn clean_token(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .chars()
        .filter(|c| c.is_alphanumeric() || INTERIOR.contains(c))
        .collect()
}

/// Word-boundary phrase replacement on already-normalized text. Every occurrence
/// is replaced, including back-to-back repeats.
fn replace_phrase(text: &str, phrase: &str, canonical: &str) -> String {
    let words: Vec<&str> = text.split(' ').collect();
    let needle: Vec<&str> = phrase.split(' ').collect();
    let mut out = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        if words[i..].starts_with(&needle) {
            out.push(canonical);
            i += needle.len();
        } else {
            out.push(words[i]);
            i += 1;
        }
    }
    out.join(" ")
}

/// Byte offset of `phrase` in normalized `text`, matching whole words only.
pub fn find_phrase(text: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    let padded = format!(" {text} ");
    padded.find(&format!(" {phrase} "))
}

pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    find_phrase(text, phrase).is_some()
}

/// Whole-word prefix match: "yes please" starts with "yes", "yesterday" does not.
pub fn starts_with_phrase(text: &str, phrase: &str) -> bool {
    text == phrase || text.starts_with(&format!("{phrase} "))
}
