//
// reference/stem.rs
//
// Suffix-stripping stemmer used by the word-stem canonicalization policy.
// Small and lossy: it only has to map morphological variants
// of the same title onto one key, not produce dictionary words.
//

/// Minimum number of characters left after stripping a suffix
const MIN_STEM_LEN: usize = 3;

/// Stem every word of `text`, lowercased, joined by single spaces.
///
/// Words are split on whitespace, `-` and `_`, so `Linked-Notes` and
/// `linking notes` produce the same stem.
pub fn stem_phrase(text: &str) -> String {
    text.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| stem_word(&w.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stem a single lowercase word.
pub fn stem_word(word: &str) -> String {
    if word.chars().count() <= MIN_STEM_LEN || !word.chars().all(char::is_alphanumeric) {
        return word.to_string();
    }

    let mut stem = strip_suffix(word);
    if stem.len() > MIN_STEM_LEN && stem.ends_with('e') {
        stem.pop();
    }
    stem
}

fn strip_suffix(word: &str) -> String {
    if let Some(base) = word.strip_suffix("ies") {
        if base.len() >= MIN_STEM_LEN - 1 {
            return format!("{base}y");
        }
    }
    if let Some(base) = word.strip_suffix("sses") {
        return format!("{base}ss");
    }
    for suffix in ["ness", "ment", "ity", "ly"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.len() >= MIN_STEM_LEN {
                return base.to_string();
            }
        }
    }
    for suffix in ["ing", "ed"] {
        if let Some(base) = word.strip_suffix(suffix) {
            if base.len() >= MIN_STEM_LEN && has_vowel(base) {
                return undouble(base);
            }
        }
    }
    if let Some(base) = word.strip_suffix("es") {
        if ["s", "x", "z", "ch", "sh"].iter().any(|s| base.ends_with(s)) {
            return base.to_string();
        }
    }
    if let Some(base) = word.strip_suffix('s') {
        let keeps = base.ends_with('s') || base.ends_with('u') || base.ends_with('i');
        if !keeps && base.len() >= MIN_STEM_LEN {
            return base.to_string();
        }
    }
    word.to_string()
}

fn has_vowel(s: &str) -> bool {
    s.chars().any(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y'))
}

/// `running` -> `runn` -> `run`, but keep `ll`, `ss` and `zz`
fn undouble(base: &str) -> String {
    let bytes = base.as_bytes();
    let n = bytes.len();
    if n >= 2 && bytes[n - 1] == bytes[n - 2] && !matches!(bytes[n - 1], b'l' | b's' | b'z') {
        let last = bytes[n - 1] as char;
        if last.is_ascii_alphabetic() && !matches!(last, 'a' | 'e' | 'i' | 'o' | 'u') {
            return base[..n - 1].to_string();
        }
    }
    base.to_string()
}
