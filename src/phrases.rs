use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Phrase → tags mapping. A `BTreeMap` keeps key iteration sorted, so
/// exclusion entries and longer phrases are always evaluated in the same
/// order. An empty tag list is an exclusion: the phrase is consumed but
/// contributes nothing.
pub type PhraseMap = BTreeMap<String, Vec<String>>;

/// Punctuation stripped (not replaced) before word splitting.
const STRIP_CHARS: &[char] = &['.', '!', '?', ',', ';', ':', '\'', '"', '(', ')'];

/// Load a phrase map from a JSON object of `{"phrase": ["Tag", ...]}`.
pub fn load_phrase_map(path: &Path) -> Result<PhraseMap> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading phrase map {}", path.display()))?;
    let map = serde_json::from_str(&raw)
        .with_context(|| format!("parsing phrase map {}", path.display()))?;
    Ok(map)
}

/// Scan free text against the phrase map and return the matched tags,
/// de-duplicated in first-occurrence order.
///
/// One left-to-right pass over the word sequence. At each position the
/// candidate phrase starts as the single word under the cursor and grows a
/// word at a time while more than one dictionary key still shares that
/// prefix; a match resolves only when exactly one key remains and it equals
/// the candidate in full. A resolved match consumes all its words; a failed
/// one advances the cursor a single word, so shorter matches are still
/// found in the overlap.
pub fn tag_text(text: &str, map: &PhraseMap) -> Vec<String> {
    let cleaned: String = text.chars().filter(|c| !STRIP_CHARS.contains(c)).collect();
    let cleaned = cleaned.to_lowercase();
    let words: Vec<&str> = cleaned.split_whitespace().collect();

    let mut tags = Vec::new();
    let mut i = 0;
    while i < words.len() {
        match resolve_at(&words[i..], map) {
            Some((key, consumed)) => {
                tags.extend(map[key].iter().cloned());
                i += consumed;
            }
            None => i += 1,
        }
    }
    dedup(tags)
}

/// Longest-match resolution at one starting position. Returns the matched
/// key and how many words it consumed, or `None` when the candidate set
/// runs dry or the text ends while the match is still ambiguous.
fn resolve_at<'m>(words: &[&str], map: &'m PhraseMap) -> Option<(&'m str, usize)> {
    let mut candidates: Vec<&'m str> = map.keys().map(String::as_str).collect();
    let mut len = 1;
    loop {
        let phrase = &words[..len];
        // Prefix match: only the first `len` words of each key are compared
        candidates.retain(|key| {
            key.split_whitespace()
                .take(phrase.len())
                .eq(phrase.iter().copied())
        });
        match candidates.as_slice() {
            [] => return None,
            [only] if only.split_whitespace().eq(phrase.iter().copied()) => {
                return Some((*only, len));
            }
            _ => {
                if len >= words.len() {
                    return None;
                }
                len += 1;
            }
        }
    }
}

fn dedup(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for tag in tags {
        if seen.insert(tag.clone()) {
            result.push(tag);
        }
    }
    result
}
