//! Word-budget summarizer for image prompts.
//!
//! CLIP-style text encoders silently drop everything past their token window, so
//! long scene descriptions lose the details that matter most. The summarizer keeps
//! the opening sentence, then phrases the caller asks to preserve, then the
//! remaining content words.

use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "of", "to", "in", "on", "at", "with", "for", "from",
    "by", "is", "are", "was", "were", "be", "been", "it", "its", "this", "that", "these",
    "those", "as", "into", "very", "so", "then", "there", "their", "they", "he", "she", "his",
    "her", "while", "who", "which",
];

/// Shortens `text` to at most `max_words` whitespace-separated words.
///
/// Text already within budget is returned unchanged, which makes the function
/// idempotent.
pub fn summarize_for_clip(text: &str, max_words: usize, preserve: &[&str]) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    if max_words == 0 {
        return String::new();
    }

    let sentences = split_sentences(text);
    let Some((first, rest)) = sentences.split_first() else {
        return words[..max_words].join(" ");
    };

    let first_words: Vec<&str> = first.split_whitespace().collect();
    if first_words.len() >= max_words {
        return first_words[..max_words].join(" ");
    }

    let mut selected: Vec<&str> = Vec::with_capacity(max_words);
    let mut seen = HashSet::new();
    for word in first_words {
        selected.push(word);
        seen.insert(normalize(word));
    }

    for phrase in preserve {
        let Some(matched) = find_phrase(&words, phrase) else {
            continue;
        };
        for &word in matched {
            if selected.len() >= max_words {
                break;
            }
            let key = normalize(word);
            if !key.is_empty() && seen.insert(key) {
                selected.push(word);
            }
        }
    }

    let remaining: Vec<&str> = rest.iter().flat_map(|s| s.split_whitespace()).collect();
    let mut used = vec![false; remaining.len()];
    for (index, word) in remaining.iter().enumerate() {
        if selected.len() >= max_words {
            break;
        }
        let key = normalize(word);
        if key.is_empty() || STOP_WORDS.contains(&key.as_str()) || seen.contains(&key) {
            continue;
        }
        seen.insert(key);
        selected.push(word);
        used[index] = true;
    }

    for (index, word) in remaining.iter().enumerate() {
        if selected.len() >= max_words {
            break;
        }
        if !used[index] {
            selected.push(word);
        }
    }

    selected.join(" ")
}

/// First run of source words matching `phrase` token by token, ignoring case and punctuation.
fn find_phrase<'w, 'a>(words: &'w [&'a str], phrase: &str) -> Option<&'w [&'a str]> {
    let keys: Vec<String> = phrase
        .split_whitespace()
        .map(normalize)
        .filter(|key| !key.is_empty())
        .collect();
    if keys.is_empty() || keys.len() > words.len() {
        return None;
    }
    words
        .windows(keys.len())
        .find(|window| window.iter().zip(&keys).all(|(word, key)| normalize(word) == *key))
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let end = index + ch.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = "A small bear yawns beside a glowing lantern. \
        The forest is quiet and the stars are bright over the sleepy river. \
        A silver owl with a tiny blue scarf watches from the tall pine tree while fireflies drift \
        slowly across the meadow and the moon rises over the distant hills.";

    #[test]
    fn short_text_is_unchanged() {
        let text = "A sleepy fox curls up.";
        assert_eq!(summarize_for_clip(text, 10, &[]), text);
    }

    #[test]
    fn long_first_sentence_is_cut_verbatim() {
        let text = "One two three four five six seven eight nine ten eleven twelve. Thirteen.";
        assert_eq!(
            summarize_for_clip(text, 10, &[]),
            "One two three four five six seven eight nine ten"
        );
    }

    #[test]
    fn keeps_first_sentence_and_preserved_phrases() {
        let summary = summarize_for_clip(SCENE, 14, &["blue scarf"]);
        let words: Vec<&str> = summary.split_whitespace().collect();
        assert_eq!(words.len(), 14);
        assert!(summary.starts_with("A small bear yawns beside a glowing lantern."));
        assert!(summary.contains("blue scarf"));
    }

    #[test]
    fn skips_stop_words_and_repeats() {
        let summary = summarize_for_clip(SCENE, 12, &[]);
        assert_eq!(
            summary,
            "A small bear yawns beside a glowing lantern. forest quiet stars bright"
        );
    }

    #[test]
    fn preserve_match_is_case_insensitive() {
        let summary = summarize_for_clip(SCENE, 12, &["SILVER OWL"]);
        assert!(summary.ends_with("silver owl forest quiet"));
        assert!(!summary.contains("SILVER"));
    }

    #[test]
    fn preserve_phrase_must_match_whole_words() {
        let summary = summarize_for_clip(SCENE, 12, &["ilver ow"]);
        assert_eq!(
            summary,
            "A small bear yawns beside a glowing lantern. forest quiet stars bright"
        );
    }

    #[test]
    fn summarizing_twice_changes_nothing() {
        let once = summarize_for_clip(SCENE, 18, &["moon"]);
        let twice = summarize_for_clip(&once, 18, &["moon"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn zero_budget_yields_empty_text() {
        assert_eq!(summarize_for_clip(SCENE, 0, &[]), "");
    }
}
