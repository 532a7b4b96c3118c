//! NLP service contract
//!
//! Tokenization, lemmatization, and sentence splitting live in an external
//! NLP service; these helpers are the stable stand-in contract the pipeline
//! codes against. They are deterministic so clustering output is stable
//! across retries of the same input.

/// Stemmed, punctuation-stripped form of a word, used as the grouping key
/// for keyword aggregation.
pub fn pruned_stem(word: &str) -> String {
    word.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// Split a text into sentences on terminal punctuation.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_punctuation_and_case() {
        assert_eq!(pruned_stem("Cable!"), "cable");
        assert_eq!(pruned_stem("snap-on"), "snapon");
        assert_eq!(pruned_stem("COPPER"), "copper");
        assert_eq!(pruned_stem("c4ble"), "c4ble");
    }

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("First one. Second one! Third?");
        assert_eq!(sentences, ["First one.", "Second one!", "Third?"]);
    }

    #[test]
    fn trailing_fragment_is_kept() {
        let sentences = split_sentences("Done. and a fragment");
        assert_eq!(sentences, ["Done.", "and a fragment"]);
    }

    #[test]
    fn empty_text_has_no_sentences() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
