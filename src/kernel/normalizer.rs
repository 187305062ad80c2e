use super::utterance::{NormalizedInput, Utterance};

/// Hesitation tokens that carry no meaning for classification.
const FILLERS: &[&str] = &["um", "uh", "er", "erm", "hmm", "uhm"];

/// Characters kept when they appear inside a token ("3:30pm", "don't", "a.m", "bob@corp").
const INNER_PUNCTUATION: &[char] = &[':', '\'', '.', '@', '-', '_', '/'];

/// Converts raw speech-to-text or typed input into canonical tokens.
///
/// Side-effect free and infallible: empty or all-noise input yields a
/// `NormalizedInput` with zero tokens.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    wake_phrase: Vec<String>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip `phrase` when it leads an utterance ("hey assistant, open mail").
    pub fn with_wake_phrase(phrase: &str) -> Self {
        let wake_phrase = tokenize(phrase);
        Self { wake_phrase }
    }

    pub fn normalize(&self, utterance: &Utterance) -> NormalizedInput {
        self.normalize_text(&utterance.raw_text)
    }

    pub fn normalize_text(&self, raw: &str) -> NormalizedInput {
        let mut tokens = tokenize(raw);

        if !self.wake_phrase.is_empty() && tokens.starts_with(&self.wake_phrase) {
            tokens.drain(..self.wake_phrase.len());
        }

        NormalizedInput::from_tokens(tokens)
    }
}

fn tokenize(raw: &str) -> Vec<String> {
    fold_typography(raw)
        .to_lowercase()
        .split_whitespace()
        .filter_map(repair_token)
        .filter(|t| !FILLERS.contains(&t.as_str()))
        .collect()
}

/// Speech engines and word processors emit curly quotes and long dashes.
fn fold_typography(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2010}'..='\u{2015}' | '\u{2212}' => '-',
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => ' ',
            other => other,
        })
        .collect()
}

fn repair_token(token: &str) -> Option<String> {
    let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || INNER_PUNCTUATION.contains(c))
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_cases_and_repairs_punctuation() {
        let n = Normalizer::new();
        let out = n.normalize_text("  Turn OFF   the Wi-Fi!!  ");
        assert_eq!(out.tokens, vec!["turn", "off", "the", "wi-fi"]);
        assert_eq!(out.canonical_text, "turn off the wi-fi");
    }

    #[test]
    fn keeps_inner_punctuation() {
        let n = Normalizer::new();
        let out = n.normalize_text("Schedule it at 3:30pm, don\u{2019}t forget.");
        assert_eq!(out.tokens, vec!["schedule", "it", "at", "3:30pm", "don't", "forget"]);
    }

    #[test]
    fn empty_and_noise_yield_no_tokens() {
        let n = Normalizer::new();
        assert!(n.normalize_text("").is_empty());
        assert!(n.normalize_text("   \t\n").is_empty());
        assert!(n.normalize_text("?! ... um, uh").is_empty());
    }

    #[test]
    fn strips_leading_wake_phrase_only() {
        let n = Normalizer::with_wake_phrase("hey assistant");
        assert_eq!(n.normalize_text("Hey, assistant: open mail").canonical_text, "open mail");
        assert_eq!(
            n.normalize_text("tell hey assistant hi").canonical_text,
            "tell hey assistant hi"
        );
        assert!(n.normalize_text("hey assistant").is_empty());
    }

    #[test]
    fn phrase_containment_is_contiguous() {
        let n = Normalizer::new();
        let input = n.normalize_text("please turn off wifi now");
        assert!(input.contains_phrase("turn off wifi"));
        assert!(!input.contains_phrase("turn wifi"));
    }
}
