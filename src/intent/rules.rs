use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::classifier::{ClassifierError, IntentClassifier};
use super::types::{IntentResult, Slots};
use crate::kernel::utterance::NormalizedInput;

/// A whole phrase present in the input scores between these two bounds,
/// higher when the phrase covers more of the utterance.
const FULL_MATCH_BASE: f32 = 0.75;
const FULL_MATCH_SPAN: f32 = 0.2;
/// Partial word overlap never exceeds this, so it always lands below any
/// sensible confidence threshold and triggers disambiguation.
const PARTIAL_MATCH_SPAN: f32 = 0.5;
const MIN_PARTIAL_SCORE: f32 = 0.2;
/// Confidence for a follow-up that only carries slot values ("at 3pm").
const CARRY_OVER_CONFIDENCE: f32 = 0.5;

/// Words that end an after-marker capture ("email bob ABOUT lunch").
const BOUNDARY_WORDS: &[&str] = &[
    "at", "on", "about", "to", "for", "with", "titled", "called", "and", "please", "now", "today",
    "tomorrow",
];
const LEADING_ARTICLES: &[&str] = &["the", "a", "an", "my"];
const MERIDIEMS: &[(&str, &str)] = &[("am", "am"), ("a.m", "am"), ("pm", "pm"), ("p.m", "pm")];
const NUMBER_WORDS: &[(&str, u32)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("twenty", 20),
    ("fifty", 50),
    ("hundred", 100),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotExtractor {
    /// Words following one of `markers`, up to the next boundary word.
    After { markers: Vec<String> },
    TimeOfDay,
    Number,
    /// First of `values` present in the input.
    OneOf { values: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRule {
    pub name: String,
    pub extractor: SlotExtractor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRule {
    pub label: String,
    /// Normalized trigger phrases ("turn off wifi", "disconnect").
    pub phrases: Vec<String>,
    #[serde(default)]
    pub slots: Vec<SlotRule>,
}

impl IntentRule {
    pub fn new(label: &str, phrases: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            slots: Vec::new(),
        }
    }

    pub fn slot(mut self, name: &str, extractor: SlotExtractor) -> Self {
        self.slots.push(SlotRule {
            name: name.to_string(),
            extractor,
        });
        self
    }

    fn score(&self, input: &NormalizedInput) -> f32 {
        let n = input.tokens.len().max(1) as f32;
        let mut best = 0.0f32;

        for phrase in &self.phrases {
            let words: Vec<&str> = phrase.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            let score = if input.contains_phrase(phrase) {
                let coverage = (words.len() as f32 / n).min(1.0);
                FULL_MATCH_BASE + FULL_MATCH_SPAN * coverage
            } else {
                let hits = words
                    .iter()
                    .filter(|w| input.tokens.iter().any(|t| t == *w))
                    .count();
                PARTIAL_MATCH_SPAN * hits as f32 / words.len() as f32
            };
            best = best.max(score);
        }
        best
    }

    fn extract(&self, input: &NormalizedInput) -> Slots {
        self.slots
            .iter()
            .map(|rule| (rule.name.clone(), rule.extractor.extract(&input.tokens)))
            .collect()
    }
}

impl SlotExtractor {
    pub fn extract(&self, tokens: &[String]) -> Option<String> {
        match self {
            SlotExtractor::After { markers } => extract_after(tokens, markers),
            SlotExtractor::TimeOfDay => extract_time(tokens),
            SlotExtractor::Number => extract_number(tokens),
            SlotExtractor::OneOf { values } => {
                let input = NormalizedInput::from_tokens(tokens.to_vec());
                values.iter().find(|v| input.contains_phrase(v)).cloned()
            }
        }
    }
}

fn extract_after(tokens: &[String], markers: &[String]) -> Option<String> {
    for (i, token) in tokens.iter().enumerate() {
        if !markers.iter().any(|m| m == token) {
            continue;
        }
        let captured: Vec<&str> = tokens[i + 1..]
            .iter()
            .map(String::as_str)
            .skip_while(|t| LEADING_ARTICLES.contains(t))
            .take_while(|t| !BOUNDARY_WORDS.contains(t) && !markers.iter().any(|m| m == *t))
            .collect();
        if !captured.is_empty() {
            return Some(captured.join(" "));
        }
    }
    None
}

fn extract_time(tokens: &[String]) -> Option<String> {
    for (i, token) in tokens.iter().enumerate() {
        if token == "noon" || token == "midnight" {
            return Some(token.clone());
        }

        // "3pm", "3:30pm", "11a.m"
        for (suffix, canonical) in MERIDIEMS {
            if let Some(clock) = token.strip_suffix(suffix) {
                if let Some((h, m)) = parse_clock(clock) {
                    if (1..=12).contains(&h) {
                        return Some(format_meridiem(h, m, canonical));
                    }
                }
            }
        }

        if let Some((h, m)) = parse_clock(token) {
            // "3 pm", "3 o'clock"
            if let Some(next) = tokens.get(i + 1) {
                if let Some((_, canonical)) = MERIDIEMS.iter().find(|(s, _)| *s == next.as_str()) {
                    if (1..=12).contains(&h) {
                        return Some(format_meridiem(h, m, canonical));
                    }
                }
                if next == "o'clock" && m == 0 && (1..=12).contains(&h) {
                    return Some(format!("{}:00", h));
                }
            }
            // "15:00"
            if token.contains(':') && h < 24 {
                return Some(format!("{:02}:{:02}", h, m));
            }
        }
    }
    None
}

fn parse_clock(s: &str) -> Option<(u32, u32)> {
    let (h, m) = match s.split_once(':') {
        Some((h, m)) => (h, m),
        None => (s, "0"),
    };
    if h.is_empty() || h.len() > 2 || m.is_empty() || m.len() > 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some((h, m))
}

fn format_meridiem(h: u32, m: u32, meridiem: &str) -> String {
    if m == 0 {
        format!("{}{}", h, meridiem)
    } else {
        format!("{}:{:02}{}", h, m, meridiem)
    }
}

fn extract_number(tokens: &[String]) -> Option<String> {
    tokens.iter().find_map(|t| {
        let digits = t.trim_end_matches('%');
        if let Ok(n) = digits.parse::<f64>() {
            if n.is_finite() {
                return Some(n.to_string());
            }
        }
        NUMBER_WORDS
            .iter()
            .find(|(w, _)| *w == t.as_str())
            .map(|(_, n)| n.to_string())
    })
}

/// Phrase-matching classifier with per-intent slot extractors.
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier {
    rules: Vec<IntentRule>,
}

impl RuleClassifier {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    /// Synchronous core; the async trait impl just wraps this.
    pub fn classify_now(&self, input: &NormalizedInput, recent_history: &[IntentResult]) -> IntentResult {
        let mut best: Option<(&IntentRule, f32)> = None;
        for rule in &self.rules {
            let score = rule.score(input);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((rule, score));
            }
        }

        if let Some((rule, score)) = best {
            if score >= MIN_PARTIAL_SCORE {
                let mut result = IntentResult::new(&rule.label, score);
                result.slots = rule.extract(input);
                return result;
            }
        }

        // No trigger phrase: maybe a follow-up answering the previous intent's slot.
        if let Some(last) = recent_history.last() {
            if let Some(rule) = self.rules.iter().find(|r| r.label == last.label) {
                let slots = rule.extract(input);
                if slots.values().any(Option::is_some) {
                    let mut result = IntentResult::new(&rule.label, CARRY_OVER_CONFIDENCE);
                    result.slots = slots;
                    return result;
                }
            }
        }

        IntentResult::unknown()
    }
}

#[async_trait]
impl IntentClassifier for RuleClassifier {
    async fn classify(
        &self,
        input: &NormalizedInput,
        recent_history: &[IntentResult],
    ) -> Result<IntentResult, ClassifierError> {
        Ok(self.classify_now(input, recent_history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::normalizer::Normalizer;

    fn classifier() -> RuleClassifier {
        RuleClassifier::new(vec![
            IntentRule::new("disable_network", &["turn off wifi", "disable wifi", "go offline"]),
            IntentRule::new("schedule_meeting", &["schedule", "schedule a meeting", "book a meeting"])
                .slot("time", SlotExtractor::TimeOfDay)
                .slot(
                    "title",
                    SlotExtractor::After {
                        markers: vec!["about".into(), "titled".into()],
                    },
                ),
            IntentRule::new("open_application", &["open", "launch"]).slot(
                "app",
                SlotExtractor::After {
                    markers: vec!["open".into(), "launch".into()],
                },
            ),
        ])
    }

    fn input(text: &str) -> NormalizedInput {
        Normalizer::new().normalize_text(text)
    }

    #[test]
    fn exact_phrase_scores_high() {
        let r = classifier().classify_now(&input("Turn off wifi"), &[]);
        assert_eq!(r.label, "disable_network");
        assert!(r.confidence > 0.9);
        assert!(r.slots.is_empty());
    }

    #[test]
    fn lists_unfilled_slots_as_none() {
        let r = classifier().classify_now(&input("schedule"), &[]);
        assert_eq!(r.label, "schedule_meeting");
        assert_eq!(r.slots.get("time"), Some(&None));
        assert_eq!(r.slots.get("title"), Some(&None));
    }

    #[test]
    fn extracts_time_and_title() {
        let r = classifier().classify_now(&input("Please schedule a meeting at 3:30 PM about the budget"), &[]);
        assert_eq!(r.label, "schedule_meeting");
        assert_eq!(r.slot("time"), Some("3:30pm"));
        assert_eq!(r.slot("title"), Some("budget"));
    }

    #[test]
    fn after_marker_skips_articles() {
        let r = classifier().classify_now(&input("open the calculator"), &[]);
        assert_eq!(r.slot("app"), Some("calculator"));
    }

    #[test]
    fn partial_overlap_stays_low() {
        let r = classifier().classify_now(&input("wifi"), &[]);
        assert_eq!(r.label, "disable_network");
        assert!(r.confidence < 0.6);
    }

    #[test]
    fn follow_up_carries_previous_label() {
        let history = vec![IntentResult::new("schedule_meeting", 0.95).with_missing_slot("time")];
        let r = classifier().classify_now(&input("at 4pm"), &history);
        assert_eq!(r.label, "schedule_meeting");
        assert_eq!(r.slot("time"), Some("4pm"));
        assert_eq!(r.confidence, CARRY_OVER_CONFIDENCE);
    }

    #[test]
    fn nothing_matches_is_unknown() {
        let r = classifier().classify_now(&input("sing me a song"), &[]);
        assert!(r.is_unknown());
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn time_forms() {
        let toks = |s: &str| input(s).tokens;
        assert_eq!(extract_time(&toks("at 15:45")), Some("15:45".into()));
        assert_eq!(extract_time(&toks("at 9 am")), Some("9am".into()));
        assert_eq!(extract_time(&toks("at 7 o'clock")), Some("7:00".into()));
        assert_eq!(extract_time(&toks("at noon")), Some("noon".into()));
        assert_eq!(extract_time(&toks("room 42")), None);
        assert_eq!(extract_number(&toks("volume to 30%")), Some("30".into()));
        assert_eq!(extract_number(&toks("set it to five")), Some("5".into()));
    }
}
