//! Deterministic diagnostics for summaries
//!
//! Topic tags come from a fixed vocabulary and the quality score from a
//! simple length/voice heuristic. Both are display signals only; the
//! scheduler never gates compression on them.

use std::collections::HashSet;

use crate::memory::types::char_len;

/// Vocabulary topic tags are drawn from
pub const TOPIC_VOCABULARY: &[&str] = &[
    "work", "family", "friends", "travel", "health", "food", "music", "movies", "books",
    "games", "sports", "art", "school", "money", "weather", "technology", "programming",
    "science", "history", "nature", "love", "dreams", "memories", "plans", "feelings",
    "home", "pets", "shopping", "news", "philosophy",
];

/// Conversational / first-person markers that raise the quality score
const CONVERSATIONAL_MARKERS: &[&str] = &[
    "i", "me", "my", "we", "us", "our", "you", "your", "remember", "talked", "told", "asked",
];

/// Marker hits at which the voice bonus saturates
const MARKER_SATURATION: usize = 3;

const BASE_QUALITY: f32 = 0.5;
const LENGTH_BONUS: f32 = 0.2;
const VOICE_BONUS: f32 = 0.3;
const IDEAL_LENGTH: std::ops::RangeInclusive<usize> = 50..=200;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Vocabulary words present in `text`, in vocabulary order
pub fn extract_topics(text: &str) -> Vec<String> {
    let present: HashSet<String> = words(text).collect();
    TOPIC_VOCABULARY
        .iter()
        .filter(|topic| present.contains(**topic))
        .map(|topic| topic.to_string())
        .collect()
}

/// Heuristic quality score in [0.0, 1.0]
///
/// Base 0.5, +0.2 when the summary is 50-200 characters long, and up to
/// +0.3 proportional to distinct conversational markers.
pub fn quality_score(summary: &str) -> f32 {
    let mut score = BASE_QUALITY;

    if IDEAL_LENGTH.contains(&char_len(summary)) {
        score += LENGTH_BONUS;
    }

    let present: HashSet<String> = words(summary).collect();
    let hits = CONVERSATIONAL_MARKERS
        .iter()
        .filter(|marker| present.contains(**marker))
        .count();
    score += VOICE_BONUS * (hits.min(MARKER_SATURATION) as f32 / MARKER_SATURATION as f32);

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_topics_vocabulary_order() {
        let topics = extract_topics("We talked about Music, then travel plans and more music.");
        assert_eq!(topics, vec!["travel", "music", "plans"]);
    }

    #[test]
    fn test_extract_topics_whole_words_only() {
        assert!(extract_topics("homework and artistic workflows").is_empty());
    }

    #[test]
    fn test_quality_short_impersonal() {
        assert!((quality_score("Weather report.") - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_quality_length_bonus() {
        let text = "The weather report covered rain across the northern coast today.";
        assert!(IDEAL_LENGTH.contains(&char_len(text)));
        assert!((quality_score(text) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_quality_voice_bonus_saturates() {
        let text = "I told you we should remember my plans and our trip, you said yes to me.";
        assert!((quality_score(text) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_quality_partial_voice_bonus() {
        let text = "I went.";
        assert!((quality_score(text) - 0.6).abs() < 1e-6);
    }
}
