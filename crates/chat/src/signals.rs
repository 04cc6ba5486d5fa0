//! Keyword heuristics over visitor text (Indonesian and English).

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

const NEGATIVE: &[&str] = &[
    "kecewa",
    "marah",
    "buruk",
    "jelek",
    "lambat",
    "parah",
    "tidak puas",
    "komplain",
    "complain",
    "penipu",
    "refund",
    "angry",
    "terrible",
    "disappointed",
];

const POSITIVE: &[&str] = &[
    "terima kasih",
    "makasih",
    "mantap",
    "bagus",
    "puas",
    "keren",
    "thanks",
    "thank you",
    "great",
    "awesome",
];

const HUMAN_REQUEST: &[&str] = &[
    "admin",
    "manusia",
    "operator",
    "customer service",
    "cs ",
    "orang asli",
    "bicara dengan",
    "hubungi tim",
    "human",
    "real person",
    "agent",
];

fn contains_any(text: &str, needles: &[&str]) -> bool {
    let lower = format!("{} ", text.to_lowercase());
    needles.iter().any(|n| lower.contains(n))
}

#[must_use]
pub fn detect_sentiment(text: &str) -> Sentiment {
    if contains_any(text, NEGATIVE) {
        Sentiment::Negative
    } else if contains_any(text, POSITIVE) {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    }
}

/// Whether the visitor is asking for a human.
#[must_use]
pub fn wants_human(text: &str) -> bool {
    contains_any(text, HUMAN_REQUEST)
}

/// Cut `text` to at most `max_chars` characters, appending `...` when cut.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_prefers_negative() {
        assert_eq!(detect_sentiment("Saya kecewa, terima kasih"), Sentiment::Negative);
        assert_eq!(detect_sentiment("Mantap, makasih!"), Sentiment::Positive);
        assert_eq!(detect_sentiment("halo"), Sentiment::Neutral);
    }

    #[test]
    fn human_request_detection() {
        assert!(wants_human("bisa bicara dengan admin?"));
        assert!(wants_human("mau ke CS"));
        assert!(!wants_human("berapa harga paket website?"));
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("halo", 10), "halo");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }
}
