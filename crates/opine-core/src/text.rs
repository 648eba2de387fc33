//! Text normalisation, dedup keys, and best-effort language detection.

use sha2::{Digest, Sha256};

/// Lowercase and collapse all whitespace runs to single spaces.
///
/// The result is the `normalized_text` column and the dedup input.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = true; // leading whitespace is dropped
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            in_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Within-batch dedup key over (normalized text, source, customer id).
///
/// The separator byte keeps `("ab", "c")` distinct from `("a", "bc")`.
#[must_use]
pub fn dedup_key(normalized_text: &str, source: &str, customer_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hasher.update([0x1f]);
    hasher.update(source.as_bytes());
    hasher.update([0x1f]);
    hasher.update(customer_id.unwrap_or("").as_bytes());
    hex_encode(&hasher.finalize())
}

/// Common English function words used by the detection heuristic.
const EN_STOPWORDS: &[&str] = &[
    "the", "and", "is", "it", "to", "of", "a", "i", "for", "was", "this", "that", "with", "not",
    "but", "my", "on", "you", "have", "are",
];

/// Function words for the handful of other Latin-script languages the
/// heuristic can tell apart.
const ES_STOPWORDS: &[&str] = &["el", "la", "los", "las", "es", "de", "que", "y", "un", "una", "no", "muy"];
const FR_STOPWORDS: &[&str] = &["le", "la", "les", "est", "de", "que", "et", "un", "une", "pas", "je", "très"];
const DE_STOPWORDS: &[&str] = &["der", "die", "das", "ist", "und", "nicht", "ein", "eine", "ich", "sehr"];

/// Best-effort language detection.
///
/// Returns a BCP-47-ish tag when the heuristic is confident, `None`
/// otherwise. Failure to detect never rejects a row; the caller stores NULL.
#[must_use]
pub fn detect_language(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Script detection first: a dominant non-Latin script is decisive.
    if let Some(tag) = detect_script(trimmed) {
        return Some(tag.to_string());
    }

    // Latin scripts: stopword vote. Ties and low counts stay undetected.
    let words: Vec<String> = trimmed
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    if words.is_empty() {
        return None;
    }

    let score = |stopwords: &[&str]| {
        words
            .iter()
            .filter(|w| stopwords.contains(&w.as_str()))
            .count()
    };

    let candidates = [
        ("en", score(EN_STOPWORDS)),
        ("es", score(ES_STOPWORDS)),
        ("fr", score(FR_STOPWORDS)),
        ("de", score(DE_STOPWORDS)),
    ];

    let (best_tag, best) = candidates
        .iter()
        .max_by_key(|(_, n)| *n)
        .copied()
        .unwrap_or(("en", 0));
    let runner_up = candidates
        .iter()
        .filter(|(tag, _)| *tag != best_tag)
        .map(|(_, n)| *n)
        .max()
        .unwrap_or(0);

    if best == 0 || best == runner_up {
        return None;
    }
    Some(best_tag.to_string())
}

/// Whether the text is detected-English or undetected.
///
/// Used by the English-only toggle: only a confident non-English detection
/// drops a row.
#[must_use]
pub fn passes_english_filter(text: &str) -> bool {
    match detect_language(text) {
        Some(tag) => tag == "en",
        None => true,
    }
}

fn detect_script(text: &str) -> Option<&'static str> {
    let mut cyrillic = 0usize;
    let mut cjk = 0usize;
    let mut arabic = 0usize;
    let mut kana = 0usize;
    let mut alphabetic = 0usize;

    for ch in text.chars() {
        if !ch.is_alphabetic() {
            continue;
        }
        alphabetic += 1;
        let cp = ch as u32;
        match cp {
            0x0400..=0x04FF => cyrillic += 1,
            0x4E00..=0x9FFF => cjk += 1,
            0x0600..=0x06FF => arabic += 1,
            0x3040..=0x30FF => kana += 1,
            _ => {},
        }
    }

    if alphabetic == 0 {
        return None;
    }
    let dominant = |count: usize| count * 2 > alphabetic;
    if dominant(kana) || (dominant(cjk) && kana > 0) {
        Some("ja")
    } else if dominant(cjk) {
        Some("zh")
    } else if dominant(cyrillic) {
        Some("ru")
    } else if dominant(arabic) {
        Some("ar")
    } else {
        None
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Great\t\tProduct!\n"), "great product!");
        assert_eq!(normalize("ALREADY lower"), "already lower");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_dedup_key_stability() {
        let a = dedup_key("great product!", "website", Some("c1"));
        let b = dedup_key("great product!", "website", Some("c1"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_dedup_key_discriminates_fields() {
        let base = dedup_key("great", "website", Some("c1"));
        assert_ne!(base, dedup_key("great", "website", Some("c2")));
        assert_ne!(base, dedup_key("great", "app", Some("c1")));
        assert_ne!(base, dedup_key("great", "website", None));
        // Field boundaries are unambiguous.
        assert_ne!(
            dedup_key("ab", "c", None),
            dedup_key("a", "bc", None)
        );
    }

    #[test]
    fn test_detect_english() {
        let text = "The product is great and I love it, but the delivery was slow";
        assert_eq!(detect_language(text), Some("en".to_string()));
        assert!(passes_english_filter(text));
    }

    #[test]
    fn test_detect_spanish() {
        let text = "El producto es muy bueno pero la entrega no fue rápida";
        assert_eq!(detect_language(text), Some("es".to_string()));
        assert!(!passes_english_filter(text));
    }

    #[test]
    fn test_detect_cyrillic() {
        assert_eq!(
            detect_language("Отличный продукт, быстрая доставка"),
            Some("ru".to_string())
        );
    }

    #[test]
    fn test_detect_cjk() {
        assert_eq!(detect_language("产品质量很好"), Some("zh".to_string()));
    }

    #[test]
    fn test_undetected_passes_filter() {
        // No stopword evidence either way: stay undetected, keep the row.
        assert_eq!(detect_language("asdf qwerty zxcv"), None);
        assert!(passes_english_filter("asdf qwerty zxcv"));
    }

    #[test]
    fn test_empty_undetected() {
        assert_eq!(detect_language("   "), None);
    }
}
