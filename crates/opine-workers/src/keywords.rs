//! Keyword extraction and label synthesis for spawned topics.

use std::collections::HashMap;

/// Words too common to be topic keywords.
const STOPWORDS: &[&str] = &[
    "the", "and", "a", "an", "is", "it", "to", "of", "for", "was", "this", "that", "with", "not",
    "but", "my", "on", "you", "i", "have", "are", "be", "in", "so", "at", "we", "they", "its",
    "very", "too", "as", "just", "me", "had", "has", "when", "from", "your", "would", "can",
];

/// Top keywords across a set of texts, by stopword-filtered frequency.
///
/// Ties break alphabetically so the result is deterministic.
#[must_use]
pub fn top_keywords(texts: &[String], k: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in text.split_whitespace() {
            let token = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.len() < 3 || STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            *counts.entry(token).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(k).map(|(word, _)| word).collect()
}

/// Synthesise a topic label from its keywords.
///
/// Title-cases the top three keywords: `["slow", "checkout"]` becomes
/// `"Slow / Checkout"`.
#[must_use]
pub fn synthesize_label(keywords: &[String]) -> String {
    if keywords.is_empty() {
        return "Miscellaneous".to_string();
    }
    keywords
        .iter()
        .take(3)
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + chars.as_str()
            })
        })
        .collect::<Vec<_>>()
        .join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_top_keywords_by_frequency() {
        let pool = texts(&[
            "checkout is slow and the checkout crashes",
            "slow checkout again",
            "payment failed at checkout",
        ]);
        let keywords = top_keywords(&pool, 3);
        assert_eq!(keywords[0], "checkout");
        assert!(keywords.contains(&"slow".to_string()));
    }

    #[test]
    fn test_stopwords_excluded() {
        let pool = texts(&["the the the and and product"]);
        let keywords = top_keywords(&pool, 5);
        assert_eq!(keywords, vec!["product".to_string()]);
    }

    #[test]
    fn test_short_tokens_excluded() {
        let pool = texts(&["ui ux ok app app"]);
        let keywords = top_keywords(&pool, 5);
        assert_eq!(keywords, vec!["app".to_string()]);
    }

    #[test]
    fn test_synthesize_label() {
        let keywords = vec!["slow".to_string(), "checkout".to_string(), "payment".to_string(), "extra".to_string()];
        assert_eq!(synthesize_label(&keywords), "Slow / Checkout / Payment");
        assert_eq!(synthesize_label(&[]), "Miscellaneous");
    }
}
