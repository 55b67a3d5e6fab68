//! Keyword matcher: maps free text onto a catalog template.
//!
//! Scoring, per template, summed over its keywords (all lowercased):
//! - +10 if the whole lowercased message contains the keyword;
//! - +3 for every message word that equals the keyword or occurs inside it.
//!
//! Both rules apply independently, so one keyword can contribute several
//! times. Every template scoring at least 80% of the best score is eligible
//! and one is picked at random. A best score of zero selects a random
//! fallback template instead.

use std::sync::Arc;

use tracing::debug;

use parley_core::error::Result;
use parley_core::random::{pick_index, RandomSource};

use crate::catalog::{Category, ResponseCatalog, ResponseTemplate};

/// Points for a keyword found anywhere in the message.
const PHRASE_SCORE: u64 = 10;
/// Points for each message word matching a keyword.
const WORD_SCORE: u64 = 3;

/// The reply chosen for one user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedReply {
    pub reply_text: String,
    pub suggestions: Vec<String>,
    pub category: Category,
    /// Score of the chosen template; zero for fallback replies.
    pub score: u64,
}

/// A template together with its score for a given message.
#[derive(Clone, Copy, Debug)]
pub struct ScoredTemplate<'a> {
    pub category: Category,
    pub template: &'a ResponseTemplate,
    pub score: u64,
}

/// Score one template against an already lowercased message and its words.
///
/// Saturates instead of wrapping on very long messages or keyword lists.
pub fn score_template(message: &str, words: &[&str], template: &ResponseTemplate) -> u64 {
    let mut score: u64 = 0;
    for keyword in &template.keywords {
        let keyword = keyword.to_lowercase();
        if message.contains(keyword.as_str()) {
            score = score.saturating_add(PHRASE_SCORE);
        }
        for word in words {
            if *word == keyword || keyword.contains(word) {
                score = score.saturating_add(WORD_SCORE);
            }
        }
    }
    score
}

/// Picks replies from a validated catalog.
#[derive(Debug, Clone)]
pub struct Matcher {
    catalog: Arc<ResponseCatalog>,
}

impl Matcher {
    /// Build a matcher, validating the catalog first.
    pub fn new(catalog: Arc<ResponseCatalog>) -> Result<Self> {
        catalog.validate()?;
        Ok(Self { catalog })
    }

    pub fn catalog(&self) -> &ResponseCatalog {
        &self.catalog
    }

    /// The eligible set for `text`: every scored template within the
    /// tolerance band of the best score, best first, ties in catalog order.
    ///
    /// Empty when nothing scores above zero.
    pub fn rank(&self, text: &str) -> Vec<ScoredTemplate<'_>> {
        let message = text.to_lowercase();
        let words: Vec<&str> = message.split_whitespace().collect();

        let mut scored: Vec<ScoredTemplate<'_>> = self
            .catalog
            .scored_templates()
            .map(|(category, template)| ScoredTemplate {
                category,
                template,
                score: score_template(&message, &words, template),
            })
            .collect();

        let best = scored.iter().map(|s| s.score).max().unwrap_or(0);
        if best == 0 {
            return Vec::new();
        }

        // score >= 0.8 * best, kept in integers
        let floor = u128::from(best) * 4;
        scored.retain(|s| u128::from(s.score) * 5 >= floor);
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored
    }

    /// Choose a reply for `text`. Always succeeds on a validated catalog.
    pub fn find_best_match(&self, text: &str, rng: &mut dyn RandomSource) -> MatchedReply {
        let eligible = self.rank(text);

        if eligible.is_empty() {
            let template = &self.catalog.fallback[pick_index(rng, self.catalog.fallback.len())];
            debug!("No keyword matched, using fallback reply");
            return MatchedReply {
                reply_text: template.reply_text.clone(),
                suggestions: template.suggestions.clone(),
                category: Category::Fallback,
                score: 0,
            };
        }

        let chosen = eligible[pick_index(rng, eligible.len())];
        debug!(
            category = %chosen.category,
            score = chosen.score,
            eligible = eligible.len(),
            "Matched reply"
        );
        MatchedReply {
            reply_text: chosen.template.reply_text.clone(),
            suggestions: chosen.template.suggestions.clone(),
            category: chosen.category,
            score: chosen.score,
        }
    }

    /// A random greeting template, used to seed fresh conversations.
    pub fn pick_greeting(&self, rng: &mut dyn RandomSource) -> &ResponseTemplate {
        &self.catalog.greetings[pick_index(rng, self.catalog.greetings.len())]
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::random::SequenceRandom;
    use std::collections::HashSet;

    fn template(reply: &str, keywords: &[&str]) -> ResponseTemplate {
        ResponseTemplate::new(reply, keywords, &[])
    }

    fn catalog_with(services: Vec<ResponseTemplate>) -> Arc<ResponseCatalog> {
        Arc::new(ResponseCatalog {
            greetings: vec![template("Hello!", &["hello"])],
            services,
            fallback: vec![
                ResponseTemplate::new("Fallback one", &[], &["Try pricing"]),
                template("Fallback two", &[]),
            ],
            ..Default::default()
        })
    }

    fn fallback_texts() -> HashSet<&'static str> {
        ["Fallback one", "Fallback two"].into_iter().collect()
    }

    #[test]
    fn test_score_phrase_and_word_rules_accumulate() {
        let t = template("x", &["pricing"]);
        // substring +10, word equal +3
        assert_eq!(score_template("pricing", &["pricing"], &t), 13);
        // "price" is not inside "pricing": no phrase, no word match
        assert_eq!(score_template("price", &["price"], &t), 0);
        // word "pric" is contained in keyword: +3 only
        assert_eq!(score_template("pric", &["pric"], &t), 3);
    }

    #[test]
    fn test_score_multi_word_keyword() {
        let t = template("x", &["get started"]);
        let message = "how do i get started";
        let words: Vec<&str> = message.split_whitespace().collect();
        // phrase +10, "get" +3, "started" +3
        assert_eq!(score_template(message, &words, &t), 16);
    }

    #[test]
    fn test_score_repeated_word_double_counts() {
        let t = template("x", &["cost"]);
        let message = "cost cost";
        let words: Vec<&str> = message.split_whitespace().collect();
        assert_eq!(score_template(message, &words, &t), 10 + 3 + 3);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let matcher = Matcher::new(catalog_with(vec![template("Services!", &["Services"])])).unwrap();
        let ranked = matcher.rank("WHAT SERVICES");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].template.reply_text, "Services!");
    }

    #[test]
    fn test_no_match_uses_fallback() {
        let matcher = Matcher::new(catalog_with(vec![template("Services!", &["services"])])).unwrap();
        for value in [0.0, 0.3, 0.6, 0.99] {
            let mut rng = SequenceRandom::constant(value);
            let reply = matcher.find_best_match("zzz qqq", &mut rng);
            assert_eq!(reply.category, Category::Fallback);
            assert_eq!(reply.score, 0);
            assert!(fallback_texts().contains(reply.reply_text.as_str()));
        }
    }

    #[test]
    fn test_fallback_carries_suggestions() {
        let matcher = Matcher::new(catalog_with(vec![])).unwrap();
        let mut rng = SequenceRandom::constant(0.0);
        let reply = matcher.find_best_match("nothing here", &mut rng);
        assert_eq!(reply.reply_text, "Fallback one");
        assert_eq!(reply.suggestions, vec!["Try pricing".to_string()]);
    }

    #[test]
    fn test_empty_input_words_do_not_match_everything() {
        let matcher = Matcher::new(catalog_with(vec![template("Services!", &["services"])])).unwrap();
        assert!(matcher.rank("   ").is_empty());
        assert!(matcher.rank("  zzz  ").is_empty());
    }

    #[test]
    fn test_tolerance_band_admits_near_ties() {
        // "xy" against: A ["xy"] -> 10 + 3 = 13,
        // B four keywords containing "xy" -> 4 * 3 = 12 (>= 10.4),
        // C three of them -> 9 (< 10.4).
        let a = template("A", &["xy"]);
        let b = template("B", &["xyz", "wxy", "axy", "bxy"]);
        let c = template("C", &["xyz", "wxy", "axy"]);
        let matcher = Matcher::new(catalog_with(vec![a, b, c])).unwrap();

        let ranked = matcher.rank("xy");
        let scores: Vec<u64> = ranked.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![13, 12]);

        let mut seen = HashSet::new();
        for i in 0..20 {
            let mut rng = SequenceRandom::constant(i as f64 / 20.0);
            let reply = matcher.find_best_match("xy", &mut rng);
            assert_ne!(reply.reply_text, "C");
            seen.insert(reply.reply_text);
        }
        assert!(seen.contains("A"));
        assert!(seen.contains("B"));
    }

    #[test]
    fn test_band_boundary_is_inclusive() {
        // Word-only hits for "ab": 15, 12 (exactly 80%) and 9.
        let a = template("A", &["abc", "xab", "yab", "zab", "wab"]);
        let b = template("B", &["abc", "xab", "yab", "zab"]);
        let c = template("C", &["abc", "xab", "yab"]);
        let matcher = Matcher::new(catalog_with(vec![a, b, c])).unwrap();

        let ranked = matcher.rank("ab");
        let replies: Vec<(&str, u64)> = ranked
            .iter()
            .map(|s| (s.template.reply_text.as_str(), s.score))
            .collect();
        assert_eq!(replies, vec![("A", 15), ("B", 12)]);
    }

    #[test]
    fn test_single_eligible_is_deterministic() {
        let a = template("Pricing", &["price", "cost"]);
        let b = template("Services", &["services"]);
        let matcher = Matcher::new(catalog_with(vec![a, b])).unwrap();
        for i in 0..10 {
            let mut rng = SequenceRandom::constant(i as f64 / 10.0);
            let reply = matcher.find_best_match("what does it cost", &mut rng);
            assert_eq!(reply.reply_text, "Pricing");
            assert_eq!(reply.category, Category::Services);
        }
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let a = template("First", &["demo"]);
        let b = template("Second", &["demo"]);
        let matcher = Matcher::new(catalog_with(vec![a, b])).unwrap();

        let mut low = SequenceRandom::constant(0.0);
        assert_eq!(matcher.find_best_match("demo", &mut low).reply_text, "First");
        let mut high = SequenceRandom::constant(0.9);
        assert_eq!(matcher.find_best_match("demo", &mut high).reply_text, "Second");
    }

    #[test]
    fn test_greetings_take_part_in_scoring() {
        let matcher = Matcher::new(catalog_with(vec![])).unwrap();
        let mut rng = SequenceRandom::constant(0.0);
        let reply = matcher.find_best_match("hello", &mut rng);
        assert_eq!(reply.category, Category::Greetings);
        assert_eq!(reply.reply_text, "Hello!");
    }

    #[test]
    fn test_new_rejects_invalid_catalog() {
        let catalog = Arc::new(ResponseCatalog {
            greetings: vec![template("Hi", &["hi"])],
            ..Default::default()
        });
        assert!(Matcher::new(catalog).is_err());
    }

    #[test]
    fn test_pick_greeting_uses_rng() {
        let catalog = Arc::new(ResponseCatalog {
            greetings: vec![template("G1", &[]), template("G2", &[])],
            fallback: vec![template("F", &[])],
            ..Default::default()
        });
        let matcher = Matcher::new(catalog).unwrap();
        let mut rng = SequenceRandom::new(vec![0.1, 0.7]);
        assert_eq!(matcher.pick_greeting(&mut rng).reply_text, "G1");
        assert_eq!(matcher.pick_greeting(&mut rng).reply_text, "G2");
    }

    #[test]
    fn test_huge_message_does_not_overflow() {
        let keywords = vec!["a"; 10_000];
        let matcher = Matcher::new(catalog_with(vec![template("Many", &keywords)])).unwrap();
        let message = "a ".repeat(30_000);

        let ranked = matcher.rank(&message);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].template.reply_text, "Many");
        // 10_000 * (10 + 30_000 * 3)
        assert_eq!(ranked[0].score, 900_100_000);
    }

    #[test]
    fn test_bundled_catalog_answers_pricing() {
        let matcher = Matcher::new(Arc::new(ResponseCatalog::bundled().unwrap())).unwrap();
        let ranked = matcher.rank("how much does it cost");
        assert!(!ranked.is_empty());
        assert!(ranked.iter().all(|s| s.category != Category::Fallback));
        assert_eq!(ranked[0].category, Category::Pricing);
    }
}
