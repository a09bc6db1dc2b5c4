// src/summarize/extractive.rs
//! Deterministic extractive summary used when the generative backend is unavailable.
//!
//! Sentences are split on terminal punctuation, short fragments dropped, and the first
//! ten candidates scored by position and length. The three best become the bullets,
//! emitted in their original order.

use once_cell::sync::OnceCell;
use regex::Regex;

use super::relevance::{relevance_for, GENERIC_RELEVANCE};
use super::{Digest, DigestLimits, DigestSource, PLACEHOLDER_BULLETS};
use crate::ingest::normalize_text;
use crate::ingest::types::FeedItem;

/// Fragments at or below this many characters are not sentences.
const MIN_SENTENCE_CHARS: usize = 20;
/// Only the leading sentences are scored.
const MAX_CANDIDATES: usize = 10;
const TITLE_WORDS: usize = 8;

const POSITION_WEIGHT: f64 = 0.6;
const LENGTH_WEIGHT: f64 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSentence {
    pub index: usize,
    pub text: String,
    pub score: f64,
}

pub fn split_sentences(text: &str) -> Vec<String> {
    static RE_TERMINAL: OnceCell<Regex> = OnceCell::new();
    let re = RE_TERMINAL.get_or_init(|| Regex::new(r"[.!?]+").unwrap());
    re.split(text)
        .map(str::trim)
        .filter(|s| s.chars().count() > MIN_SENTENCE_CHARS)
        .map(String::from)
        .collect()
}

/// Score the leading sentences. `position = 1 - i/n` over all kept sentences,
/// `length = min(chars/100, 1)`.
pub fn score_sentences(sentences: &[String]) -> Vec<ScoredSentence> {
    let n = sentences.len() as f64;
    sentences
        .iter()
        .take(MAX_CANDIDATES)
        .enumerate()
        .map(|(i, s)| {
            let position = 1.0 - (i as f64 / n);
            let length = (s.chars().count() as f64 / 100.0).min(1.0);
            ScoredSentence {
                index: i,
                text: s.clone(),
                score: POSITION_WEIGHT * position + LENGTH_WEIGHT * length,
            }
        })
        .collect()
}

/// Top `k` by score, ties kept in original order (stable sort).
pub fn top_ranked(text: &str, k: usize) -> Vec<ScoredSentence> {
    let mut scored = score_sentences(&split_sentences(text));
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

fn first_words(s: &str, n: usize) -> String {
    s.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

fn degraded(item: &FeedItem, limits: &DigestLimits) -> Digest {
    limits.enforce(Digest {
        title: item.title.clone(),
        bullets: PLACEHOLDER_BULLETS.iter().map(|s| s.to_string()).collect(),
        relevance: GENERIC_RELEVANCE.to_string(),
        source_kind: DigestSource::Fallback,
    })
}

/// Build a fallback digest from the item's content. Never fails; unusable content
/// yields a degraded digest built from the item title.
pub fn summarize(item: &FeedItem, limits: &DigestLimits) -> Digest {
    let text = normalize_text(&item.content);
    if text.is_empty() {
        return degraded(item, limits);
    }

    let top = top_ranked(&text, 3);
    let Some(best) = top.first() else {
        return degraded(item, limits);
    };
    let title = first_words(&best.text, TITLE_WORDS);

    let mut chosen = top.clone();
    chosen.sort_by_key(|s| s.index);
    let bullets = chosen.into_iter().map(|s| s.text).collect();

    let relevance = relevance_for(&format!("{} {}", item.title, text)).to_string();

    limits.enforce(Digest {
        title,
        bullets,
        relevance,
        source_kind: DigestSource::Fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str) -> FeedItem {
        FeedItem {
            title: "Original headline for the article".into(),
            link: "https://example.com/a".into(),
            published: None,
            content: content.into(),
            source_url: "https://example.com/feed".into(),
            guid: None,
        }
    }

    #[test]
    fn drops_short_fragments() {
        let s = split_sentences("Too short. This sentence is long enough to count! Ok?");
        assert_eq!(s, vec!["This sentence is long enough to count".to_string()]);
    }

    #[test]
    fn scores_position_and_length() {
        let sentences = vec!["a".repeat(50), "b".repeat(150)];
        let scored = score_sentences(&sentences);
        // i=0: 0.6*1.0 + 0.4*0.5 = 0.8 ; i=1: 0.6*0.5 + 0.4*1.0 = 0.7
        assert!((scored[0].score - 0.8).abs() < 1e-9);
        assert!((scored[1].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn only_first_ten_are_candidates() {
        let text: String = (0..15)
            .map(|i| format!("Sentence number {i} has enough characters in it. "))
            .collect();
        let scored = score_sentences(&split_sentences(&text));
        assert_eq!(scored.len(), 10);
    }

    #[test]
    fn bullets_follow_original_order() {
        // The long third sentence outranks the second one.
        let content = "The first sentence sets the scene for readers. \
                       Short but valid second line here. \
                       The third sentence is much longer and carries a lot more detail about the event. \
                       A fourth sentence closes things out nicely.";
        let d = summarize(&item(content), &DigestLimits::default());
        assert_eq!(d.source_kind, DigestSource::Fallback);
        assert_eq!(d.bullets.len(), 3);
        assert_eq!(d.bullets[0], "The first sentence sets the scene for readers");
        assert!(d.bullets[1].starts_with("Short but valid"));
        assert!(d.bullets[2].starts_with("The third sentence"));
        assert_eq!(d.title, "The first sentence sets the scene for readers");
    }

    #[test]
    fn empty_content_degrades_to_title() {
        let d = summarize(&item("   <p></p> "), &DigestLimits::default());
        assert_eq!(d.title, "Original headline for the article");
        assert_eq!(d.bullets.len(), 3);
        assert_eq!(d.relevance, GENERIC_RELEVANCE);
    }

    #[test]
    fn single_sentence_is_padded() {
        let d = summarize(
            &item("Only one sentence is long enough in this body. Tiny."),
            &DigestLimits::default(),
        );
        assert_eq!(d.bullets.len(), 3);
        assert_eq!(d.bullets[0], "Only one sentence is long enough in this body");
        assert_eq!(d.bullets[1], PLACEHOLDER_BULLETS[1]);
    }
}
