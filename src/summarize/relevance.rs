// src/summarize/relevance.rs
//! Keyword table → one-line "why it matters" phrase for fallback digests.

/// Used when no table row matches.
pub const GENERIC_RELEVANCE: &str = "Contains relevant information for the sector";

struct Rule {
    keywords: &'static [&'static str],
    phrase: &'static str,
}

// First matching row wins; order from specific to broad.
const TABLE: &[Rule] = &[
    Rule {
        keywords: &["vulnerability", "exploit", "breach", "ransomware", "cve-", "malware"],
        phrase: "Security exposure that may require patching or review",
    },
    Rule {
        keywords: &["regulation", "regulator", "lawsuit", "antitrust", "compliance", "fine"],
        phrase: "Regulatory or legal development with possible compliance impact",
    },
    Rule {
        keywords: &["acquisition", "acquires", "merger", "funding", "raises", "ipo"],
        phrase: "Market move that could shift the competitive landscape",
    },
    Rule {
        keywords: &["earnings", "revenue", "profit", "quarter", "forecast", "guidance"],
        phrase: "Financial results that signal the company's direction",
    },
    Rule {
        keywords: &["layoff", "layoffs", "job cuts", "restructuring", "hiring"],
        phrase: "Workforce change affecting the industry's talent market",
    },
    Rule {
        keywords: &["outage", "downtime", "disruption", "incident"],
        phrase: "Service disruption that may affect dependent users",
    },
    Rule {
        keywords: &["release", "launch", "launches", "unveils", "announces", "update"],
        phrase: "New release that users and competitors will react to",
    },
    Rule {
        keywords: &["study", "research", "paper", "scientists", "survey"],
        phrase: "New findings that may inform upcoming decisions",
    },
];

/// Pick a relevance phrase for `content`. Pure; case-insensitive whole-word matching.
pub fn relevance_for(content: &str) -> &'static str {
    let lowered = content.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect();

    TABLE
        .iter()
        .find(|rule| {
            rule.keywords.iter().any(|kw| {
                if kw.contains(' ') || kw.ends_with('-') {
                    lowered.contains(kw)
                } else {
                    words.iter().any(|w| w == kw)
                }
            })
        })
        .map(|rule| rule.phrase)
        .unwrap_or(GENERIC_RELEVANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_first_row_by_keyword() {
        assert_eq!(
            relevance_for("A critical vulnerability was found in OpenSSL."),
            TABLE[0].phrase
        );
        assert_eq!(
            relevance_for("The company ANNOUNCES a new phone."),
            "New release that users and competitors will react to"
        );
    }

    #[test]
    fn whole_words_only() {
        // "refined" must not match "fine"
        assert_eq!(relevance_for("A refined approach to gardening"), GENERIC_RELEVANCE);
    }

    #[test]
    fn phrase_keywords_match_as_substrings() {
        assert_eq!(
            relevance_for("Major job cuts expected next month"),
            "Workforce change affecting the industry's talent market"
        );
    }

    #[test]
    fn empty_input_gets_generic_phrase() {
        assert_eq!(relevance_for(""), GENERIC_RELEVANCE);
    }
}
