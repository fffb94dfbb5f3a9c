//! Description normalization and tokenization shared by the text strategies

use std::collections::BTreeSet;

/// Tokens that carry no signal in bank statement descriptions
///
/// Lowercase; anything two characters or shorter is dropped before this list
/// is consulted.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "from", "with", "via", "payment", "purchase", "card", "debit", "credit",
    "pos", "ach", "ref", "online", "inc", "llc", "ltd", "com", "www", "usd", "transaction",
];

/// Lowercase a description and replace punctuation with spaces
///
/// Digits are kept: store numbers and dates inside descriptions are often the
/// only thing telling two merchants apart.
pub fn normalize(description: &str) -> String {
    let mut out = String::with_capacity(description.len());
    let mut last_was_space = true;

    for c in description.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }

    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Split a description into its significant tokens
///
/// Lowercased, punctuation stripped, tokens of two characters or fewer
/// dropped, stopwords dropped. Returns a set: matching cares about shared
/// vocabulary, not repetition.
pub fn tokenize(description: &str) -> BTreeSet<String> {
    normalize(description)
        .split(' ')
        .filter(|t| t.len() > 2)
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Count of tokens present in both sets
pub fn shared_token_count(a: &BTreeSet<String>, b: &BTreeSet<String>) -> usize {
    a.intersection(b).count()
}
