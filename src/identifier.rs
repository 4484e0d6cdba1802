//! Relational identifier sanitization.
//!
//! Every table and column name the engine interpolates into statement text goes
//! through [`IdentifierPolicy::sanitize`]. The reserved-word list is owned by
//! the policy so that each storage back end can supply its own keywords.

use std::collections::BTreeSet;

const STANDARD_RESERVED_WORDS: &[&str] = &[
    "from",
    "to",
    "user",
    "group",
    "order",
    "by",
    "select",
    "insert",
    "update",
    "delete",
    "create",
    "table",
    "view",
    "grant",
    "revoke",
    "alter",
    "column",
    "constraint",
    "index",
    "function",
    "procedure",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierPolicy {
    reserved: BTreeSet<String>,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl IdentifierPolicy {
    /// Policy carrying the common relational keyword set.
    pub fn standard() -> Self {
        Self {
            reserved: STANDARD_RESERVED_WORDS
                .iter()
                .map(|word| word.to_string())
                .collect(),
        }
    }

    /// Adds back-end specific keywords on top of the current set.
    pub fn with_reserved_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reserved.extend(
            words
                .into_iter()
                .map(|word| word.as_ref().trim().to_ascii_lowercase())
                .filter(|word| !word.is_empty()),
        );
        self
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        self.reserved.contains(word)
    }

    pub fn reserved_words(&self) -> impl Iterator<Item = &str> {
        self.reserved.iter().map(String::as_str)
    }

    /// Maps arbitrary text to an identifier matching `^[a-z_][a-z0-9_]*$`.
    ///
    /// Input made only of symbols or digits collapses to the empty string;
    /// callers that need a usable name must check for that.
    pub fn sanitize(&self, name: &str) -> String {
        let replaced = name
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => c,
                _ => '_',
            })
            .collect::<String>();
        let stripped = replaced.trim_start_matches(|c: char| !(c.is_ascii_alphabetic() || c == '_'));
        let lowered = stripped.to_ascii_lowercase();
        if self.is_reserved(&lowered) {
            format!("_{lowered}")
        } else {
            lowered
        }
    }

    /// Override lookup key for a column of a table.
    pub fn override_key(&self, table: &str, column: &str) -> String {
        format!("{}.{}", self.sanitize(table), self.sanitize(column))
    }
}

/// Sanitizes with the standard policy.
pub fn sanitize(name: &str) -> String {
    IdentifierPolicy::standard().sanitize(name)
}

pub fn is_valid_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
