use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::code;

/// A taxonomy code proposed by retrieval as a possible answer.
///
/// Candidates are immutable inputs: the engine filters and partitions them but never
/// invents new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Dotted taxonomy code, e.g. "0901.11.31"
    pub code: String,
    /// Official description of the code
    pub description: String,
    /// Retrieval score (higher is better), if the retriever reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Candidate {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn chapter(&self) -> &str {
        code::chapter(&self.code)
    }

    /// Score used for aggregation; unscored candidates weigh 1.0.
    pub fn weight(&self) -> f64 {
        self.score.unwrap_or(1.0)
    }
}

/// A normalized lowercase fact token asserted by the user ("arabica", "grade a").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifier(String);

impl Modifier {
    /// Normalize raw text into a modifier. Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Modifiers accumulated over a conversation.
///
/// The set only grows: there is deliberately no removal API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModifierSet(BTreeSet<Modifier>);

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw token. Returns `true` if it was new.
    pub fn insert(&mut self, raw: &str) -> bool {
        match Modifier::new(raw) {
            Some(m) => self.0.insert(m),
            None => false,
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        Modifier::new(token).is_some_and(|m| self.0.contains(&m))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Modifier> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Extend<Modifier> for ModifierSet {
    fn extend<I: IntoIterator<Item = Modifier>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl FromIterator<Modifier> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Modifier>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().filter_map(Modifier::new).collect())
    }
}
