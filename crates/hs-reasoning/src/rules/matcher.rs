/// Case-insensitive, word-bounded term matching with span reporting.
///
/// Terms are compiled once when the rule store loads. A term gets a `\b` anchor on each
/// side that starts or ends with a word character, so "grade a" does not match
/// "grade ab" and "flavoured" does not match "unflavoured".
use regex::Regex;
use tracing::warn;

/// Byte range `(start, end)` of a match.
pub type Span = (usize, usize);

#[derive(Debug, Clone, Default)]
pub struct TermSet {
    terms: Vec<(String, Regex)>,
}

impl TermSet {
    pub fn compile<S: AsRef<str>>(terms: &[S]) -> Self {
        let mut compiled = Vec::with_capacity(terms.len());
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if term.is_empty() || compiled.iter().any(|(t, _)| *t == term) {
                continue;
            }
            match term_regex(&term) {
                Ok(re) => compiled.push((term, re)),
                Err(e) => warn!(error = %e, term, "skipping uncompilable rule term"),
            }
        }
        Self { terms: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|(t, _)| t.as_str())
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.terms.iter().any(|(_, re)| re.is_match(text))
    }

    /// Every match of every term, in term order.
    pub fn spans(&self, text: &str) -> Vec<Span> {
        self.terms
            .iter()
            .flat_map(|(_, re)| re.find_iter(text).map(|m| (m.start(), m.end())))
            .collect()
    }
}

/// Whether `inner` lies within `outer` and `outer` is strictly longer.
pub fn strictly_inside(inner: Span, outer: Span) -> bool {
    outer.0 <= inner.0 && inner.1 <= outer.1 && (outer.1 - outer.0) > (inner.1 - inner.0)
}

/// The spans of `spans` that are not strictly inside any span of `others`.
pub fn uncontained(spans: &[Span], others: &[Span]) -> Vec<Span> {
    spans
        .iter()
        .copied()
        .filter(|s| !others.iter().any(|o| strictly_inside(*s, *o)))
        .collect()
}

fn term_regex(term: &str) -> Result<Regex, regex::Error> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let head = if term.chars().next().is_some_and(is_word) { r"\b" } else { "" };
    let tail = if term.chars().last().is_some_and(is_word) { r"\b" } else { "" };
    Regex::new(&format!("(?i){head}{}{tail}", regex::escape(term)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundaries() {
        let set = TermSet::compile(&["flavoured", "grade a"]);
        assert!(set.is_match("Coffee, FLAVOURED"));
        assert!(!set.is_match("unflavoured coffee"));
        assert!(set.is_match("plantation grade a"));
        assert!(!set.is_match("grade ab"));
    }

    #[test]
    fn test_terms_are_deduplicated_and_trimmed() {
        let set = TermSet::compile(&[" Arabica ", "arabica", ""]);
        assert_eq!(set.terms().collect::<Vec<_>>(), vec!["arabica"]);
    }

    #[test]
    fn test_non_word_edges() {
        let set = TermSet::compile(&["100%"]);
        assert!(set.is_match("made of 100% cotton"));
    }

    #[test]
    fn test_uncontained_spans() {
        let include = TermSet::compile(&["decaffeinated"]);
        let exclude = TermSet::compile(&["not decaffeinated"]);
        let text = "coffee, not decaffeinated";
        let inc = include.spans(text);
        let exc = exclude.spans(text);
        assert!(uncontained(&inc, &exc).is_empty());
        assert_eq!(uncontained(&exc, &inc).len(), 1);
    }
}
