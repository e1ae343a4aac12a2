/// Elimination rules: the persisted document format, compiled term matchers and the
/// lazily-loaded store that serves them.
pub mod document;
pub mod matcher;
pub mod store;

pub use document::{CategoryRules, EliminationRule, EliminationRuleKind, RuleDocument, RuleMetadata};
pub use matcher::{Span, TermSet};
pub use store::{CompiledRule, RuleSource, RuleStore, RuleTable};
