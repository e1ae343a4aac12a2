use crate::error::{ReasoningError, ReasoningResult};

/// Limits that bound a conversation. All are data-driven constants, never wall-clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rounds of questions before classification is forced.
    pub max_rounds: u32,
    /// Questions in one merged batch.
    pub max_questions_per_round: usize,
    /// Hierarchy questions taken by the upfront selection.
    pub max_hierarchy_questions: usize,
    /// Coverage fallback questions in one batch.
    pub max_fallback_questions: usize,
    /// When only tariff-level questions remain, this many surviving pathways or fewer
    /// are allowed to default.
    pub tariff_default_pathways: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_questions_per_round: 5,
            max_hierarchy_questions: 4,
            max_fallback_questions: 3,
            tariff_default_pathways: 3,
        }
    }
}

impl EngineConfig {
    /// Optional overrides:
    /// - `HS_MAX_ROUNDS`
    /// - `HS_MAX_QUESTIONS`
    /// - `HS_MAX_HIERARCHY_QUESTIONS`
    /// - `HS_MAX_FALLBACK_QUESTIONS`
    pub fn from_env() -> ReasoningResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ReasoningResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_rounds: positive(&lookup, "HS_MAX_ROUNDS")?.unwrap_or(defaults.max_rounds),
            max_questions_per_round: positive(&lookup, "HS_MAX_QUESTIONS")?
                .unwrap_or(defaults.max_questions_per_round),
            max_hierarchy_questions: positive(&lookup, "HS_MAX_HIERARCHY_QUESTIONS")?
                .unwrap_or(defaults.max_hierarchy_questions),
            max_fallback_questions: positive(&lookup, "HS_MAX_FALLBACK_QUESTIONS")?
                .unwrap_or(defaults.max_fallback_questions),
            tariff_default_pathways: defaults.tariff_default_pathways,
        })
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> ReasoningResult<Option<T>>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(Some(value)),
        Ok(_) => Err(ReasoningError::Config(format!("{key} must be greater than zero"))),
        Err(_) => Err(ReasoningError::Config(format!(
            "{key} must be a positive integer, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_rounds, 3);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = EngineConfig::from_lookup(|key| match key {
            "HS_MAX_ROUNDS" => Some("5".to_string()),
            "HS_MAX_QUESTIONS" => Some(" 2 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.max_questions_per_round, 2);
        assert_eq!(config.max_fallback_questions, 3);
    }

    #[test]
    fn test_zero_and_garbage_are_rejected() {
        let zero = EngineConfig::from_lookup(|key| (key == "HS_MAX_ROUNDS").then(|| "0".to_string()));
        assert!(matches!(zero, Err(ReasoningError::Config(_))));

        let garbage =
            EngineConfig::from_lookup(|key| (key == "HS_MAX_QUESTIONS").then(|| "many".to_string()));
        assert!(matches!(garbage, Err(ReasoningError::Config(_))));
    }
}
