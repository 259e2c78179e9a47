//! Router configuration loaded from environment variables.

use crate::error::ContextorError;

/// Thresholds and retrieval knobs. All fields have defaults via `Default`.
#[derive(Clone, Debug, PartialEq)]
pub struct RouterConfig {
    /// Best score at or above this is HIGH.
    pub high: f32,
    /// Best score at or above this (and below `high`) is MEDIUM.
    pub medium: f32,
    /// Runner-up within this distance of the leader is selected too.
    pub tie_margin: f32,
    /// Hits fetched per index.
    pub search_top_k: usize,
    /// Context chunks per selected file.
    pub context_per_file: usize,
    /// Context chunks across all candidates under LOW confidence.
    pub low_context_k: usize,
    /// Default answer length cap (words).
    pub max_words: usize,
    /// Character budget for the context block of the prompt.
    pub max_ctx_chars: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            high: 0.72,
            medium: 0.55,
            tie_margin: 0.03,
            search_top_k: 8,
            context_per_file: 3,
            low_context_k: 6,
            max_words: 200,
            max_ctx_chars: 9000,
        }
    }
}

impl RouterConfig {
    /// Build from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self, ContextorError> {
        let d = Self::default();
        let cfg = Self {
            high: parse("ROUTER_HIGH", d.high)?,
            medium: parse("ROUTER_MEDIUM", d.medium)?,
            tie_margin: parse("ROUTER_TIE_MARGIN", d.tie_margin)?,
            search_top_k: parse("ROUTER_SEARCH_TOP_K", d.search_top_k)?,
            context_per_file: parse("ROUTER_CONTEXT_PER_FILE", d.context_per_file)?,
            low_context_k: parse("ROUTER_LOW_CONTEXT_K", d.low_context_k)?,
            max_words: parse("ROUTER_MAX_WORDS", d.max_words)?,
            max_ctx_chars: parse("ROUTER_MAX_CTX_CHARS", d.max_ctx_chars)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ContextorError> {
        let in_unit = |x: f32| (0.0..=1.0).contains(&x);
        if !(in_unit(self.high) && in_unit(self.medium) && self.medium <= self.high) {
            return Err(ContextorError::Config(
                "expected 0 <= ROUTER_MEDIUM <= ROUTER_HIGH <= 1".into(),
            ));
        }
        if !in_unit(self.tie_margin) {
            return Err(ContextorError::Config("ROUTER_TIE_MARGIN must be in [0, 1]".into()));
        }
        if self.search_top_k == 0 || self.context_per_file == 0 || self.low_context_k == 0 {
            return Err(ContextorError::Config("retrieval counts must be > 0".into()));
        }
        if self.max_words == 0 || self.max_ctx_chars == 0 {
            return Err(ContextorError::Config("answer and context budgets must be > 0".into()));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(k: &str, dflt: T) -> Result<T, ContextorError> {
    match std::env::var(k) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| ContextorError::Config(format!("invalid value for {k}: {v}"))),
        _ => Ok(dflt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let c = RouterConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!((c.high, c.medium, c.tie_margin), (0.72, 0.55, 0.03));
    }

    #[test]
    fn inverted_tiers_are_rejected() {
        let c = RouterConfig {
            medium: 0.8,
            high: 0.6,
            ..RouterConfig::default()
        };
        assert!(c.validate().is_err());
    }
}
