use crate::types::Maturity;

/// Engine tunables. The defaults mirror the behavior the app shipped with;
/// they are configuration rather than hard-coded call-site constants so
/// embedders can adjust them without forking code paths.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Hard cap on alternative versions per model message. A regeneration
    /// attempt at the cap is rejected, not silently dropped.
    pub max_versions: usize,
    /// Sampling temperature for chat turns.
    pub chat_temperature: f64,
    /// Sampling temperature for etching transcript excerpts into memory.
    pub etch_temperature: f64,
    /// Sampling temperature for consolidating the standing memory record.
    pub consolidate_temperature: f64,
    /// Base thinking budget in tokens, scaled down for lower maturity
    /// levels. `None` disables thinking entirely.
    pub thinking_budget: Option<u32>,
    /// Completion-length cap passed to the provider. `None` leaves the
    /// provider's own limit in force, so long replies and memory rewrites
    /// are never truncated by the engine.
    pub max_output_tokens: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_versions: 100,
            chat_temperature: 0.95,
            etch_temperature: 0.6,
            consolidate_temperature: 0.4,
            thinking_budget: None,
            max_output_tokens: None,
        }
    }
}

impl EngineConfig {
    /// Thinking budget for a chat turn with the given character maturity.
    /// Scaled, not gated: higher maturity levels get more of the base budget
    /// for denser narration, lower ones get little or none.
    pub fn thinking_budget_for(&self, maturity: Maturity) -> Option<u32> {
        let base = self.thinking_budget?;
        let scaled = match maturity {
            Maturity::Everyone => 0,
            Maturity::Teen => base / 4,
            Maturity::Mature => base / 2,
            Maturity::Unrestricted => base,
        };
        if scaled == 0 {
            None
        } else {
            Some(scaled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_budget_scales_with_maturity() {
        let mut config = EngineConfig::default();
        assert_eq!(config.thinking_budget_for(Maturity::Unrestricted), None);

        config.thinking_budget = Some(1024);
        assert_eq!(config.thinking_budget_for(Maturity::Everyone), None);
        assert_eq!(config.thinking_budget_for(Maturity::Teen), Some(256));
        assert_eq!(config.thinking_budget_for(Maturity::Mature), Some(512));
        assert_eq!(config.thinking_budget_for(Maturity::Unrestricted), Some(1024));
    }
}
