//! Engine configuration

use std::str::FromStr;

/// Model/tool round trips allowed per run segment unless configured
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 10;

/// Tunables for the run engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Capacity of the channel between a run and its consumer
    pub event_buffer: usize,
    /// Completed runs replayed as conversation history
    pub history_runs: usize,
    /// Model/tool round trips allowed per run segment
    pub max_tool_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer: 1,
            history_runs: 3,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

impl EngineConfig {
    /// Read overrides from the environment, keeping defaults for absent or
    /// malformed values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            event_buffer: parse_or(&lookup, "PLAYGROUND_EVENT_BUFFER", defaults.event_buffer)
                .max(1),
            history_runs: parse_or(&lookup, "PLAYGROUND_HISTORY_RUNS", defaults.history_runs),
            max_tool_rounds: parse_or(
                &lookup,
                "PLAYGROUND_MAX_TOOL_ROUNDS",
                defaults.max_tool_rounds,
            )
            .max(1),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn test_overrides_and_malformed_values() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("PLAYGROUND_EVENT_BUFFER", "16"),
            ("PLAYGROUND_HISTORY_RUNS", "nope"),
            ("PLAYGROUND_MAX_TOOL_ROUNDS", "0"),
        ]));
        assert_eq!(config.event_buffer, 16);
        assert_eq!(config.history_runs, 3);
        assert_eq!(config.max_tool_rounds, 1);
    }
}
