use serde::Deserialize;

/// Per-session settings of an [`Agent`](crate::Agent).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// The maximum number of tool execution phases in a single turn.
    ///
    /// When the model still asks for tools after this many phases, the
    /// turn ends with [`TurnStatus::Exhausted`](crate::TurnStatus).
    pub max_iterations: usize,
    /// The instruction prepended to every model request.
    ///
    /// It is never stored in the conversation.
    pub system_prompt: String,
}

impl AgentConfig {
    /// The default value of [`max_iterations`](Self::max_iterations).
    pub const DEFAULT_MAX_ITERATIONS: usize = 5;
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            system_prompt: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_deserialize() {
        let config: AgentConfig =
            serde_json::from_str(r#"{ "max_iterations": 2 }"#).unwrap();
        assert_eq!(config.max_iterations, 2);
        assert!(config.system_prompt.is_empty());
    }
}
