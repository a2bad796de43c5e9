//! Strategy names, per-call requirements, and the selector's decision type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;

/// Agent selection policy, as configured on a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Least-used agent first
    RoundRobin,

    /// Best skill match, falling back to round robin
    SkillsBased,

    /// Highest performance/load score
    Weighted,

    /// Picks one of the above from the call's priority
    Priority,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::RoundRobin => "round_robin",
            RoutingStrategy::SkillsBased => "skills_based",
            RoutingStrategy::Weighted => "weighted",
            RoutingStrategy::Priority => "priority",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(RoutingStrategy::RoundRobin),
            "skills_based" => Ok(RoutingStrategy::SkillsBased),
            "weighted" => Ok(RoutingStrategy::Weighted),
            "priority" => Ok(RoutingStrategy::Priority),
            _ => Err(format!("Unknown routing strategy: {}", s)),
        }
    }
}

/// What a call asks of the agent that takes it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequirements {
    /// Skills the agent must hold at the configured minimum level
    pub required_skills: Vec<String>,

    /// 0 (lowest) to 10 (highest)
    pub priority: u8,
}

impl CallRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.required_skills.push(skill.into());
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(10);
        self
    }
}

/// Output of the selector: a chosen agent with the algorithm that chose it,
/// or an explicit absence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RoutingDecision {
    Agent {
        agent_id: AgentId,
        /// Concrete algorithm applied; never `Priority`
        strategy: RoutingStrategy,
    },
    NoAgentAvailable,
}

impl RoutingDecision {
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            RoutingDecision::Agent { agent_id, .. } => Some(agent_id),
            RoutingDecision::NoAgentAvailable => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parses_config_spellings() {
        assert_eq!("skills_based".parse::<RoutingStrategy>().unwrap(), RoutingStrategy::SkillsBased);
        assert_eq!("Round-Robin".parse::<RoutingStrategy>().unwrap(), RoutingStrategy::RoundRobin);
        assert!("random".parse::<RoutingStrategy>().is_err());
        assert_eq!(RoutingStrategy::Weighted.to_string(), "weighted");
    }

    #[test]
    fn test_priority_is_capped() {
        assert_eq!(CallRequirements::new().with_priority(42).priority, 10);
    }
}
