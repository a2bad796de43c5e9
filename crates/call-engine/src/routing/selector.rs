//! # Agent Selector
//!
//! Pure selection logic: given a candidate list and a call's requirements,
//! pick one agent. Nothing here touches the registry, so every decision is
//! reproducible from its inputs.
//!
//! All strategies share one fairness order, used both by `round_robin` and as
//! the tie-break of the scoring strategies:
//!
//! 1. `total_calls` ascending
//! 2. `last_assigned_at` ascending, never-assigned first
//! 3. `agent_id` ascending

use std::cmp::Ordering;

use tracing::debug;

use crate::agent::{AgentId, AgentPresence};
use crate::config::RoutingConfig;
use super::strategy::{CallRequirements, RoutingDecision, RoutingStrategy};

/// Deterministic agent selector
#[derive(Debug, Clone)]
pub struct AgentSelector {
    config: RoutingConfig,
}

impl Default for AgentSelector {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

impl AgentSelector {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Choose one agent from `candidates`, never one listed in `excluded`.
    pub fn select(
        &self,
        candidates: &[AgentPresence],
        requirements: &CallRequirements,
        strategy: RoutingStrategy,
        excluded: &[AgentId],
    ) -> RoutingDecision {
        let eligible: Vec<&AgentPresence> = candidates
            .iter()
            .filter(|agent| !excluded.contains(&agent.agent_id))
            .collect();

        if eligible.is_empty() {
            return RoutingDecision::NoAgentAvailable;
        }

        let effective = self.resolve_strategy(strategy, requirements.priority);
        let (chosen, applied) = match effective {
            RoutingStrategy::SkillsBased => match self.best_skill_match(&eligible, requirements) {
                Some(agent) => (Some(agent), RoutingStrategy::SkillsBased),
                None => {
                    debug!("No agent holds {:?}, falling back to round robin", requirements.required_skills);
                    (Self::round_robin(&eligible), RoutingStrategy::RoundRobin)
                }
            },
            RoutingStrategy::Weighted => (self.highest_weight(&eligible), RoutingStrategy::Weighted),
            _ => (Self::round_robin(&eligible), RoutingStrategy::RoundRobin),
        };

        match chosen {
            Some(agent) => RoutingDecision::Agent {
                agent_id: agent.agent_id.clone(),
                strategy: applied,
            },
            None => RoutingDecision::NoAgentAvailable,
        }
    }

    /// Map `priority` onto a concrete strategy using the configured thresholds.
    /// Other strategies are returned unchanged.
    pub fn resolve_strategy(&self, strategy: RoutingStrategy, priority: u8) -> RoutingStrategy {
        if strategy != RoutingStrategy::Priority {
            return strategy;
        }

        if priority >= self.config.high_priority_threshold {
            RoutingStrategy::Weighted
        } else if priority >= self.config.medium_priority_threshold {
            RoutingStrategy::SkillsBased
        } else {
            RoutingStrategy::RoundRobin
        }
    }

    /// Sum of the agent's levels in the required skills, or `None` if any
    /// required skill is missing or below the minimum level
    pub fn skill_score(&self, agent: &AgentPresence, required: &[String]) -> Option<u32> {
        required.iter().try_fold(0u32, |score, skill| {
            agent.session.profile
                .skill_level(skill)
                .filter(|level| *level >= self.config.min_skill_level)
                .map(|level| score + u32::from(level))
        })
    }

    /// base + satisfaction bonus - load penalty
    pub fn agent_weight(&self, agent: &AgentPresence) -> f64 {
        let satisfaction = agent.session.profile.satisfaction_score.unwrap_or(0.0);
        self.config.weighted_base_score
            + satisfaction * self.config.performance_bonus_per_point
            - f64::from(agent.current_calls) * self.config.load_penalty_per_call
    }

    fn round_robin<'a>(eligible: &[&'a AgentPresence]) -> Option<&'a AgentPresence> {
        eligible.iter().copied().min_by(|a, b| fairness_order(a, b))
    }

    fn best_skill_match<'a>(
        &self,
        eligible: &[&'a AgentPresence],
        requirements: &CallRequirements,
    ) -> Option<&'a AgentPresence> {
        eligible
            .iter()
            .filter_map(|agent| self.skill_score(agent, &requirements.required_skills).map(|s| (*agent, s)))
            .min_by(|(a, score_a), (b, score_b)| score_b.cmp(score_a).then_with(|| fairness_order(a, b)))
            .map(|(agent, _)| agent)
    }

    fn highest_weight<'a>(&self, eligible: &[&'a AgentPresence]) -> Option<&'a AgentPresence> {
        eligible
            .iter()
            .map(|agent| (*agent, self.agent_weight(agent)))
            .min_by(|(a, weight_a), (b, weight_b)| {
                weight_b.total_cmp(weight_a).then_with(|| fairness_order(a, b))
            })
            .map(|(agent, _)| agent)
    }
}

/// Least-used first, then longest idle, then by id
pub fn fairness_order(a: &AgentPresence, b: &AgentPresence) -> Ordering {
    a.total_calls
        .cmp(&b.total_calls)
        .then_with(|| a.last_assigned_at.cmp(&b.last_assigned_at))
        .then_with(|| a.agent_id.cmp(&b.agent_id))
}
