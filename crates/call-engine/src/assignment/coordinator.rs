//! # Assignment Coordinator
//!
//! Turns a selector decision into a committed claim. One round looks like:
//!
//! ```text
//! snapshot ──▶ select ──▶ try_claim ──┬─ Claimed ──▶ notify agent, done
//!                ▲                    ├─ Conflict ─▶ drop candidate ─┐
//!                └────────────────────┴─ NotFound ─▶ drop candidate ─┘
//! ```
//!
//! The snapshot is taken once per round and every lost claim shrinks the
//! local pool, so a round makes at most one claim attempt per candidate and
//! always terminates. The registry, not the snapshot, decides who wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use callcenter_infra_common::ErrorContext;
use tracing::{debug, error, info, warn};

use crate::agent::{AgentId, AgentPresence};
use crate::error::Result;
use crate::events::{EventBus, PresenceEvent};
use crate::presence::{ClaimOutcome, PresenceRegistry, ReleaseOutcome};
use crate::routing::{AgentSelector, CallRequirements, RoutingDecision, RoutingStrategy};
use super::attempt::CallAssignmentAttempt;

/// Inputs of one selection round
#[derive(Debug, Clone, Copy)]
pub struct AssignmentRequest<'a> {
    pub call_id: &'a str,
    pub phone_number: &'a str,
    pub queue_id: Option<&'a str>,
    pub requirements: &'a CallRequirements,
    pub strategy: RoutingStrategy,
    /// Restrict candidates to these agents; `None` means everyone
    pub queue_members: Option<&'a [AgentId]>,
    pub excluded: &'a [AgentId],
    /// Set when the caller hangs up mid-round
    pub cancelled: Option<&'a AtomicBool>,
}

impl AssignmentRequest<'_> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.map(|flag| flag.load(Ordering::SeqCst)).unwrap_or(false)
    }
}

/// How a selection round ended. Lost races and exhaustion are outcomes,
/// not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentOutcome {
    Assigned {
        agent: AgentPresence,
        strategy: RoutingStrategy,
        conflicts: u32,
    },
    NoAgentAvailable {
        conflicts: u32,
    },
    /// The call was abandoned; any agent claimed on the way was released
    Cancelled {
        conflicts: u32,
    },
}

impl AssignmentOutcome {
    pub fn conflicts(&self) -> u32 {
        match self {
            AssignmentOutcome::Assigned { conflicts, .. }
            | AssignmentOutcome::NoAgentAvailable { conflicts }
            | AssignmentOutcome::Cancelled { conflicts } => *conflicts,
        }
    }
}

pub struct AssignmentCoordinator {
    registry: Arc<dyn PresenceRegistry>,
    selector: AgentSelector,
    events: Arc<EventBus>,
}

impl AssignmentCoordinator {
    pub fn new(registry: Arc<dyn PresenceRegistry>, selector: AgentSelector, events: Arc<EventBus>) -> Self {
        Self { registry, selector, events }
    }

    pub fn registry(&self) -> &Arc<dyn PresenceRegistry> {
        &self.registry
    }

    pub fn selector(&self) -> &AgentSelector {
        &self.selector
    }

    /// Run one selection round and claim an agent for the call.
    ///
    /// `Err` only for registry failures; no agent is left claimed when it is
    /// returned.
    pub async fn assign(&self, request: AssignmentRequest<'_>) -> Result<AssignmentOutcome> {
        let snapshot = self.registry.snapshot_available().await?;
        let mut pool: Vec<AgentPresence> = match request.queue_members {
            Some(members) if !members.is_empty() => {
                snapshot.into_iter().filter(|a| members.contains(&a.agent_id)).collect()
            }
            _ => snapshot,
        };

        let limit = match self.selector.config().max_claim_attempts {
            0 => pool.len(),
            n => n.min(pool.len()),
        };

        debug!("🔍 Call {}: {} candidates, {} excluded, strategy {}",
               request.call_id, pool.len(), request.excluded.len(), request.strategy);

        let mut conflicts = 0u32;
        for _ in 0..limit {
            if request.is_cancelled() {
                info!("🚫 Call {} abandoned during selection", request.call_id);
                return Ok(AssignmentOutcome::Cancelled { conflicts });
            }

            let decision = self.selector.select(&pool, request.requirements, request.strategy, request.excluded);
            let RoutingDecision::Agent { agent_id, strategy } = decision else {
                break;
            };

            match self.registry.try_claim(&agent_id, request.call_id).await? {
                ClaimOutcome::Claimed(agent) => {
                    if request.is_cancelled() {
                        self.release_for_cancelled_call(&agent_id, request.call_id).await;
                        return Ok(AssignmentOutcome::Cancelled { conflicts });
                    }

                    info!("🎯 Call {} assigned to agent {} via {}", request.call_id, agent_id, strategy);
                    self.events.publish(PresenceEvent::IncomingCall {
                        agent_id: agent_id.clone(),
                        call_id: request.call_id.to_string(),
                        phone_number: request.phone_number.to_string(),
                        queue_id: request.queue_id.map(str::to_string),
                    });
                    return Ok(AssignmentOutcome::Assigned { agent, strategy, conflicts });
                }
                ClaimOutcome::Conflict(reason) => {
                    conflicts += 1;
                    debug!("⚔️ Claim on {} for call {} conflicted ({:?}); trying next candidate",
                           agent_id, request.call_id, reason);
                    pool.retain(|a| a.agent_id != agent_id);
                }
                ClaimOutcome::NotFound => {
                    debug!("Agent {} vanished before claim for call {}", agent_id, request.call_id);
                    pool.retain(|a| a.agent_id != agent_id);
                }
            }
        }

        info!("📭 No agent available for call {} ({} conflicts)", request.call_id, conflicts);
        Ok(AssignmentOutcome::NoAgentAvailable { conflicts })
    }

    /// Claim one specific agent (outbound calls)
    pub async fn claim_agent(&self, agent_id: &AgentId, call_id: &str) -> Result<ClaimOutcome> {
        let outcome = self.registry.try_claim(agent_id, call_id).await?;
        if outcome.is_claimed() {
            info!("📞 Agent {} claimed for outbound call {}", agent_id, call_id);
        }
        Ok(outcome)
    }

    /// Release the agent from `call_id` and tell supervisors if it rejoined
    /// the pool. Safe to call repeatedly.
    pub async fn release_agent(&self, agent_id: &AgentId, call_id: Option<&str>) -> Result<ReleaseOutcome> {
        let outcome = self.registry.release(agent_id, call_id).await?;
        if outcome == (ReleaseOutcome::Released { available: true }) {
            self.events.publish(PresenceEvent::AgentAvailable { agent_id: agent_id.clone() });
        }
        Ok(outcome)
    }

    /// Dial-failure path: exclude the agent from this call for good, then
    /// release it. The exclusion is recorded even if the release fails.
    pub async fn handle_dial_failure(
        &self,
        attempt: &mut CallAssignmentAttempt,
        agent_id: &AgentId,
        reason: &str,
    ) -> Result<ReleaseOutcome> {
        attempt.exclude(agent_id.clone(), reason);
        warn!("📵 Agent {} failed call {} ({}); excluded after {} retries",
              agent_id, attempt.call_id, reason, attempt.retry_count);
        let call_id = attempt.call_id.clone();
        self.release_agent(agent_id, Some(&call_id)).await
    }

    async fn release_for_cancelled_call(&self, agent_id: &AgentId, call_id: &str) {
        match self.release_agent(agent_id, Some(call_id)).await {
            Ok(_) => info!("🔓 Released agent {} claimed for abandoned call {}", agent_id, call_id),
            Err(e) => {
                let ctx = ErrorContext::new("assignment_coordinator", "release")
                    .with_detail("call_id", call_id)
                    .with_detail("agent_id", agent_id);
                error!("Failed to release agent for abandoned call {}: {}", ctx, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::agent::{AgentStatus, SessionMeta};
    use crate::events::InMemoryNotificationChannel;
    use crate::presence::{InMemoryPresenceRegistry, PresenceStats, RegistryOutcome};

    async fn setup(agents: &[&str]) -> (AssignmentCoordinator, Arc<InMemoryPresenceRegistry>) {
        let registry = Arc::new(InMemoryPresenceRegistry::new());
        for agent in agents {
            registry.register_agent(&AgentId::from(*agent), SessionMeta::new(*agent)).await.unwrap();
        }
        let events = Arc::new(EventBus::new(Arc::new(InMemoryNotificationChannel::new()), 16));
        (AssignmentCoordinator::new(registry.clone(), AgentSelector::default(), events), registry)
    }

    fn request<'a>(call_id: &'a str, requirements: &'a CallRequirements, excluded: &'a [AgentId]) -> AssignmentRequest<'a> {
        AssignmentRequest {
            call_id,
            phone_number: "+15550100",
            queue_id: None,
            requirements,
            strategy: RoutingStrategy::RoundRobin,
            queue_members: None,
            excluded,
            cancelled: None,
        }
    }

    fn assigned(outcome: &AssignmentOutcome) -> &str {
        match outcome {
            AssignmentOutcome::Assigned { agent, .. } => agent.agent_id.as_ref(),
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_assigns_and_removes_agent_from_snapshot() {
        let (coordinator, registry) = setup(&["A1", "B1"]).await;
        let requirements = CallRequirements::new();

        let outcome = coordinator.assign(request("c-1", &requirements, &[])).await.unwrap();
        assert_eq!(assigned(&outcome), "A1");

        let snapshot = registry.snapshot_available().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].agent_id, AgentId::from("B1"));
        let a1 = registry.get(&AgentId::from("A1")).await.unwrap().unwrap();
        assert_eq!(a1.current_calls, 1);
    }

    #[tokio::test]
    async fn test_empty_pool_is_not_an_error() {
        let (coordinator, _) = setup(&[]).await;
        let requirements = CallRequirements::new();
        let outcome = coordinator.assign(request("c-1", &requirements, &[])).await.unwrap();
        assert_eq!(outcome, AssignmentOutcome::NoAgentAvailable { conflicts: 0 });
    }

    #[tokio::test]
    async fn test_queue_membership_limits_candidates() {
        let (coordinator, _) = setup(&["A1", "B1"]).await;
        let requirements = CallRequirements::new();
        let members = vec![AgentId::from("B1")];
        let mut req = request("c-1", &requirements, &[]);
        req.queue_members = Some(&members);

        let outcome = coordinator.assign(req).await.unwrap();
        assert_eq!(assigned(&outcome), "B1");
    }

    #[tokio::test]
    async fn test_dial_failure_excludes_and_next_round_picks_other_agent() {
        let (coordinator, registry) = setup(&["A1", "B1"]).await;
        let requirements = CallRequirements::new();
        let mut attempt = CallAssignmentAttempt::new("c-1");

        let first = coordinator.assign(request("c-1", &requirements, &attempt.excluded_agent_ids)).await.unwrap();
        assert_eq!(assigned(&first), "A1");

        let released = coordinator.handle_dial_failure(&mut attempt, &AgentId::from("A1"), "no-answer").await.unwrap();
        assert_eq!(released, ReleaseOutcome::Released { available: true });
        assert_eq!(attempt.excluded_agent_ids, vec![AgentId::from("A1")]);

        // A1 is back in the pool but stays excluded for this call
        let second = coordinator.assign(request("c-1", &requirements, &attempt.excluded_agent_ids)).await.unwrap();
        assert_eq!(assigned(&second), "B1");

        let third = coordinator.assign(request("c-1", &requirements, &attempt.excluded_agent_ids)).await.unwrap();
        assert_eq!(third, AssignmentOutcome::NoAgentAvailable { conflicts: 0 });
        assert!(registry.get(&AgentId::from("A1")).await.unwrap().unwrap().is_available);
    }

    #[tokio::test]
    async fn test_cancelled_round_claims_nobody() {
        let (coordinator, registry) = setup(&["A1"]).await;
        let requirements = CallRequirements::new();
        let cancelled = AtomicBool::new(true);
        let mut req = request("c-1", &requirements, &[]);
        req.cancelled = Some(&cancelled);

        let outcome = coordinator.assign(req).await.unwrap();
        assert_eq!(outcome, AssignmentOutcome::Cancelled { conflicts: 0 });
        assert_eq!(registry.snapshot_available().await.unwrap().len(), 1);
    }

    /// Registry whose snapshot is stale: it still lists agents that are
    /// already on a call, so every claim on them conflicts.
    struct StaleSnapshotRegistry {
        inner: InMemoryPresenceRegistry,
        stale: Vec<AgentPresence>,
    }

    #[async_trait]
    impl PresenceRegistry for StaleSnapshotRegistry {
        async fn register_agent(&self, agent_id: &AgentId, meta: SessionMeta) -> Result<RegistryOutcome> {
            self.inner.register_agent(agent_id, meta).await
        }
        async fn deregister_agent(&self, agent_id: &AgentId) -> Result<RegistryOutcome> {
            self.inner.deregister_agent(agent_id).await
        }
        async fn set_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<RegistryOutcome> {
            self.inner.set_status(agent_id, status).await
        }
        async fn snapshot_available(&self) -> Result<Vec<AgentPresence>> {
            Ok(self.stale.clone())
        }
        async fn try_claim(&self, agent_id: &AgentId, call_id: &str) -> Result<ClaimOutcome> {
            self.inner.try_claim(agent_id, call_id).await
        }
        async fn release(&self, agent_id: &AgentId, call_id: Option<&str>) -> Result<ReleaseOutcome> {
            self.inner.release(agent_id, call_id).await
        }
        async fn get(&self, agent_id: &AgentId) -> Result<Option<AgentPresence>> {
            self.inner.get(agent_id).await
        }
        async fn statistics(&self) -> Result<PresenceStats> {
            self.inner.statistics().await
        }
    }

    #[tokio::test]
    async fn test_lost_races_fall_through_to_next_candidate() {
        let inner = InMemoryPresenceRegistry::new();
        for id in ["A1", "B1", "C1"] {
            inner.register_agent(&AgentId::from(id), SessionMeta::new(id)).await.unwrap();
        }
        let stale = inner.snapshot_available().await.unwrap();
        // Another router grabbed A1 and B1 after the snapshot
        inner.try_claim(&AgentId::from("A1"), "other-1").await.unwrap();
        inner.try_claim(&AgentId::from("B1"), "other-2").await.unwrap();

        let registry = Arc::new(StaleSnapshotRegistry { inner, stale });
        let events = Arc::new(EventBus::new(Arc::new(InMemoryNotificationChannel::new()), 16));
        let coordinator = AssignmentCoordinator::new(registry, AgentSelector::default(), events);

        let requirements = CallRequirements::new();
        let outcome = coordinator.assign(request("c-1", &requirements, &[])).await.unwrap();
        assert_eq!(assigned(&outcome), "C1");
        assert_eq!(outcome.conflicts(), 2);

        let exhausted = coordinator.assign(request("c-2", &requirements, &[])).await.unwrap();
        assert_eq!(exhausted, AssignmentOutcome::NoAgentAvailable { conflicts: 3 });
    }
}
