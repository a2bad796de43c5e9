//! Single-process presence registry.
//!
//! State lives behind one `parking_lot` mutex, but claims still follow the
//! optimistic protocol of a networked store: read the record's version and
//! check membership, give up the lock (the point where a remote store would
//! be doing I/O), then commit only if the version is unchanged. Every
//! mutation draws a fresh version from a registry-wide counter, so a record
//! that was deleted and re-created never matches a stale read.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::agent::{AgentId, AgentPresence, AgentStatus, SessionMeta};
use crate::error::Result;
use super::registry::{
    AgentSummary, ClaimOutcome, ConflictReason, PresenceRegistry, PresenceStats, RegistryOutcome,
    ReleaseOutcome,
};

#[derive(Debug, Clone)]
struct PresenceRecord {
    version: u64,
    status: AgentStatus,
    current_call_id: Option<String>,
    current_calls: u32,
    total_calls: u64,
    last_assigned_at: Option<DateTime<Utc>>,
    connected_at: DateTime<Utc>,
    session: SessionMeta,
}

impl PresenceRecord {
    fn view(&self, agent_id: &AgentId, is_available: bool) -> AgentPresence {
        AgentPresence {
            agent_id: agent_id.clone(),
            status: self.status,
            is_available,
            current_call_id: self.current_call_id.clone(),
            current_calls: self.current_calls,
            total_calls: self.total_calls,
            last_assigned_at: self.last_assigned_at,
            connected_at: self.connected_at,
            session: self.session.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    records: HashMap<AgentId, PresenceRecord>,
    available: HashSet<AgentId>,
    on_call: HashSet<AgentId>,
    next_version: u64,
}

impl RegistryState {
    fn next_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    fn is_available(&self, agent_id: &AgentId, record: &PresenceRecord) -> bool {
        self.available.contains(agent_id)
            && !self.on_call.contains(agent_id)
            && record.status == AgentStatus::Available
    }
}

/// In-process [`PresenceRegistry`]
#[derive(Debug, Default)]
pub struct InMemoryPresenceRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryPresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceRegistry for InMemoryPresenceRegistry {
    async fn register_agent(&self, agent_id: &AgentId, meta: SessionMeta) -> Result<RegistryOutcome> {
        let mut state = self.state.lock();
        let version = state.next_version();
        let on_call = state.on_call.contains(agent_id);
        let now = Utc::now();

        let outcome = if let Some(record) = state.records.get_mut(agent_id) {
            record.version = version;
            record.session = meta;
            record.connected_at = now;
            if !on_call {
                record.status = AgentStatus::Available;
            }
            RegistryOutcome::Reconnected
        } else {
            let record = PresenceRecord {
                version,
                status: AgentStatus::Available,
                current_call_id: None,
                current_calls: 0,
                total_calls: 0,
                last_assigned_at: None,
                connected_at: now,
                session: meta,
            };
            state.records.insert(agent_id.clone(), record);
            RegistryOutcome::Registered
        };

        if !on_call {
            state.available.insert(agent_id.clone());
        }

        info!("👤 Agent {} registered in presence registry ({:?})", agent_id, outcome);
        Ok(outcome)
    }

    async fn deregister_agent(&self, agent_id: &AgentId) -> Result<RegistryOutcome> {
        let mut state = self.state.lock();
        let Some(record) = state.records.remove(agent_id) else {
            debug!("Deregister for unknown agent {}", agent_id);
            return Ok(RegistryOutcome::NotFound);
        };

        state.available.remove(agent_id);
        state.on_call.remove(agent_id);

        info!("🔌 Agent {} removed from presence registry (call: {:?})", agent_id, record.current_call_id);
        Ok(RegistryOutcome::Deregistered { current_call_id: record.current_call_id })
    }

    async fn set_status(&self, agent_id: &AgentId, status: AgentStatus) -> Result<RegistryOutcome> {
        let mut state = self.state.lock();
        if !state.records.contains_key(agent_id) {
            return Ok(RegistryOutcome::NotFound);
        }

        let version = state.next_version();
        let on_call = state.on_call.contains(agent_id);

        let previous = match state.records.get_mut(agent_id) {
            Some(record) => {
                let previous = record.status;
                record.version = version;
                // An on-call agent asking to be available rejoins on release
                if !(on_call && matches!(status, AgentStatus::Available | AgentStatus::Busy)) {
                    record.status = status;
                }
                previous
            }
            None => return Ok(RegistryOutcome::NotFound),
        };

        if status == AgentStatus::Available && !on_call {
            state.available.insert(agent_id.clone());
        } else {
            state.available.remove(agent_id);
        }

        debug!("🔄 Agent {} status {} -> {} (on call: {})", agent_id, previous, status, on_call);
        Ok(RegistryOutcome::StatusUpdated { previous })
    }

    async fn snapshot_available(&self) -> Result<Vec<AgentPresence>> {
        let state = self.state.lock();
        let mut agents: Vec<AgentPresence> = state.available
            .difference(&state.on_call)
            .filter_map(|id| state.records.get(id).map(|r| (id, r)))
            .filter(|(_, record)| record.status == AgentStatus::Available)
            .map(|(id, record)| record.view(id, true))
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(agents)
    }

    async fn try_claim(&self, agent_id: &AgentId, call_id: &str) -> Result<ClaimOutcome> {
        // Read phase: check the precondition and remember the version we saw
        let watched_version = {
            let state = self.state.lock();
            let Some(record) = state.records.get(agent_id) else {
                return Ok(ClaimOutcome::NotFound);
            };
            if state.on_call.contains(agent_id) {
                return Ok(ClaimOutcome::Conflict(ConflictReason::AlreadyOnCall));
            }
            if !state.is_available(agent_id, record) {
                return Ok(ClaimOutcome::Conflict(ConflictReason::NotAvailable));
            }
            record.version
        };

        tokio::task::yield_now().await;

        // Commit phase: only if nobody touched the record in between
        let mut state = self.state.lock();
        match state.records.get(agent_id) {
            None => return Ok(ClaimOutcome::Conflict(ConflictReason::Deregistered)),
            Some(record) if record.version != watched_version => {
                debug!("⚔️ Claim on {} for call {} lost the race", agent_id, call_id);
                return Ok(ClaimOutcome::Conflict(ConflictReason::ConcurrentModification));
            }
            Some(_) => {}
        }

        let version = state.next_version();
        state.available.remove(agent_id);
        state.on_call.insert(agent_id.clone());

        let Some(record) = state.records.get_mut(agent_id) else {
            return Ok(ClaimOutcome::Conflict(ConflictReason::Deregistered));
        };
        record.version = version;
        record.status = AgentStatus::Busy;
        record.current_call_id = Some(call_id.to_string());
        record.current_calls += 1;
        record.total_calls += 1;
        record.last_assigned_at = Some(Utc::now());

        info!("📞 Agent {} claimed for call {} (total calls: {})", agent_id, call_id, record.total_calls);
        Ok(ClaimOutcome::Claimed(record.view(agent_id, false)))
    }

    async fn release(&self, agent_id: &AgentId, call_id: Option<&str>) -> Result<ReleaseOutcome> {
        let mut state = self.state.lock();
        let on_call = state.on_call.contains(agent_id);
        let version = state.next_version();

        let Some(record) = state.records.get_mut(agent_id) else {
            return Ok(ReleaseOutcome::NotFound);
        };

        if let Some(expected) = call_id {
            if record.current_call_id.as_deref() != Some(expected) {
                debug!("Release of {} for call {} ignored: agent is on {:?}",
                       agent_id, expected, record.current_call_id);
                return Ok(ReleaseOutcome::NotOnCall);
            }
        }

        record.version = version;
        record.current_calls = record.current_calls.saturating_sub(1);

        if !on_call {
            return Ok(ReleaseOutcome::NotOnCall);
        }

        record.current_call_id = None;
        let rejoin = matches!(record.status, AgentStatus::Busy | AgentStatus::Available);
        if rejoin {
            record.status = AgentStatus::Available;
        }

        state.on_call.remove(agent_id);
        if rejoin {
            state.available.insert(agent_id.clone());
        }

        info!("✅ Agent {} released (back in pool: {})", agent_id, rejoin);
        Ok(ReleaseOutcome::Released { available: rejoin })
    }

    async fn get(&self, agent_id: &AgentId) -> Result<Option<AgentPresence>> {
        let state = self.state.lock();
        Ok(state.records
            .get(agent_id)
            .map(|record| record.view(agent_id, state.is_available(agent_id, record))))
    }

    async fn statistics(&self) -> Result<PresenceStats> {
        let state = self.state.lock();
        let mut agents: Vec<AgentSummary> = state.records
            .iter()
            .map(|(id, record)| AgentSummary {
                agent_id: id.clone(),
                status: record.status,
                current_calls: record.current_calls,
                total_calls: record.total_calls,
                is_available: state.is_available(id, record),
                is_on_call: state.on_call.contains(id),
            })
            .collect();
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        Ok(PresenceStats {
            total_agents: agents.len(),
            available_agents: agents.iter().filter(|a| a.is_available).count(),
            on_call_agents: agents.iter().filter(|a| a.is_on_call).count(),
            agents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn meta(session: &str) -> SessionMeta {
        SessionMeta::new(session)
    }

    async fn registry_with(agents: &[&str]) -> InMemoryPresenceRegistry {
        let registry = InMemoryPresenceRegistry::new();
        for agent in agents {
            registry.register_agent(&AgentId::from(*agent), meta(agent)).await.unwrap();
        }
        registry
    }

    fn ids(agents: &[AgentPresence]) -> Vec<String> {
        agents.iter().map(|a| a.agent_id.0.clone()).collect()
    }

    #[tokio::test]
    async fn test_register_is_idempotent_and_keeps_counters() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");

        assert!(registry.try_claim(&a1, "c-1").await.unwrap().is_claimed());
        registry.release(&a1, Some("c-1")).await.unwrap();

        let outcome = registry.register_agent(&a1, meta("socket-2")).await.unwrap();
        assert_eq!(outcome, RegistryOutcome::Reconnected);

        let presence = registry.get(&a1).await.unwrap().unwrap();
        assert_eq!(presence.total_calls, 1);
        assert_eq!(presence.session.session_ref, "socket-2");
        assert!(presence.is_available);
    }

    #[tokio::test]
    async fn test_reconnect_while_on_call_does_not_rejoin_pool() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");
        registry.try_claim(&a1, "c-1").await.unwrap();

        registry.register_agent(&a1, meta("socket-2")).await.unwrap();

        assert!(registry.snapshot_available().await.unwrap().is_empty());
        let stats = registry.statistics().await.unwrap();
        assert_eq!(stats.on_call_agents, 1);
        assert_eq!(stats.available_agents, 0);
    }

    #[tokio::test]
    async fn test_snapshot_excludes_on_call_and_non_available() {
        let registry = registry_with(&["A1", "B1", "C1"]).await;
        registry.try_claim(&AgentId::from("A1"), "c-1").await.unwrap();
        registry.set_status(&AgentId::from("C1"), AgentStatus::Break).await.unwrap();

        let snapshot = registry.snapshot_available().await.unwrap();
        assert_eq!(ids(&snapshot), vec!["B1"]);
        assert!(snapshot[0].is_available);
    }

    #[tokio::test]
    async fn test_claim_moves_agent_and_bumps_counters() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");

        let ClaimOutcome::Claimed(presence) = registry.try_claim(&a1, "c-1").await.unwrap() else {
            panic!("claim should succeed");
        };
        assert_eq!(presence.status, AgentStatus::Busy);
        assert_eq!(presence.current_calls, 1);
        assert_eq!(presence.total_calls, 1);
        assert_eq!(presence.current_call_id.as_deref(), Some("c-1"));
        assert!(presence.last_assigned_at.is_some());

        assert_eq!(
            registry.try_claim(&a1, "c-2").await.unwrap(),
            ClaimOutcome::Conflict(ConflictReason::AlreadyOnCall)
        );
    }

    #[tokio::test]
    async fn test_claim_unknown_agent_is_not_found() {
        let registry = InMemoryPresenceRegistry::new();
        assert_eq!(
            registry.try_claim(&AgentId::from("ghost"), "c-1").await.unwrap(),
            ClaimOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_claim_agent_on_break_conflicts() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");
        registry.set_status(&a1, AgentStatus::Break).await.unwrap();
        assert_eq!(
            registry.try_claim(&a1, "c-1").await.unwrap(),
            ClaimOutcome::Conflict(ConflictReason::NotAvailable)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_exactly_one_winner() {
        let registry = Arc::new(registry_with(&["A1"]).await);
        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.try_claim(&AgentId::from("A1"), &format!("c-{}", i)).await.unwrap()
            }));
        }

        let mut claimed = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                ClaimOutcome::Claimed(_) => claimed += 1,
                ClaimOutcome::Conflict(_) => conflicts += 1,
                ClaimOutcome::NotFound => panic!("agent vanished"),
            }
        }
        assert_eq!(claimed, 1);
        assert_eq!(conflicts, 31);

        let presence = registry.get(&AgentId::from("A1")).await.unwrap().unwrap();
        assert_eq!(presence.current_calls, 1);
        assert_eq!(presence.total_calls, 1);
    }

    #[tokio::test]
    async fn test_release_twice_is_idempotent() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");
        registry.try_claim(&a1, "c-1").await.unwrap();

        assert_eq!(
            registry.release(&a1, None).await.unwrap(),
            ReleaseOutcome::Released { available: true }
        );
        assert_eq!(registry.release(&a1, None).await.unwrap(), ReleaseOutcome::NotOnCall);

        let presence = registry.get(&a1).await.unwrap().unwrap();
        assert_eq!(presence.current_calls, 0);
        assert_eq!(presence.status, AgentStatus::Available);
        assert!(presence.is_available);
    }

    #[tokio::test]
    async fn test_release_for_other_call_is_ignored() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");
        registry.try_claim(&a1, "c-2").await.unwrap();

        assert_eq!(registry.release(&a1, Some("c-1")).await.unwrap(), ReleaseOutcome::NotOnCall);
        let presence = registry.get(&a1).await.unwrap().unwrap();
        assert_eq!(presence.current_call_id.as_deref(), Some("c-2"));
        assert_eq!(presence.current_calls, 1);
    }

    #[tokio::test]
    async fn test_release_keeps_agent_that_went_offline_out_of_pool() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");
        registry.try_claim(&a1, "c-1").await.unwrap();
        registry.set_status(&a1, AgentStatus::Offline).await.unwrap();

        assert_eq!(
            registry.release(&a1, Some("c-1")).await.unwrap(),
            ReleaseOutcome::Released { available: false }
        );
        assert!(registry.snapshot_available().await.unwrap().is_empty());
        assert_eq!(registry.get(&a1).await.unwrap().unwrap().status, AgentStatus::Offline);
    }

    #[tokio::test]
    async fn test_release_never_resurrects_deregistered_agent() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");
        registry.try_claim(&a1, "c-1").await.unwrap();

        assert_eq!(
            registry.deregister_agent(&a1).await.unwrap(),
            RegistryOutcome::Deregistered { current_call_id: Some("c-1".to_string()) }
        );
        assert_eq!(registry.release(&a1, Some("c-1")).await.unwrap(), ReleaseOutcome::NotFound);
        assert!(registry.get(&a1).await.unwrap().is_none());
        assert_eq!(registry.statistics().await.unwrap().total_agents, 0);
    }

    #[tokio::test]
    async fn test_set_available_while_on_call_waits_for_release() {
        let registry = registry_with(&["A1"]).await;
        let a1 = AgentId::from("A1");
        registry.try_claim(&a1, "c-1").await.unwrap();

        registry.set_status(&a1, AgentStatus::Available).await.unwrap();
        assert!(registry.snapshot_available().await.unwrap().is_empty());

        registry.release(&a1, Some("c-1")).await.unwrap();
        assert_eq!(ids(&registry.snapshot_available().await.unwrap()), vec!["A1"]);
    }

    #[tokio::test]
    async fn test_unknown_agent_operations_report_not_found() {
        let registry = InMemoryPresenceRegistry::new();
        let ghost = AgentId::from("ghost");
        assert_eq!(registry.deregister_agent(&ghost).await.unwrap(), RegistryOutcome::NotFound);
        assert_eq!(registry.set_status(&ghost, AgentStatus::Available).await.unwrap(), RegistryOutcome::NotFound);
        assert_eq!(registry.release(&ghost, None).await.unwrap(), ReleaseOutcome::NotFound);
    }
}
