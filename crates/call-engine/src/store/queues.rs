//! Queue definitions, read-only from the router's point of view.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::Result;
use crate::routing::RoutingStrategy;

/// One agent's membership in a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMember {
    pub agent_id: AgentId,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl QueueMember {
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            weight: default_weight(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// A queue as configured by administrators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDefinition {
    pub queue_id: String,
    pub name: String,
    pub strategy: RoutingStrategy,

    /// Empty means "any available agent"
    #[serde(default)]
    pub members: Vec<QueueMember>,
}

impl QueueDefinition {
    pub fn new(queue_id: impl Into<String>, strategy: RoutingStrategy) -> Self {
        let queue_id = queue_id.into();
        Self {
            name: queue_id.clone(),
            queue_id,
            strategy,
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, member: QueueMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn member_ids(&self) -> Vec<AgentId> {
        self.members.iter().map(|m| m.agent_id.clone()).collect()
    }

    pub fn weights(&self) -> HashMap<AgentId, u32> {
        self.members.iter().map(|m| (m.agent_id.clone(), m.weight)).collect()
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// `Ok(None)` for an unknown queue
    async fn get_queue(&self, queue_id: &str) -> Result<Option<QueueDefinition>>;
}

#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    queues: DashMap<String, QueueDefinition>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, queue: QueueDefinition) {
        self.queues.insert(queue.queue_id.clone(), queue);
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn get_queue(&self, queue_id: &str) -> Result<Option<QueueDefinition>> {
        Ok(self.queues.get(queue_id).map(|q| q.value().clone()))
    }
}
