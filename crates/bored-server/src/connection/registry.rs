//! Registry of online agents

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::Rng;

use bored_core::AgentId;

use super::agent::Agent;

/// Index of the agents that are currently connected.
///
/// Holds only weak references: an agent is owned by its connection task and
/// the registry never keeps one alive. Every operation takes one short lock.
pub struct AgentRegistry {
    entries: Mutex<Entries>,
}

#[derive(Default)]
struct Entries {
    /// Dense list for O(1) uniform selection
    agents: Vec<(AgentId, Weak<Agent>)>,
    /// Position of each agent in `agents`
    index: HashMap<AgentId, usize>,
}

impl Entries {
    fn remove(&mut self, id: AgentId) -> bool {
        let Some(pos) = self.index.remove(&id) else {
            return false;
        };
        self.agents.swap_remove(pos);
        if let Some((moved, _)) = self.agents.get(pos) {
            self.index.insert(*moved, pos);
        }
        true
    }
}

impl AgentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Add an agent. Returns false if it was already registered.
    pub fn register(&self, agent: &Arc<Agent>) -> bool {
        let mut entries = self.entries.lock();
        let id = agent.id();
        if entries.index.contains_key(&id) {
            return false;
        }
        let pos = entries.agents.len();
        entries.agents.push((id, Arc::downgrade(agent)));
        entries.index.insert(id, pos);
        true
    }

    /// Remove an agent. Returns false if it was not registered.
    pub fn unregister(&self, id: AgentId) -> bool {
        self.entries.lock().remove(id)
    }

    /// Pick one connected agent uniformly at random.
    ///
    /// Entries whose agent is gone or whose transport has closed are pruned
    /// on the way.
    pub fn select_random(&self) -> Option<Arc<Agent>> {
        let mut entries = self.entries.lock();
        let mut rng = rand::thread_rng();

        while !entries.agents.is_empty() {
            let pos = rng.gen_range(0..entries.agents.len());
            let (id, weak) = &entries.agents[pos];
            let id = *id;

            match weak.upgrade() {
                Some(agent) if agent.is_connected() => return Some(agent),
                _ => {
                    tracing::debug!("Pruning stale registry entry for {}", id);
                    entries.remove(id);
                }
            }
        }

        None
    }

    /// Look up an agent by ID
    pub fn get(&self, id: AgentId) -> Option<Arc<Agent>> {
        let entries = self.entries.lock();
        let pos = *entries.index.get(&id)?;
        entries.agents[pos].1.upgrade()
    }

    /// Whether an agent is registered
    pub fn contains(&self, id: AgentId) -> bool {
        self.entries.lock().index.contains_key(&id)
    }

    /// All registered agents that are still alive
    pub fn list(&self) -> Vec<Arc<Agent>> {
        self.entries
            .lock()
            .agents
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.entries.lock().agents.len()
    }

    /// Check if no agents are registered
    pub fn is_empty(&self) -> bool {
        self.entries.lock().agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
