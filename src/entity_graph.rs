//! Entity co-occurrence graph
//!
//! Undirected weighted edges between memories that mention the same entity.
//! Edge weight is a co-occurrence count: every shared entity bumps the edge
//! by one, so memories sharing two entities are linked twice as strongly and
//! form cycles through the multiple paths. Traversal therefore always tracks
//! a visited set.

use crate::types::{Entity, EntityMention, EntityType, MemoryId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct GraphInner {
    /// Entity registry; identity is normalized name plus type, so
    /// "paris"/Place and "paris"/Person stay distinct records
    entities: HashMap<EntityMention, Entity>,
    /// Symmetric adjacency: memory id -> (neighbor id -> co-occurrence count)
    edges: HashMap<MemoryId, HashMap<MemoryId, u32>>,
}

/// Weighted co-occurrence links between memories sharing entities
#[derive(Default)]
pub struct EntityGraph {
    inner: RwLock<GraphInner>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `memory_id` under each mention and bump co-occurrence edges
    /// to every memory already linked to that entity. Re-extraction of a
    /// known entity merges into the existing record. Self-loops are never
    /// created.
    pub async fn link(
        &self,
        memory_id: &str,
        mentions: &BTreeSet<EntityMention>,
        at: DateTime<Utc>,
    ) {
        let mut inner = self.inner.write().await;

        for mention in mentions {
            let entity = inner
                .entities
                .entry(mention.clone())
                .or_insert_with(|| Entity {
                    name: mention.name.clone(),
                    entity_type: mention.entity_type,
                    first_seen_at: at,
                    linked_memory_ids: BTreeSet::new(),
                });

            if !entity.linked_memory_ids.insert(memory_id.to_string()) {
                continue;
            }
            let peers: Vec<MemoryId> = entity
                .linked_memory_ids
                .iter()
                .filter(|id| id.as_str() != memory_id)
                .cloned()
                .collect();

            for peer in peers {
                *inner
                    .edges
                    .entry(memory_id.to_string())
                    .or_default()
                    .entry(peer.clone())
                    .or_insert(0) += 1;
                *inner
                    .edges
                    .entry(peer)
                    .or_default()
                    .entry(memory_id.to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    /// Breadth-first context expansion up to `max_hops` hops.
    ///
    /// Returns neighbor ids in visit order: within each hop, strongly
    /// co-occurring memories come first, so a truncated hop budget keeps the
    /// best-connected context. The starting memory is not included.
    pub async fn neighbors(&self, memory_id: &str, max_hops: u32) -> Vec<MemoryId> {
        let inner = self.inner.read().await;
        let mut visited: HashSet<MemoryId> = HashSet::new();
        visited.insert(memory_id.to_string());

        let mut result = Vec::new();
        let mut frontier: VecDeque<MemoryId> = VecDeque::new();
        frontier.push_back(memory_id.to_string());

        for _ in 0..max_hops {
            let mut next_frontier: VecDeque<MemoryId> = VecDeque::new();

            while let Some(current) = frontier.pop_front() {
                let Some(adjacent) = inner.edges.get(&current) else {
                    continue;
                };

                // Descending edge weight, then id for determinism.
                let mut sorted: Vec<(&MemoryId, &u32)> = adjacent.iter().collect();
                sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

                for (neighbor, _weight) in sorted {
                    if visited.insert(neighbor.clone()) {
                        result.push(neighbor.clone());
                        next_frontier.push_back(neighbor.clone());
                    }
                }
            }

            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        result
    }

    /// Remove all incident edges and entity links for a deleted memory.
    /// Entity records survive; only their link to this memory is dropped.
    pub async fn remove_memory(&self, memory_id: &str) {
        let mut inner = self.inner.write().await;

        for entity in inner.entities.values_mut() {
            entity.linked_memory_ids.remove(memory_id);
        }

        if let Some(adjacent) = inner.edges.remove(memory_id) {
            for neighbor in adjacent.keys() {
                if let Some(back) = inner.edges.get_mut(neighbor) {
                    back.remove(memory_id);
                    if back.is_empty() {
                        inner.edges.remove(neighbor);
                    }
                }
            }
        }
    }

    /// Look up an entity record by normalized name and type
    pub async fn entity(&self, name: &str, entity_type: EntityType) -> Option<Entity> {
        let key = EntityMention::new(name, entity_type);
        self.inner.read().await.entities.get(&key).cloned()
    }

    /// Number of known entities
    pub async fn entity_count(&self) -> usize {
        self.inner.read().await.entities.len()
    }

    /// Number of undirected edges
    pub async fn edge_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.edges.values().map(|a| a.len()).sum::<usize>() / 2
    }

    /// Edge weight between two memories, if linked
    pub async fn edge_weight(&self, a: &str, b: &str) -> Option<u32> {
        self.inner
            .read()
            .await
            .edges
            .get(a)
            .and_then(|adj| adj.get(b))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn mentions(names: &[&str]) -> BTreeSet<EntityMention> {
        names
            .iter()
            .map(|n| EntityMention::new(*n, EntityType::Topic))
            .collect()
    }

    #[tokio::test]
    async fn shared_entity_creates_symmetric_edge() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        graph.link("m1", &mentions(&["coffee"]), now).await;
        graph.link("m2", &mentions(&["coffee"]), now).await;

        assert_eq!(graph.edge_weight("m1", "m2").await, Some(1));
        assert_eq!(graph.edge_weight("m2", "m1").await, Some(1));
        assert_eq!(graph.edge_count().await, 1);
    }

    #[tokio::test]
    async fn two_shared_entities_double_the_edge_weight() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        graph.link("m1", &mentions(&["alice", "coffee"]), now).await;
        graph.link("m2", &mentions(&["alice", "coffee"]), now).await;

        assert_eq!(graph.edge_weight("m1", "m2").await, Some(2));
    }

    #[tokio::test]
    async fn relinking_same_memory_does_not_inflate_edges() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        graph.link("m1", &mentions(&["coffee"]), now).await;
        graph.link("m2", &mentions(&["coffee"]), now).await;
        graph.link("m2", &mentions(&["coffee"]), now).await;

        assert_eq!(graph.edge_weight("m1", "m2").await, Some(1));
    }

    #[tokio::test]
    async fn same_name_different_type_stays_distinct() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        let place: BTreeSet<EntityMention> =
            [EntityMention::new("Paris", EntityType::Place)].into();
        let person: BTreeSet<EntityMention> =
            [EntityMention::new("Paris", EntityType::Person)].into();

        graph.link("m1", &place, now).await;
        graph.link("m2", &person, now).await;

        assert_eq!(graph.entity_count().await, 2);
        assert_eq!(graph.entity("paris", EntityType::Place).await.unwrap().entity_type, EntityType::Place);
        assert_eq!(graph.entity("paris", EntityType::Person).await.unwrap().entity_type, EntityType::Person);

        // A shared name is not a shared entity: no co-occurrence edge.
        assert_eq!(graph.edge_weight("m1", "m2").await, None);
        assert!(graph.neighbors("m1", 1).await.is_empty());
    }

    #[tokio::test]
    async fn no_self_loops() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        graph.link("m1", &mentions(&["alice", "bob"]), now).await;
        assert_eq!(graph.edge_weight("m1", "m1").await, None);
    }

    #[tokio::test]
    async fn bfs_respects_hop_budget_and_cycles() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        // m1 - m2 - m3 chain, plus a cycle back from m3 to m1.
        graph.link("m1", &mentions(&["a", "c"]), now).await;
        graph.link("m2", &mentions(&["a", "b"]), now).await;
        graph.link("m3", &mentions(&["b", "c"]), now).await;

        let one_hop = graph.neighbors("m1", 1).await;
        assert_eq!(one_hop.len(), 2); // m2 and m3 both share an entity with m1

        let two_hops = graph.neighbors("m1", 2).await;
        assert_eq!(two_hops.len(), 2); // cycle must not revisit

        assert!(graph.neighbors("m1", 0).await.is_empty());
    }

    #[tokio::test]
    async fn stronger_edges_are_visited_first() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        graph.link("seed", &mentions(&["x", "y"]), now).await;
        graph.link("weak", &mentions(&["x"]), now).await;
        graph.link("strong", &mentions(&["x", "y"]), now).await;

        let order = graph.neighbors("seed", 1).await;
        assert_eq!(order[0], "strong");
        assert_eq!(order[1], "weak");
    }

    #[tokio::test]
    async fn remove_memory_drops_edges_but_keeps_entities() {
        let graph = EntityGraph::new();
        let now = Utc::now();
        graph.link("m1", &mentions(&["coffee"]), now).await;
        graph.link("m2", &mentions(&["coffee"]), now).await;

        graph.remove_memory("m1").await;

        assert_eq!(graph.edge_weight("m1", "m2").await, None);
        assert!(graph.neighbors("m2", 1).await.is_empty());

        let entity = graph.entity("coffee", EntityType::Topic).await.unwrap();
        assert!(!entity.linked_memory_ids.contains("m1"));
        assert!(entity.linked_memory_ids.contains("m2"));
    }

    #[tokio::test]
    async fn entity_merge_keeps_first_seen() {
        let graph = EntityGraph::new();
        let early = Utc::now();
        let late = early + chrono::Duration::days(1);
        graph.link("m1", &mentions(&["alice"]), early).await;
        graph.link("m2", &mentions(&["alice"]), late).await;

        let entity = graph.entity("alice", EntityType::Topic).await.unwrap();
        assert_eq!(entity.first_seen_at, early);
        assert_eq!(entity.linked_memory_ids.len(), 2);
    }
}
