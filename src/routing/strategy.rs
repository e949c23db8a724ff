//! Replica selection algorithms
use crate::config::StrategyConfig;
use crate::core::NodeHandle;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Selection algorithm over a filtered candidate set.
///
/// Candidates are the healthy, low-lag replicas computed by the routing
/// manager; an empty set returns `None` and the caller falls back to the
/// primary.
pub trait RoutingStrategy: Send + Sync {
    fn select(&self, candidates: &[NodeHandle]) -> Option<NodeHandle>;
}

/// Round-robin selection with an atomically incremented cursor
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingStrategy for RoundRobin {
    fn select(&self, candidates: &[NodeHandle]) -> Option<NodeHandle> {
        if candidates.is_empty() {
            return None;
        }

        // fetch_add keeps concurrent callers from racing a load-then-store
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].clone())
    }
}

/// Weighted random selection with a fixed weight per candidate slot
pub struct Weighted {
    weights: Vec<u32>,
}

impl Weighted {
    pub fn new(weights: Vec<u32>) -> Self {
        Self { weights }
    }
}

impl RoutingStrategy for Weighted {
    fn select(&self, candidates: &[NodeHandle]) -> Option<NodeHandle> {
        if candidates.is_empty() {
            return None;
        }

        // Health filtering can shrink the candidate set out from under the
        // configured weights; fall back to uniform random rather than
        // indexing out of bounds
        let total: u64 = self.weights.iter().map(|w| *w as u64).sum();
        if self.weights.len() != candidates.len() || total == 0 {
            let index = rand::thread_rng().gen_range(0..candidates.len());
            return Some(candidates[index].clone());
        }

        let mut draw = rand::thread_rng().gen_range(0..total);
        for (index, weight) in self.weights.iter().enumerate() {
            let weight = *weight as u64;
            if draw < weight {
                return Some(candidates[index].clone());
            }
            draw -= weight;
        }

        // Unreachable with a correct cumulative walk
        Some(candidates[candidates.len() - 1].clone())
    }
}

/// Build the configured selection strategy
pub fn build_strategy(config: &StrategyConfig) -> Box<dyn RoutingStrategy> {
    match config {
        StrategyConfig::RoundRobin => Box::new(RoundRobin::new()),
        StrategyConfig::Weighted { weights } => Box::new(Weighted::new(weights.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;
    use crate::test_util::StubHandle;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn candidates(ids: &[&str]) -> Vec<NodeHandle> {
        ids.iter().map(|id| StubHandle::new(id) as NodeHandle).collect()
    }

    #[test]
    fn test_empty_candidates_select_nothing() {
        assert!(RoundRobin::new().select(&[]).is_none());
        assert!(Weighted::new(vec![1, 2]).select(&[]).is_none());
    }

    #[test]
    fn test_round_robin_cycles() {
        let strategy = RoundRobin::new();
        let nodes = candidates(&["a", "b", "c"]);

        let picks: Vec<NodeId> = (0..6)
            .map(|_| strategy.select(&nodes).unwrap().id().clone())
            .collect();

        assert_eq!(picks[0], picks[3]);
        assert_eq!(picks[1], picks[4]);
        assert_eq!(picks[2], picks[5]);
        // Every candidate appears once per window of three
        let window: std::collections::HashSet<_> = picks[..3].iter().collect();
        assert_eq!(window.len(), 3);
    }

    #[tokio::test]
    async fn test_round_robin_even_distribution_under_concurrency() {
        let strategy = Arc::new(RoundRobin::new());
        let nodes = Arc::new(candidates(&["a", "b", "c"]));

        let mut tasks = Vec::new();
        for _ in 0..30 {
            let strategy = Arc::clone(&strategy);
            let nodes = Arc::clone(&nodes);
            tasks.push(tokio::spawn(async move {
                let mut picks = Vec::new();
                for _ in 0..100 {
                    picks.push(strategy.select(&nodes).unwrap().id().clone());
                }
                picks
            }));
        }

        let mut counts: HashMap<NodeId, usize> = HashMap::new();
        for task in tasks {
            for pick in task.await.unwrap() {
                *counts.entry(pick).or_default() += 1;
            }
        }

        // 3000 selections over 3 candidates: exactly even, no starvation
        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert_eq!(*count, 1000);
        }
    }

    #[test]
    fn test_weighted_respects_weights() {
        let strategy = Weighted::new(vec![3, 1]);
        let nodes = candidates(&["heavy", "light"]);

        let mut counts: HashMap<NodeId, usize> = HashMap::new();
        for _ in 0..4000 {
            let pick = strategy.select(&nodes).unwrap().id().clone();
            *counts.entry(pick).or_default() += 1;
        }

        let heavy = counts[&NodeId::new("heavy")];
        let light = counts[&NodeId::new("light")];
        assert_eq!(heavy + light, 4000);
        // Expected split is 3000/1000; allow generous randomness slack
        assert!(heavy > 2600, "heavy selected only {} times", heavy);
        assert!(light > 700, "light selected only {} times", light);
    }

    #[test]
    fn test_weighted_zero_weight_candidate_is_never_selected() {
        let strategy = Weighted::new(vec![1, 0]);
        let nodes = candidates(&["only", "never"]);

        for _ in 0..200 {
            let pick = strategy.select(&nodes).unwrap();
            assert_eq!(pick.id(), &NodeId::new("only"));
        }
    }

    #[test]
    fn test_weighted_length_mismatch_falls_back_to_uniform() {
        // Two weights configured, one candidate filtered out by health
        let strategy = Weighted::new(vec![3, 1]);
        let nodes = candidates(&["a", "b", "c"]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(strategy.select(&nodes).unwrap().id().clone());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_weighted_all_zero_weights_fall_back_to_uniform() {
        let strategy = Weighted::new(vec![0, 0]);
        let nodes = candidates(&["a", "b"]);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(strategy.select(&nodes).unwrap().id().clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_build_strategy_from_config() {
        let nodes = candidates(&["a"]);

        let rr = build_strategy(&StrategyConfig::RoundRobin);
        assert!(rr.select(&nodes).is_some());

        let weighted = build_strategy(&StrategyConfig::Weighted { weights: vec![1] });
        assert!(weighted.select(&nodes).is_some());
    }
}
