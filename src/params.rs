use crate::flawsel::FlawSelectionOrder;
use crate::heuristic::Heuristic;
use serde::{Deserialize, Serialize};

/// Search driver mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchAlgorithm {
    /// Best-first over the rank tuple.
    BestFirst,
    /// Iterative-deepening A* over the primary rank.
    IdaStar,
}

/// Planner configuration.
///
/// `flaw_orders` and `search_limits` are parallel: each selection order
/// gets its own frontier and its own generation budget, used
/// round-robin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    pub search_algorithm: SearchAlgorithm,
    pub heuristic: Heuristic,
    /// Weight on the heuristic term of the rank.
    pub weight: f32,
    pub flaw_orders: Vec<FlawSelectionOrder>,
    pub search_limits: Vec<usize>,
    /// Soft wall-clock budget, checked between expansions.
    pub time_limit_secs: Option<f32>,
    /// Search over pre-grounded actions using the planning-graph
    /// achiever index.
    pub ground_actions: bool,
    /// Enforce type-refined bindings when a step is introduced.
    pub domain_constraints: bool,
    /// Do not raise flaws for static predicates (they still count
    /// toward the heuristics).
    pub strip_static_preconditions: bool,
    /// Shuffle conjunct decomposition order.
    pub random_open_conditions: bool,
    /// Seed for the reproducible randomizer.
    pub random_seed: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            search_algorithm: SearchAlgorithm::BestFirst,
            heuristic: Heuristic::Add,
            weight: 1.0,
            flaw_orders: vec![FlawSelectionOrder::default()],
            search_limits: vec![100_000],
            time_limit_secs: None,
            ground_actions: false,
            domain_constraints: false,
            strip_static_preconditions: false,
            random_open_conditions: false,
            random_seed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_schematic_best_first() {
        let p = Parameters::default();
        assert_eq!(p.search_algorithm, SearchAlgorithm::BestFirst);
        assert!(!p.ground_actions);
        assert_eq!(p.flaw_orders.len(), p.search_limits.len());
    }

    #[test]
    fn parameters_round_trip_through_serde() {
        let p = Parameters {
            search_algorithm: SearchAlgorithm::IdaStar,
            heuristic: Heuristic::Flaws,
            random_open_conditions: true,
            random_seed: 42,
            ..Default::default()
        };
        let json = serde_json::to_string(&p).unwrap();
        let back: Parameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back.search_algorithm, SearchAlgorithm::IdaStar);
        assert_eq!(back.random_seed, 42);
        assert!(back.random_open_conditions);
    }
}
