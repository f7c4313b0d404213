use crate::domain::Domain;
use crate::flaw::{Flaw, OpenCond};
use crate::plan::Plan;
use crate::search::SearchContext;
use serde::{Deserialize, Serialize};

/// Which flaw variants a selection criterion applies to. Static open
/// conditions can be singled out separately from the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlawKinds {
    pub threats: bool,
    pub open_conditions: bool,
    pub static_conditions: bool,
    pub unexpanded: bool,
    pub mutex: bool,
}

impl FlawKinds {
    pub fn all() -> Self {
        Self {
            threats: true,
            open_conditions: true,
            static_conditions: true,
            unexpanded: true,
            mutex: true,
        }
    }

    fn matches(&self, flaw: &Flaw, domain: &Domain) -> bool {
        match flaw {
            Flaw::Unsafe(_) => self.threats,
            Flaw::OpenCondition(oc) => {
                if oc.is_static(domain) {
                    self.static_conditions || self.open_conditions
                } else {
                    self.open_conditions
                }
            }
            Flaw::MutexThreat(_) => self.mutex,
            Flaw::UnexpandedStep(_) => self.unexpanded,
        }
    }
}

/// How a criterion picks among the flaws it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionOrder {
    /// Newest flaw first.
    Lifo,
    /// Oldest flaw first.
    Fifo,
    /// Fewest applicable refinements first (forced flaws early).
    LeastRefinements,
    /// Most applicable refinements first.
    MostRefinements,
    /// Cheapest open condition per the planning graph first.
    LeastCost,
}

/// One stage of a flaw selection order: the kinds it applies to, an
/// optional refinement-count ceiling, and the pick order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriterion {
    pub kinds: FlawKinds,
    pub max_refinements: Option<usize>,
    pub order: SelectionOrder,
}

/// An ordered list of criteria; the first criterion any flaw matches
/// decides the selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlawSelectionOrder {
    criteria: Vec<SelectionCriterion>,
}

impl Default for FlawSelectionOrder {
    fn default() -> Self {
        Self::ucpop()
    }
}

impl FlawSelectionOrder {
    pub fn new(criteria: Vec<SelectionCriterion>) -> Self {
        Self { criteria }
    }

    /// Threats, unexpanded composites, and mutexes before open
    /// conditions, newest first.
    pub fn ucpop() -> Self {
        Self::new(vec![
            SelectionCriterion {
                kinds: FlawKinds {
                    threats: true,
                    unexpanded: true,
                    mutex: true,
                    ..Default::default()
                },
                max_refinements: None,
                order: SelectionOrder::Lifo,
            },
            SelectionCriterion {
                kinds: FlawKinds {
                    open_conditions: true,
                    static_conditions: true,
                    ..Default::default()
                },
                max_refinements: None,
                order: SelectionOrder::Lifo,
            },
        ])
    }

    /// Least-cost flaw repair: always work on the flaw with the fewest
    /// applicable refinements.
    pub fn lcfr() -> Self {
        Self::new(vec![SelectionCriterion {
            kinds: FlawKinds::all(),
            max_refinements: None,
            order: SelectionOrder::LeastRefinements,
        }])
    }

    /// Static preconditions first (they can only be linked to the
    /// initial state), then the UCPOP order.
    pub fn static_first() -> Self {
        let mut criteria = vec![SelectionCriterion {
            kinds: FlawKinds {
                static_conditions: true,
                ..Default::default()
            },
            max_refinements: None,
            order: SelectionOrder::Lifo,
        }];
        criteria.extend(Self::ucpop().criteria);
        Self::new(criteria)
    }

    /// Whether any criterion ranks flaws by planning-graph cost.
    pub fn needs_planning_graph(&self) -> bool {
        self.criteria
            .iter()
            .any(|c| c.order == SelectionOrder::LeastCost)
    }

    /// Pick the flaw to repair next. The plan must have at least one
    /// flaw.
    pub fn select(&self, plan: &Plan, ctx: &SearchContext) -> Flaw {
        let flaws: Vec<Flaw> = plan.flaws().collect();
        debug_assert!(!flaws.is_empty(), "select called on a complete plan");
        for criterion in &self.criteria {
            let mut candidates: Vec<&Flaw> = flaws
                .iter()
                .filter(|f| criterion.kinds.matches(f, ctx.domain()))
                .collect();
            if let Some(limit) = criterion.max_refinements {
                candidates.retain(|f| refinement_count(plan, ctx, f, limit).is_some());
            }
            if candidates.is_empty() {
                continue;
            }
            let pick: &Flaw = match criterion.order {
                SelectionOrder::Lifo => candidates[0],
                SelectionOrder::Fifo => candidates[candidates.len() - 1],
                SelectionOrder::LeastRefinements => candidates
                    .iter()
                    .min_by_key(|f| {
                        refinement_count(plan, ctx, f, usize::MAX).unwrap_or(usize::MAX)
                    })
                    .copied()
                    .unwrap(),
                SelectionOrder::MostRefinements => candidates
                    .iter()
                    .max_by_key(|f| refinement_count(plan, ctx, f, usize::MAX).unwrap_or(0))
                    .copied()
                    .unwrap(),
                SelectionOrder::LeastCost => candidates
                    .iter()
                    .min_by(|a, b| {
                        flaw_cost(plan, ctx, a)
                            .partial_cmp(&flaw_cost(plan, ctx, b))
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .copied()
                    .unwrap(),
            };
            return pick.clone();
        }
        flaws[0].clone()
    }
}

fn refinement_count(plan: &Plan, ctx: &SearchContext, flaw: &Flaw, limit: usize) -> Option<usize> {
    match flaw {
        Flaw::Unsafe(u) => plan.unsafe_refinements(ctx, u, limit).map(|r| r.total),
        Flaw::OpenCondition(oc) => plan.open_cond_refinements(ctx, oc, limit),
        Flaw::UnexpandedStep(u) => {
            let n = plan.unexpanded_step_refinements(ctx, u);
            (n <= limit).then_some(n)
        }
        // A mutex threat always has its separate/promote/demote trio.
        Flaw::MutexThreat(_) => Some(3.min(limit)),
    }
}

fn flaw_cost(plan: &Plan, ctx: &SearchContext, flaw: &Flaw) -> f32 {
    let Some(graph) = ctx.graph() else {
        return 0.0;
    };
    match flaw {
        Flaw::OpenCondition(oc) => match &oc.condition {
            OpenCond::Literal { literal, .. } => {
                let bindings = (!ctx.params().ground_actions).then(|| plan.bindings());
                graph.literal_value(literal, oc.step_id, bindings).add_cost
            }
            _ => 0.0,
        },
        _ => 0.0,
    }
}
