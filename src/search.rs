use crate::action::{Action, Effect};
use crate::decomposition::Decomposition;
use crate::domain::Domain;
use crate::error::PlanError;
use crate::formula::{Literal, PredicateId};
use crate::heuristic::PlanningGraph;
use crate::metrics::{SearchMetrics, SearchMetricsSnapshot};
use crate::params::{Parameters, SearchAlgorithm};
use crate::plan::{make_initial_plan, step_instantiation, Plan};
use crate::problem::Problem;
use crate::refine::refinements;
use crate::step::Step;
use crate::symbol::NameId;
use crate::term::TermTable;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::trace::{debug, info};

/// Everything a refinement needs to know beyond the plan itself:
/// configuration, the problem and its domain, the planning graph, the
/// goal action, and the achiever indices. Built once per `plan()` call
/// and threaded by reference.
pub struct SearchContext {
    params: Parameters,
    domain: Rc<Domain>,
    problem: Rc<Problem>,
    graph: Option<PlanningGraph>,
    goal_action: Rc<Action>,
    achieves_pred: FxHashMap<PredicateId, Vec<(Rc<Action>, Rc<Effect>)>>,
    achieves_neg_pred: FxHashMap<PredicateId, Vec<(Rc<Action>, Rc<Effect>)>>,
    achieves_composite: FxHashMap<NameId, Vec<Rc<Decomposition>>>,
    rng: RefCell<StdRng>,
    static_flaw: Cell<bool>,
}

impl SearchContext {
    pub fn new(problem: Rc<Problem>, params: Parameters) -> Result<Self, PlanError> {
        if params.flaw_orders.len() != params.search_limits.len() {
            return Err(PlanError::MismatchedSearchLimits(
                params.flaw_orders.len(),
                params.search_limits.len(),
            ));
        }
        let domain = problem.domain().clone();

        let need_graph = params.ground_actions
            || params.domain_constraints
            || params.heuristic.needs_planning_graph()
            || params
                .flaw_orders
                .iter()
                .any(|o| o.needs_planning_graph());
        let graph = need_graph.then(|| PlanningGraph::new(&problem, &params));

        let mut goal_action = Action::dummy(problem.name());
        if params.ground_actions {
            goal_action.set_condition(problem.goal().instantiation(problem.terms()));
        } else {
            goal_action.set_condition(problem.goal().clone());
        }

        // Schema search resolves achievers through the predicate maps;
        // the initial and timed dummy actions participate so their
        // effects can be reused.
        let mut achieves_pred: FxHashMap<PredicateId, Vec<(Rc<Action>, Rc<Effect>)>> =
            FxHashMap::default();
        let mut achieves_neg_pred: FxHashMap<PredicateId, Vec<(Rc<Action>, Rc<Effect>)>> =
            FxHashMap::default();
        if !params.ground_actions {
            let mut index = |action: &Rc<Action>| {
                for effect in action.effects() {
                    let map = if effect.literal().negated {
                        &mut achieves_neg_pred
                    } else {
                        &mut achieves_pred
                    };
                    map.entry(effect.literal().predicate())
                        .or_default()
                        .push((action.clone(), effect.clone()));
                }
            };
            for action in domain.actions() {
                index(action);
            }
            index(problem.init_action());
            for (_, action) in problem.timed_actions() {
                index(action);
            }
        }

        let mut achieves_composite: FxHashMap<NameId, Vec<Rc<Decomposition>>> =
            FxHashMap::default();
        if domain.requirements().decompositions {
            for decomposition in domain.decompositions() {
                achieves_composite
                    .entry(decomposition.composite_action())
                    .or_default()
                    .push(decomposition.clone());
            }
        }

        let rng = RefCell::new(StdRng::seed_from_u64(params.random_seed));
        Ok(Self {
            params,
            domain,
            problem,
            graph,
            goal_action: Rc::new(goal_action),
            achieves_pred,
            achieves_neg_pred,
            achieves_composite,
            rng,
            static_flaw: Cell::new(false),
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn terms(&self) -> &Rc<TermTable> {
        self.problem.terms()
    }

    pub fn graph(&self) -> Option<&PlanningGraph> {
        self.graph.as_ref()
    }

    pub fn goal_action(&self) -> &Rc<Action> {
        &self.goal_action
    }

    /// The (action, effect) pairs that can achieve the literal: the
    /// planning-graph index under ground search, the predicate maps
    /// otherwise.
    pub fn literal_achievers(&self, literal: &Literal) -> Vec<(Rc<Action>, Rc<Effect>)> {
        if self.params.ground_actions {
            return self
                .graph
                .as_ref()
                .and_then(|g| g.literal_achievers(literal))
                .map(|s| s.to_vec())
                .unwrap_or_default();
        }
        let map = if literal.negated {
            &self.achieves_neg_pred
        } else {
            &self.achieves_pred
        };
        map.get(&literal.predicate()).cloned().unwrap_or_default()
    }

    /// Decompositions registered for the action's name.
    pub fn decompositions_for(&self, action: &Rc<Action>) -> &[Rc<Decomposition>] {
        self.achieves_composite
            .get(&action.name())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// A uniform position in `0..upper` from the seeded randomizer.
    pub fn random_position(&self, upper: usize) -> usize {
        self.rng.borrow_mut().gen_range(0..upper)
    }

    pub(crate) fn set_static_flaw(&self, value: bool) {
        self.static_flaw.set(value);
    }

    pub(crate) fn static_flaw(&self) -> bool {
        self.static_flaw.get()
    }
}

/// A frontier entry: a plan with its materialized rank. The heap pops
/// the lexicographically smallest rank; ties break toward the older
/// serial.
struct RankedPlan {
    plan: Rc<Plan>,
    rank: Vec<f32>,
}

impl RankedPlan {
    fn new(plan: Rc<Plan>, ctx: &SearchContext) -> Self {
        let rank = plan.rank(ctx).to_vec();
        Self { plan, rank }
    }
}

fn lex_cmp(a: &[f32], b: &[f32]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.partial_cmp(y) {
            Some(std::cmp::Ordering::Equal) | None => continue,
            Some(order) => return order,
        }
    }
    a.len().cmp(&b.len())
}

impl PartialEq for RankedPlan {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for RankedPlan {}

impl PartialOrd for RankedPlan {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedPlan {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap: greater means popped sooner, so a
        // smaller rank must compare greater.
        lex_cmp(&other.rank, &self.rank)
            .then_with(|| other.plan.serial_no().cmp(&self.plan.serial_no()))
    }
}

/// The outcome of a search: the solution plan (if any) and the search
/// statistics.
pub struct PlanResult {
    pub plan: Option<Rc<Plan>>,
    pub metrics: SearchMetricsSnapshot,
}

/// Search for a complete plan for the problem under the given
/// configuration. Returns `Ok` with an empty result when the search
/// space is exhausted; `Err` only for a structurally invalid request.
pub fn plan(problem: &Rc<Problem>, params: &Parameters) -> Result<PlanResult, PlanError> {
    let ctx = SearchContext::new(problem.clone(), params.clone())?;
    let mut metrics = SearchMetrics::new();
    let plan = search(&ctx, &mut metrics);
    #[cfg(feature = "tracing")]
    info!(
        visited = metrics.snapshot().visited,
        generated = metrics.snapshot().generated,
        dead_ends = metrics.snapshot().dead_ends,
        solved = plan.is_some(),
        "search finished"
    );
    Ok(PlanResult {
        plan,
        metrics: metrics.snapshot(),
    })
}

fn search(ctx: &SearchContext, metrics: &mut SearchMetrics) -> Option<Rc<Plan>> {
    let num_orders = ctx.params().flaw_orders.len();
    let limits = &ctx.params().search_limits;
    let mut frontiers: Vec<BinaryHeap<RankedPlan>> =
        (0..num_orders).map(|_| BinaryHeap::new()).collect();
    let mut generated: Vec<usize> = vec![0; num_orders];
    let mut dead_queues: Vec<BinaryHeap<RankedPlan>> = Vec::new();

    let mut current_order = 0;
    let mut orders_left = num_orders;
    let mut next_switch: usize = 1000;

    let initial = make_initial_plan(ctx)?;
    initial.assign_serial(0);
    let mut num_generated: u64 = 1;
    generated[current_order] += 1;
    metrics.record_generated();
    let mut current = Some(initial.clone());

    let mut f_limit = match ctx.params().search_algorithm {
        SearchAlgorithm::IdaStar => initial.primary_rank(ctx),
        SearchAlgorithm::BestFirst => f32::INFINITY,
    };
    let deadline = ctx
        .params()
        .time_limit_secs
        .map(|secs| Instant::now() + Duration::from_secs_f32(secs));

    loop {
        let mut next_f_limit = f32::INFINITY;
        while let Some(plan) = current.clone() {
            if plan.complete() {
                break;
            }
            // Amortized destruction of retired frontiers.
            for _ in 0..4 {
                match dead_queues.last_mut() {
                    Some(queue) => {
                        if queue.pop().is_none() {
                            dead_queues.pop();
                        }
                    }
                    None => break,
                }
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return None;
                }
            }
            metrics.record_visited();
            #[cfg(feature = "tracing")]
            debug!(
                plan = plan.serial_no(),
                rank = plan.primary_rank(ctx),
                "expanding"
            );

            let children = refinements(&plan, ctx, &ctx.params().flaw_orders[current_order]);
            let mut added = false;
            for child in children {
                child.assign_serial(num_generated);
                let rank = child.primary_rank(ctx);
                if !rank.is_finite() || generated[current_order] >= limits[current_order] {
                    continue;
                }
                if ctx.params().search_algorithm == SearchAlgorithm::IdaStar && rank > f_limit {
                    next_f_limit = next_f_limit.min(rank);
                    continue;
                }
                if !added && ctx.static_flaw() {
                    metrics.record_static_flaw();
                }
                added = true;
                frontiers[current_order].push(RankedPlan::new(child, ctx));
                generated[current_order] += 1;
                num_generated += 1;
                metrics.record_generated();
            }
            if !added {
                metrics.record_dead_end();
            }

            // Round-robin over flaw orders: retire an order at its
            // limit, rotate at the switch threshold, double the
            // threshold each full cycle.
            let limit_reached = generated[current_order] >= limits[current_order];
            if limit_reached || generated[current_order] >= next_switch {
                if limit_reached {
                    orders_left -= 1;
                    dead_queues.push(std::mem::take(&mut frontiers[current_order]));
                }
                if orders_left > 0 {
                    loop {
                        current_order += 1;
                        if current_order >= num_orders {
                            current_order = 0;
                            next_switch *= 2;
                        }
                        if generated[current_order] < limits[current_order] {
                            break;
                        }
                    }
                }
            }
            if orders_left == 0 {
                if next_f_limit.is_finite() {
                    current = None;
                }
                break;
            }

            if generated[current_order] == 0 {
                current = Some(initial.clone());
                generated[current_order] += 1;
                num_generated += 1;
                metrics.record_generated();
            } else {
                current = frontiers[current_order].pop().map(|r| r.plan);
            }

            // A schema-level plan is only accepted once every step is
            // fully instantiated; failures fall back to the next plan.
            let mut instantiated = ctx.params().ground_actions;
            while let Some(p) = current.clone() {
                if instantiated || !p.complete() {
                    break;
                }
                let steps: Vec<Step> = p.steps().iter().cloned().collect();
                match step_instantiation(&steps, p.bindings()) {
                    Some(bindings) => {
                        instantiated = true;
                        let mut parts = p.parts();
                        parts.bindings = Rc::new(bindings);
                        let grounded = Plan::from_parts(parts, Some(&p));
                        grounded.assign_serial(p.serial_no());
                        current = Some(grounded);
                    }
                    None => {
                        metrics.record_failed_instantiation();
                        current = frontiers[current_order].pop().map(|r| r.plan);
                    }
                }
            }
        }

        if let Some(p) = &current {
            if p.complete() {
                return Some(p.clone());
            }
        }
        f_limit = next_f_limit;
        if !f_limit.is_finite() {
            return None;
        }
        // Iterative deepening: restart from the initial plan with the
        // enlarged limit.
        current = Some(initial.clone());
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::action::EffectTime;
    use crate::domain::Requirements;
    use crate::formula::{Atom, Formula};
    use crate::symbol::SymbolStore;
    use smallvec::SmallVec;
    use std::rc::Rc;

    /// A tiny schema-free world: `p` achievable by action `add-p`, `q`
    /// unachievable, `r` true initially. The goal formula is built by
    /// the caller from the `p` and `q` literals.
    pub(crate) fn simple_context(
        goal: impl FnOnce(Rc<Formula>, Rc<Formula>, &SymbolStore) -> Rc<Formula>,
    ) -> (SearchContext, SymbolStore) {
        let (problem, symbols) = simple_problem(goal);
        let ctx = SearchContext::new(problem, Parameters::default()).unwrap();
        (ctx, symbols)
    }

    pub(crate) fn simple_problem(
        goal: impl FnOnce(Rc<Formula>, Rc<Formula>, &SymbolStore) -> Rc<Formula>,
    ) -> (Rc<Problem>, SymbolStore) {
        let symbols = SymbolStore::new();
        let terms = Rc::new(TermTable::new(symbols.intern("object")));
        let mut domain = Domain::new(
            symbols.intern("simple"),
            Requirements::default(),
            terms.clone(),
        );
        let p = domain.declare_predicate(symbols.intern("p"), 0);
        let q = domain.declare_predicate(symbols.intern("q"), 0);
        let r = domain.declare_predicate(symbols.intern("r"), 0);
        let mut add_p = Action::schema(symbols.intern("add-p"));
        add_p.add_effect(Effect::new(
            crate::formula::Literal::positive(Atom {
                predicate: p,
                args: SmallVec::new(),
            }),
            EffectTime::AtEnd,
        ));
        domain.add_action(add_p, &symbols).unwrap();
        let domain = Rc::new(domain);
        let mut builder = Problem::builder(symbols.intern("simple-problem"), domain, &symbols);
        builder.init(Atom {
            predicate: r,
            args: SmallVec::new(),
        });
        let p_lit = Rc::new(Formula::Literal(crate::formula::Literal::positive(Atom {
            predicate: p,
            args: SmallVec::new(),
        })));
        let q_lit = Rc::new(Formula::Literal(crate::formula::Literal::positive(Atom {
            predicate: q,
            args: SmallVec::new(),
        })));
        builder.goal(goal(p_lit, q_lit, &symbols));
        let problem = builder.finish(&symbols);
        (problem, symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::simple_context;
    use super::*;

    #[test]
    fn ranked_plans_pop_smallest_rank_first() {
        let (ctx, _symbols) = simple_context(|p, _, _| p);
        let a = make_initial_plan(&ctx).unwrap();
        a.assign_serial(1);
        let b = make_initial_plan(&ctx).unwrap();
        b.assign_serial(2);
        let mut heap = BinaryHeap::new();
        heap.push(RankedPlan {
            plan: a,
            rank: vec![5.0, 0.0],
        });
        heap.push(RankedPlan {
            plan: b,
            rank: vec![2.0, 0.0],
        });
        assert_eq!(heap.pop().unwrap().rank[0], 2.0);
        assert_eq!(heap.pop().unwrap().rank[0], 5.0);
    }

    #[test]
    fn rank_ties_break_toward_older_serial() {
        let (ctx, _symbols) = simple_context(|p, _, _| p);
        let a = make_initial_plan(&ctx).unwrap();
        a.assign_serial(7);
        let b = make_initial_plan(&ctx).unwrap();
        b.assign_serial(3);
        let mut heap = BinaryHeap::new();
        heap.push(RankedPlan {
            plan: a,
            rank: vec![1.0],
        });
        heap.push(RankedPlan {
            plan: b,
            rank: vec![1.0],
        });
        assert_eq!(heap.pop().unwrap().plan.serial_no(), 3);
    }

    #[test]
    fn mismatched_limits_are_rejected() {
        let (problem, _symbols) = test_support::simple_problem(|p, _, _| p);
        let mut params = Parameters::default();
        params.search_limits.push(10);
        assert!(matches!(
            SearchContext::new(problem, params),
            Err(PlanError::MismatchedSearchLimits(_, _))
        ));
    }
}
