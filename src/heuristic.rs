use crate::action::{Action, Effect};
use crate::bindings::Bindings;
use crate::formula::{Atom, Formula, Literal};
use crate::params::Parameters;
use crate::problem::Problem;
use crate::step::StepId;
use crate::term::{Term, TermTable, VariableId};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Reachability estimate for a literal or formula: additive cost, max
/// cost, and earliest level (used as a makespan bound for temporal
/// tightening).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicValue {
    pub add_cost: f32,
    pub max_cost: f32,
    pub makespan: f32,
}

impl HeuristicValue {
    pub const ZERO: HeuristicValue = HeuristicValue {
        add_cost: 0.0,
        max_cost: 0.0,
        makespan: 0.0,
    };

    pub const INFINITE: HeuristicValue = HeuristicValue {
        add_cost: f32::INFINITY,
        max_cost: f32::INFINITY,
        makespan: f32::INFINITY,
    };

    pub fn is_infinite(&self) -> bool {
        self.add_cost.is_infinite()
    }

    /// Conjunction: additive costs sum, max costs and levels max.
    pub fn conjoin(&self, other: &HeuristicValue) -> HeuristicValue {
        HeuristicValue {
            add_cost: self.add_cost + other.add_cost,
            max_cost: self.max_cost.max(other.max_cost),
            makespan: self.makespan.max(other.makespan),
        }
    }

    /// Disjunction: field-wise minimum.
    pub fn disjoin(&self, other: &HeuristicValue) -> HeuristicValue {
        HeuristicValue {
            add_cost: self.add_cost.min(other.add_cost),
            max_cost: self.max_cost.min(other.max_cost),
            makespan: self.makespan.min(other.makespan),
        }
    }
}

/// A relaxed reachability graph over ground action instances.
///
/// Built once per `plan()` call when the configuration needs it:
/// supplies the achiever index for ground search, literal cost levels
/// for the rank heuristics, and makespan bounds for temporal
/// tightening.
pub struct PlanningGraph {
    terms: Rc<TermTable>,
    init_atoms: FxHashSet<Atom>,
    literal_values: FxHashMap<Literal, HeuristicValue>,
    achievers: FxHashMap<Literal, Vec<(Rc<Action>, Rc<Effect>)>>,
}

impl PlanningGraph {
    pub fn new(problem: &Problem, _params: &Parameters) -> Self {
        let terms = problem.terms().clone();
        let mut graph = Self {
            terms: terms.clone(),
            init_atoms: FxHashSet::default(),
            literal_values: FxHashMap::default(),
            achievers: FxHashMap::default(),
        };

        // Level 0: the initial state, including timed initial literals.
        for effect in problem.init_action().effects() {
            graph.init_atoms.insert(effect.literal().atom.clone());
            graph
                .literal_values
                .insert(effect.literal().clone(), HeuristicValue::ZERO);
            graph
                .achievers
                .entry(effect.literal().clone())
                .or_default()
                .push((problem.init_action().clone(), effect.clone()));
        }
        for (time, action) in problem.timed_actions() {
            for effect in action.effects() {
                let value = HeuristicValue {
                    add_cost: 0.0,
                    max_cost: 0.0,
                    makespan: *time,
                };
                graph.insert_value(effect.literal().clone(), value);
                graph
                    .achievers
                    .entry(effect.literal().clone())
                    .or_default()
                    .push((action.clone(), effect.clone()));
            }
        }

        // Ground every schema and relax to a cost fixpoint.
        let ground: Vec<Rc<Action>> = problem
            .domain()
            .actions()
            .iter()
            .flat_map(|a| ground_instances(a, &terms))
            .collect();
        let mut changed = true;
        while changed {
            changed = false;
            for action in &ground {
                let cond = graph.formula_value(action.condition(), 0, None);
                if cond.is_infinite() {
                    continue;
                }
                for effect in action.effects() {
                    let guard = graph.formula_value(effect.condition(), 0, None);
                    if guard.is_infinite() {
                        continue;
                    }
                    let through = cond.conjoin(&guard);
                    let value = HeuristicValue {
                        add_cost: through.add_cost + 1.0,
                        max_cost: through.max_cost + 1.0,
                        makespan: through.makespan + 1.0,
                    };
                    if graph.insert_value(effect.literal().clone(), value) {
                        changed = true;
                        let entry = graph.achievers.entry(effect.literal().clone()).or_default();
                        if !entry
                            .iter()
                            .any(|(a, e)| Rc::ptr_eq(a, action) && Rc::ptr_eq(e, effect))
                        {
                            entry.push((action.clone(), effect.clone()));
                        }
                    }
                }
            }
        }
        graph
    }

    /// Record a value if it improves on the known one. Returns true on
    /// first sight of the literal (its achiever should be indexed).
    fn insert_value(&mut self, literal: Literal, value: HeuristicValue) -> bool {
        match self.literal_values.get_mut(&literal) {
            Some(existing) => {
                let improved = value.add_cost < existing.add_cost;
                existing.add_cost = existing.add_cost.min(value.add_cost);
                existing.max_cost = existing.max_cost.min(value.max_cost);
                existing.makespan = existing.makespan.min(value.makespan);
                improved
            }
            None => {
                self.literal_values.insert(literal, value);
                true
            }
        }
    }

    /// Ground achievers of a ground literal.
    pub fn literal_achievers(&self, literal: &Literal) -> Option<&[(Rc<Action>, Rc<Effect>)]> {
        self.achievers.get(literal).map(|v| v.as_slice())
    }

    /// Cost estimate for a literal, dereferenced through the plan's
    /// bindings when given. Schematic literals take the minimum over
    /// matching ground entries.
    pub fn literal_value(
        &self,
        literal: &Literal,
        step_id: StepId,
        bindings: Option<&Bindings>,
    ) -> HeuristicValue {
        let resolved = resolve_literal(literal, step_id, bindings);
        let is_ground = resolved.atom.args.iter().all(|t| !t.is_variable());
        if is_ground {
            if let Some(v) = self.literal_values.get(&resolved) {
                return *v;
            }
            // Closed world: an absent negative literal is free.
            if resolved.negated && !self.init_atoms.contains(&resolved.atom) {
                return HeuristicValue::ZERO;
            }
            return HeuristicValue::INFINITE;
        }
        let mut best = HeuristicValue::INFINITE;
        for (entry, value) in &self.literal_values {
            if entry.negated == resolved.negated
                && entry.predicate() == resolved.predicate()
                && args_match(&resolved, entry)
            {
                best = best.disjoin(value);
            }
        }
        if best.is_infinite() && resolved.negated {
            // Some instantiation of the atom is absent from the initial
            // state unless the domain is degenerate.
            return HeuristicValue::ZERO;
        }
        best
    }

    /// Cost estimate for a formula.
    pub fn formula_value(
        &self,
        formula: &Rc<Formula>,
        step_id: StepId,
        bindings: Option<&Bindings>,
    ) -> HeuristicValue {
        match &**formula {
            Formula::True => HeuristicValue::ZERO,
            Formula::False => HeuristicValue::INFINITE,
            Formula::Literal(l) => self.literal_value(l, step_id, bindings),
            Formula::TimedLiteral { literal, .. } => {
                self.literal_value(literal, step_id, bindings)
            }
            Formula::Equality(bl) => {
                let consistent = match bindings {
                    Some(b) => {
                        let lhs =
                            b.binding(Term::Variable(bl.var), bl.var_step_or(step_id));
                        let rhs = b.binding(bl.term, bl.term_step_or(step_id));
                        match (lhs, rhs) {
                            (Term::Object(a), Term::Object(c)) => a == c,
                            _ => true,
                        }
                    }
                    None => true,
                };
                if consistent {
                    HeuristicValue::ZERO
                } else {
                    HeuristicValue::INFINITE
                }
            }
            Formula::Inequality(bl) => {
                let consistent = match bindings {
                    Some(b) => b.consistent_with_inequality(
                        bl.var,
                        bl.var_step_or(step_id),
                        bl.term,
                        bl.term_step_or(step_id),
                    ),
                    None => true,
                };
                if consistent {
                    HeuristicValue::ZERO
                } else {
                    HeuristicValue::INFINITE
                }
            }
            Formula::Conjunction(fs) => fs.iter().fold(HeuristicValue::ZERO, |acc, f| {
                acc.conjoin(&self.formula_value(f, step_id, bindings))
            }),
            Formula::Disjunction(fs) => fs.iter().fold(HeuristicValue::INFINITE, |acc, f| {
                acc.disjoin(&self.formula_value(f, step_id, bindings))
            }),
            Formula::Exists { body, .. } => self.formula_value(body, step_id, bindings),
            Formula::Forall { .. } => {
                let expanded = formula.universal_base(&self.terms);
                if Rc::ptr_eq(&expanded, formula) {
                    HeuristicValue::ZERO
                } else {
                    self.formula_value(&expanded, step_id, bindings)
                }
            }
        }
    }
}

fn resolve_literal(literal: &Literal, step_id: StepId, bindings: Option<&Bindings>) -> Literal {
    match bindings {
        None => literal.clone(),
        Some(b) => Literal {
            atom: Atom {
                predicate: literal.predicate(),
                args: literal
                    .atom
                    .args
                    .iter()
                    .map(|&t| b.binding(t, step_id))
                    .collect(),
            },
            negated: literal.negated,
        },
    }
}

fn args_match(query: &Literal, entry: &Literal) -> bool {
    query
        .atom
        .args
        .iter()
        .zip(entry.atom.args.iter())
        .all(|(&q, &e)| match q {
            Term::Variable(_) => true,
            Term::Object(_) => q == e,
        })
}

/// Enumerate all ground instances of a schema over the typed object
/// domains. Quantified effect parameters are expanded as well.
fn ground_instances(action: &Rc<Action>, terms: &Rc<TermTable>) -> Vec<Rc<Action>> {
    if !action.is_schema() {
        return vec![action.clone()];
    }
    let mut assignments: Vec<FxHashMap<VariableId, Term>> = vec![FxHashMap::default()];
    for &param in action.parameters() {
        let objects = terms.compatible_objects(terms.variable_type(param));
        let mut next = Vec::with_capacity(assignments.len() * objects.len());
        for map in &assignments {
            for &obj in &objects {
                let mut m = map.clone();
                m.insert(param, Term::Object(obj));
                next.push(m);
            }
        }
        assignments = next;
    }
    let mut out = Vec::with_capacity(assignments.len());
    for map in assignments {
        let mut ground = Action::ground(action.name());
        ground.set_composite(action.composite());
        ground.set_durative(action.durative());
        let condition = action.condition().substitution(&map).instantiation(terms);
        if condition.contradiction() {
            continue;
        }
        ground.set_condition(condition);
        for effect in action.effects() {
            let mut effect_maps: Vec<FxHashMap<VariableId, Term>> = vec![map.clone()];
            for &param in effect.parameters() {
                let objects = terms.compatible_objects(terms.variable_type(param));
                let mut next = Vec::with_capacity(effect_maps.len() * objects.len());
                for m in &effect_maps {
                    for &obj in &objects {
                        let mut m2 = m.clone();
                        m2.insert(param, Term::Object(obj));
                        next.push(m2);
                    }
                }
                effect_maps = next;
            }
            for m in effect_maps {
                let guard = effect.condition().substitution(&m).instantiation(terms);
                if guard.contradiction() {
                    continue;
                }
                let e = crate::action::Effect::new(effect.literal().substitution(&m), effect.when())
                    .with_condition(guard)
                    .with_link_condition(effect.link_condition().substitution(&m));
                ground.add_effect(e);
            }
        }
        out.push(Rc::new(ground));
    }
    out
}

/// Which rank function drives the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Heuristic {
    /// Additive reachability cost of the open conditions.
    Add,
    /// Max reachability cost of the open conditions.
    Max,
    /// Flaw count; needs no planning graph.
    Flaws,
}

impl Heuristic {
    pub fn needs_planning_graph(self) -> bool {
        !matches!(self, Heuristic::Flaws)
    }

    /// Compute the rank tuple of a plan; lexicographically smaller is
    /// better.
    pub fn plan_rank(
        self,
        plan: &crate::plan::Plan,
        weight: f32,
        graph: Option<&PlanningGraph>,
        ground_search: bool,
    ) -> Vec<f32> {
        let steps = plan.num_steps() as f32;
        match (self, graph) {
            (Heuristic::Flaws, _) | (_, None) => {
                let flaws = plan.num_open_conds()
                    + plan.num_unsafes()
                    + plan.num_unexpanded_steps()
                    + plan.mutex_threats().len();
                vec![steps + weight * flaws as f32, plan.num_open_conds() as f32]
            }
            (_, Some(graph)) => {
                let bindings = (!ground_search).then(|| plan.bindings());
                let mut total = HeuristicValue::ZERO;
                for oc in plan.open_conds().iter() {
                    let value = match &oc.condition {
                        crate::flaw::OpenCond::Literal { literal, .. } => {
                            graph.literal_value(literal, oc.step_id, bindings)
                        }
                        crate::flaw::OpenCond::Disjunction(f) => {
                            graph.formula_value(f, oc.step_id, bindings)
                        }
                        crate::flaw::OpenCond::Inequality(_) => HeuristicValue::ZERO,
                    };
                    total = total.conjoin(&value);
                }
                let cost = match self {
                    Heuristic::Add => total.add_cost,
                    Heuristic::Max => total.max_cost,
                    Heuristic::Flaws => unreachable!("handled above"),
                };
                vec![steps + weight * cost, plan.num_open_conds() as f32]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::EffectTime;
    use crate::domain::{Domain, Requirements};
    use crate::symbol::SymbolStore;
    use smallvec::SmallVec;

    fn fixture() -> (SymbolStore, Rc<Problem>) {
        // One action `make-p` achieving p; q unreachable; r initially true.
        let symbols = SymbolStore::new();
        let terms = Rc::new(TermTable::new(symbols.intern("object")));
        let mut domain = Domain::new(symbols.intern("d"), Requirements::default(), terms.clone());
        let p = domain.declare_predicate(symbols.intern("p"), 0);
        let _q = domain.declare_predicate(symbols.intern("q"), 0);
        let r = domain.declare_predicate(symbols.intern("r"), 0);
        let mut action = Action::schema(symbols.intern("make-p"));
        action.add_effect(Effect::new(
            Literal::positive(Atom {
                predicate: p,
                args: SmallVec::new(),
            }),
            EffectTime::AtEnd,
        ));
        domain.add_action(action, &symbols).unwrap();
        let domain = Rc::new(domain);
        let mut b = Problem::builder(symbols.intern("pb"), domain, &symbols);
        b.init(Atom {
            predicate: r,
            args: SmallVec::new(),
        });
        let problem = b.finish(&symbols);
        (symbols, problem)
    }

    fn lit(pred: u32, negated: bool) -> Literal {
        Literal {
            atom: Atom {
                predicate: crate::formula::PredicateId(pred),
                args: SmallVec::new(),
            },
            negated,
        }
    }

    #[test]
    fn init_literals_cost_zero() {
        let (_, problem) = fixture();
        let graph = PlanningGraph::new(&problem, &Parameters::default());
        let v = graph.literal_value(&lit(2, false), 0, None);
        assert_eq!(v, HeuristicValue::ZERO);
    }

    #[test]
    fn achievable_literal_costs_one_level() {
        let (_, problem) = fixture();
        let graph = PlanningGraph::new(&problem, &Parameters::default());
        let v = graph.literal_value(&lit(0, false), 0, None);
        assert_eq!(v.add_cost, 1.0);
        assert_eq!(v.makespan, 1.0);
    }

    #[test]
    fn unreachable_literal_is_infinite() {
        let (_, problem) = fixture();
        let graph = PlanningGraph::new(&problem, &Parameters::default());
        assert!(graph.literal_value(&lit(1, false), 0, None).is_infinite());
    }

    #[test]
    fn absent_negative_literal_is_free() {
        let (_, problem) = fixture();
        let graph = PlanningGraph::new(&problem, &Parameters::default());
        assert_eq!(
            graph.literal_value(&lit(1, true), 0, None),
            HeuristicValue::ZERO
        );
    }

    #[test]
    fn conjunction_adds_and_maxes() {
        let a = HeuristicValue {
            add_cost: 1.0,
            max_cost: 1.0,
            makespan: 1.0,
        };
        let b = HeuristicValue {
            add_cost: 2.0,
            max_cost: 2.0,
            makespan: 3.0,
        };
        let c = a.conjoin(&b);
        assert_eq!(c.add_cost, 3.0);
        assert_eq!(c.max_cost, 2.0);
        assert_eq!(c.makespan, 3.0);
    }

    #[test]
    fn achievers_include_init_and_actions() {
        let (_, problem) = fixture();
        let graph = PlanningGraph::new(&problem, &Parameters::default());
        assert_eq!(graph.literal_achievers(&lit(2, false)).unwrap().len(), 1);
        assert_eq!(graph.literal_achievers(&lit(0, false)).unwrap().len(), 1);
        assert!(graph.literal_achievers(&lit(1, false)).is_none());
    }
}
