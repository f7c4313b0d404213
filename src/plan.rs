use crate::bindings::{Binding, Bindings};
use crate::chain::Chain;
use crate::decomposition::{DecompositionFrame, DecompositionLink};
use crate::flaw::{Flaw, MutexThreat, OpenCond, OpenCondition, UnexpandedStep, UnsafeFlaw};
use crate::formula::{Formula, FormulaTime};
use crate::orderings::Orderings;
use crate::search::SearchContext;
use crate::step::{Link, Step, StepId, StepTime, GOAL_ID, INIT_ID};
use crate::symbol::SymbolStore;
use crate::term::Term;
use std::cell::{Cell, OnceCell};
use std::fmt;
use std::rc::Rc;

/// A partial plan: a candidate in the plan-space search.
///
/// Plans are immutable; a refinement forks a new plan that shares the
/// parent's chains, orderings, and bindings. The rank tuple is
/// materialized lazily and written at most once.
pub struct Plan {
    steps: Chain<Step>,
    num_steps: usize,
    links: Chain<Link>,
    num_links: usize,
    orderings: Rc<Orderings>,
    bindings: Rc<Bindings>,
    frames: Chain<DecompositionFrame>,
    num_frames: usize,
    decomposition_links: Chain<DecompositionLink>,
    num_decomposition_links: usize,
    unsafes: Chain<UnsafeFlaw>,
    num_unsafes: usize,
    open_conds: Chain<OpenCondition>,
    num_open_conds: usize,
    unexpanded_steps: Chain<UnexpandedStep>,
    num_unexpanded_steps: usize,
    mutex_threats: Chain<MutexThreat>,
    rank: OnceCell<Vec<f32>>,
    id: Cell<u64>,
    parent_id: Option<u64>,
}

/// The mutable image of a plan under construction; refinements edit a
/// copy of the parent's parts and seal it back into a `Plan`.
#[derive(Clone)]
pub(crate) struct PlanParts {
    pub steps: Chain<Step>,
    pub num_steps: usize,
    pub links: Chain<Link>,
    pub num_links: usize,
    pub orderings: Rc<Orderings>,
    pub bindings: Rc<Bindings>,
    pub frames: Chain<DecompositionFrame>,
    pub num_frames: usize,
    pub decomposition_links: Chain<DecompositionLink>,
    pub num_decomposition_links: usize,
    pub unsafes: Chain<UnsafeFlaw>,
    pub num_unsafes: usize,
    pub open_conds: Chain<OpenCondition>,
    pub num_open_conds: usize,
    pub unexpanded_steps: Chain<UnexpandedStep>,
    pub num_unexpanded_steps: usize,
    pub mutex_threats: Chain<MutexThreat>,
}

impl Plan {
    pub(crate) fn parts(&self) -> PlanParts {
        PlanParts {
            steps: self.steps.clone(),
            num_steps: self.num_steps,
            links: self.links.clone(),
            num_links: self.num_links,
            orderings: self.orderings.clone(),
            bindings: self.bindings.clone(),
            frames: self.frames.clone(),
            num_frames: self.num_frames,
            decomposition_links: self.decomposition_links.clone(),
            num_decomposition_links: self.num_decomposition_links,
            unsafes: self.unsafes.clone(),
            num_unsafes: self.num_unsafes,
            open_conds: self.open_conds.clone(),
            num_open_conds: self.num_open_conds,
            unexpanded_steps: self.unexpanded_steps.clone(),
            num_unexpanded_steps: self.num_unexpanded_steps,
            mutex_threats: self.mutex_threats.clone(),
        }
    }

    pub(crate) fn from_parts(parts: PlanParts, parent: Option<&Plan>) -> Rc<Plan> {
        Rc::new(Plan {
            steps: parts.steps,
            num_steps: parts.num_steps,
            links: parts.links,
            num_links: parts.num_links,
            orderings: parts.orderings,
            bindings: parts.bindings,
            frames: parts.frames,
            num_frames: parts.num_frames,
            decomposition_links: parts.decomposition_links,
            num_decomposition_links: parts.num_decomposition_links,
            unsafes: parts.unsafes,
            num_unsafes: parts.num_unsafes,
            open_conds: parts.open_conds,
            num_open_conds: parts.num_open_conds,
            unexpanded_steps: parts.unexpanded_steps,
            num_unexpanded_steps: parts.num_unexpanded_steps,
            mutex_threats: parts.mutex_threats,
            rank: OnceCell::new(),
            id: Cell::new(0),
            parent_id: parent.map(|p| p.serial_no()),
        })
    }

    pub fn steps(&self) -> &Chain<Step> {
        &self.steps
    }

    /// Number of real (non-dummy) steps.
    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn links(&self) -> &Chain<Link> {
        &self.links
    }

    pub fn num_links(&self) -> usize {
        self.num_links
    }

    pub fn orderings(&self) -> &Orderings {
        &self.orderings
    }

    pub(crate) fn orderings_rc(&self) -> &Rc<Orderings> {
        &self.orderings
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub(crate) fn bindings_rc(&self) -> &Rc<Bindings> {
        &self.bindings
    }

    pub fn decomposition_frames(&self) -> &Chain<DecompositionFrame> {
        &self.frames
    }

    pub fn num_decomposition_frames(&self) -> usize {
        self.num_frames
    }

    pub fn decomposition_links(&self) -> &Chain<DecompositionLink> {
        &self.decomposition_links
    }

    pub fn num_decomposition_links(&self) -> usize {
        self.num_decomposition_links
    }

    pub fn unsafes(&self) -> &Chain<UnsafeFlaw> {
        &self.unsafes
    }

    pub fn num_unsafes(&self) -> usize {
        self.num_unsafes
    }

    pub fn open_conds(&self) -> &Chain<OpenCondition> {
        &self.open_conds
    }

    /// Open conditions admitted so far. With static-precondition
    /// stripping this exceeds the chain length: stripped conditions
    /// count toward the heuristics without entering the fringe.
    pub fn num_open_conds(&self) -> usize {
        self.num_open_conds
    }

    pub fn unexpanded_steps(&self) -> &Chain<UnexpandedStep> {
        &self.unexpanded_steps
    }

    pub fn num_unexpanded_steps(&self) -> usize {
        self.num_unexpanded_steps
    }

    pub fn mutex_threats(&self) -> &Chain<MutexThreat> {
        &self.mutex_threats
    }

    /// A plan is complete when all four flaw chains are empty.
    pub fn complete(&self) -> bool {
        self.unsafes.is_empty()
            && self.open_conds.is_empty()
            && self.unexpanded_steps.is_empty()
            && self.mutex_threats.is_empty()
    }

    /// All outstanding flaws, threats first.
    pub fn flaws(&self) -> impl Iterator<Item = Flaw> + '_ {
        self.unsafes
            .iter()
            .map(|u| Flaw::Unsafe(u.clone()))
            .chain(
                self.unexpanded_steps
                    .iter()
                    .map(|u| Flaw::UnexpandedStep(u.clone())),
            )
            .chain(
                self.open_conds
                    .iter()
                    .map(|oc| Flaw::OpenCondition(oc.clone())),
            )
            .chain(
                self.mutex_threats
                    .iter()
                    .map(|m| Flaw::MutexThreat(m.clone())),
            )
    }

    pub fn find_step(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id() == id)
    }

    /// The rank tuple; computed on first use, lexicographically smaller
    /// is better.
    pub fn rank(&self, ctx: &SearchContext) -> &[f32] {
        self.rank.get_or_init(|| {
            ctx.params().heuristic.plan_rank(
                self,
                ctx.params().weight,
                ctx.graph(),
                ctx.params().ground_actions,
            )
        })
    }

    pub fn primary_rank(&self, ctx: &SearchContext) -> f32 {
        self.rank(ctx)[0]
    }

    pub fn serial_no(&self) -> u64 {
        self.id.get()
    }

    pub(crate) fn assign_serial(&self, id: u64) {
        self.id.set(id);
    }

    /// Serial number of the plan this one was refined from.
    pub fn parent_serial(&self) -> Option<u64> {
        self.parent_id
    }

    /// Render the plan against the symbol store that named its actions.
    pub fn display<'a>(&'a self, symbols: &'a SymbolStore) -> PlanDisplay<'a> {
        PlanDisplay {
            plan: self,
            symbols,
        }
    }
}

/// Decompose a goal formula into open conditions and bindings.
///
/// Appends an entry per atomic obligation (unless `test_only`) and
/// always bumps the count; binding literals land in `new_bindings`
/// instead. Returns false iff the goal is a contradiction, in which
/// case the caller discards all partial work.
pub(crate) fn add_goal(
    ctx: &SearchContext,
    open_conds: &mut Chain<OpenCondition>,
    num_open_conds: &mut usize,
    new_bindings: &mut Vec<Binding>,
    goal: &Rc<Formula>,
    step_id: StepId,
    test_only: bool,
) -> bool {
    let mut goals: Vec<Rc<Formula>> = vec![goal.clone()];
    // With random_open_conditions, a new obligation lands at a uniform
    // position among the pending ones instead of on top.
    let push = |goals: &mut Vec<Rc<Formula>>, f: Rc<Formula>, ctx: &SearchContext| {
        if ctx.params().random_open_conditions {
            let pos = ctx.random_position(goals.len() + 1);
            if pos == goals.len() {
                goals.push(f);
            } else {
                let tmp = goals[pos].clone();
                goals[pos] = f;
                goals.push(tmp);
            }
        } else {
            goals.push(f);
        }
    };
    while let Some(goal) = goals.pop() {
        match &*goal {
            Formula::True => {}
            Formula::False => return false,
            Formula::Literal(literal) => {
                admit_literal(
                    ctx,
                    open_conds,
                    num_open_conds,
                    literal.clone(),
                    FormulaTime::AtStart,
                    step_id,
                    test_only,
                );
            }
            Formula::TimedLiteral { literal, when } => {
                admit_literal(
                    ctx,
                    open_conds,
                    num_open_conds,
                    literal.clone(),
                    *when,
                    step_id,
                    test_only,
                );
            }
            Formula::Conjunction(fs) => {
                for f in fs {
                    push(&mut goals, f.clone(), ctx);
                }
            }
            Formula::Disjunction(_) => {
                if !test_only {
                    *open_conds = open_conds.push(OpenCondition {
                        step_id,
                        condition: OpenCond::Disjunction(goal.clone()),
                    });
                }
                *num_open_conds += 1;
            }
            Formula::Equality(bl) => {
                new_bindings.push(Binding::equal(
                    bl.var,
                    bl.var_step_or(step_id),
                    bl.term,
                    bl.term_step_or(step_id),
                ));
            }
            Formula::Inequality(bl) => {
                // Variable-variable inequalities become branching flaws
                // under domain constraints; everything else refines the
                // bindings directly.
                if ctx.params().domain_constraints && bl.term.is_variable() {
                    if !test_only {
                        let mut resolved = bl.clone();
                        resolved.var_step = Some(bl.var_step_or(step_id));
                        resolved.term_step = Some(bl.term_step_or(step_id));
                        *open_conds = open_conds.push(OpenCondition {
                            step_id,
                            condition: OpenCond::Inequality(resolved),
                        });
                    }
                    *num_open_conds += 1;
                } else {
                    new_bindings.push(Binding::unequal(
                        bl.var,
                        bl.var_step_or(step_id),
                        bl.term,
                        bl.term_step_or(step_id),
                    ));
                }
            }
            Formula::Exists { body, .. } => {
                push(&mut goals, body.clone(), ctx);
            }
            Formula::Forall { .. } => {
                let expanded = goal.universal_base(ctx.terms());
                push(&mut goals, expanded, ctx);
            }
        }
    }
    true
}

fn admit_literal(
    ctx: &SearchContext,
    open_conds: &mut Chain<OpenCondition>,
    num_open_conds: &mut usize,
    literal: crate::formula::Literal,
    when: FormulaTime,
    step_id: StepId,
    test_only: bool,
) {
    let stripped = ctx.params().strip_static_preconditions
        && ctx.domain().static_predicate(literal.predicate());
    if !test_only && !stripped {
        *open_conds = open_conds.push(OpenCondition {
            step_id,
            condition: OpenCond::Literal { literal, when },
        });
    }
    *num_open_conds += 1;
}

/// Find threats to the given link among the given steps.
pub(crate) fn link_threats(
    ctx: &SearchContext,
    unsafes: &mut Chain<UnsafeFlaw>,
    num_unsafes: &mut usize,
    link: &Link,
    steps: &Chain<Step>,
    orderings: &Orderings,
    bindings: &Bindings,
) {
    let lt1 = link.effect_time();
    let lt2 = link.condition_time().end_time();
    let durative = ctx.domain().requirements().durative_actions;
    for s in steps.iter() {
        if !orderings.possibly_not_after(link.from_id(), lt1, s.id(), StepTime::End)
            || !orderings.possibly_not_before(link.to_id(), lt2, s.id(), StepTime::Start)
        {
            continue;
        }
        for effect in s.action().effects() {
            if !durative && effect.link_condition().contradiction() {
                continue;
            }
            let et = effect.when().step_time();
            if s.id() == link.to_id() && et >= lt2 {
                continue;
            }
            if !orderings.possibly_not_after(link.from_id(), lt1, s.id(), et)
                || !orderings.possibly_not_before(link.to_id(), lt2, s.id(), et)
            {
                continue;
            }
            // An effect cannot threaten the link it produces.
            if !link.condition().negated && link.from_id() == s.id() && lt1 == et {
                continue;
            }
            if bindings
                .affects(effect.literal(), s.id(), link.condition(), link.to_id())
                .is_some()
            {
                *unsafes = unsafes.push(UnsafeFlaw {
                    link: link.clone(),
                    step_id: s.id(),
                    effect: effect.clone(),
                });
                *num_unsafes += 1;
            }
        }
    }
}

/// Find links threatened by the given step.
pub(crate) fn step_threats(
    ctx: &SearchContext,
    unsafes: &mut Chain<UnsafeFlaw>,
    num_unsafes: &mut usize,
    step: &Step,
    links: &Chain<Link>,
    orderings: &Orderings,
    bindings: &Bindings,
) {
    let durative = ctx.domain().requirements().durative_actions;
    for link in links.iter() {
        let lt1 = link.effect_time();
        let lt2 = link.condition_time().end_time();
        if !orderings.possibly_not_after(link.from_id(), lt1, step.id(), StepTime::End)
            || !orderings.possibly_not_before(link.to_id(), lt2, step.id(), StepTime::Start)
        {
            continue;
        }
        for effect in step.action().effects() {
            if !durative && effect.link_condition().contradiction() {
                continue;
            }
            let et = effect.when().step_time();
            if step.id() == link.to_id() && et >= lt2 {
                continue;
            }
            if !orderings.possibly_not_after(link.from_id(), lt1, step.id(), et)
                || !orderings.possibly_not_before(link.to_id(), lt2, step.id(), et)
            {
                continue;
            }
            if !link.condition().negated && link.from_id() == step.id() && lt1 == et {
                continue;
            }
            if bindings
                .affects(effect.literal(), step.id(), link.condition(), link.to_id())
                .is_some()
            {
                *unsafes = unsafes.push(UnsafeFlaw {
                    link: link.clone(),
                    step_id: step.id(),
                    effect: effect.clone(),
                });
                *num_unsafes += 1;
            }
        }
    }
}

/// Find mutex threats between the given step and earlier steps:
/// possibly concurrent effects whose atoms unify. Durative domains
/// only.
pub(crate) fn mutex_threats(
    ctx: &SearchContext,
    threats: &mut Chain<MutexThreat>,
    step: &Step,
    steps: &Chain<Step>,
    orderings: &Orderings,
    bindings: &Bindings,
) {
    if !ctx.domain().requirements().durative_actions {
        return;
    }
    for s in steps.iter() {
        if s.id() >= step.id() {
            continue;
        }
        let Some(flags) = orderings.possibly_concurrent(step.id(), s.id()) else {
            continue;
        };
        for e1 in step.action().effects() {
            let e1_start = e1.when() == crate::action::EffectTime::AtStart;
            if e1_start {
                if !flags.start_start && !flags.start_end {
                    continue;
                }
            } else if !flags.end_start && !flags.end_end {
                continue;
            }
            for e2 in s.action().effects() {
                let e2_start = e2.when() == crate::action::EffectTime::AtStart;
                let pair_possible = match (e1_start, e2_start) {
                    (true, true) => flags.start_start,
                    (true, false) => flags.start_end,
                    (false, true) => flags.end_start,
                    (false, false) => flags.end_end,
                };
                if !pair_possible {
                    continue;
                }
                if bindings
                    .unify_atoms(e1.literal(), step.id(), e2.literal(), s.id())
                    .is_some()
                {
                    *threats = threats.push(MutexThreat::Threat {
                        step_id1: step.id(),
                        effect1: e1.clone(),
                        step_id2: s.id(),
                        effect2: e2.clone(),
                    });
                }
            }
        }
    }
}

/// The initial plan for the problem in the context: dummy init and goal
/// steps, the goal admitted as open conditions, a step per timed
/// initial literal, and the mutex placeholder. `None` if the goal is
/// contradictory or the timed literals cannot be ordered.
pub(crate) fn make_initial_plan(ctx: &SearchContext) -> Option<Rc<Plan>> {
    let mut open_conds = Chain::new();
    let mut num_open_conds = 0;
    let mut new_bindings = Vec::new();
    if !add_goal(
        ctx,
        &mut open_conds,
        &mut num_open_conds,
        &mut new_bindings,
        ctx.goal_action().condition(),
        GOAL_ID,
        false,
    ) {
        return None;
    }
    let bindings = Bindings::new(ctx.terms().clone()).add(&new_bindings)?;

    let mut steps = Chain::new()
        .push(Step::new(INIT_ID, ctx.problem().init_action().clone()))
        .push(Step::new(GOAL_ID, ctx.goal_action().clone()));
    let mut num_steps = 0;

    let mut orderings = if ctx.domain().requirements().durative_actions {
        Orderings::temporal()
    } else {
        Orderings::binary()
    };
    for (time, action) in ctx.problem().timed_actions() {
        num_steps += 1;
        steps = steps.push(Step::new(num_steps as StepId, action.clone()));
        orderings = orderings.refine_timed(*time, num_steps as StepId)?;
    }

    let parts = PlanParts {
        steps,
        num_steps,
        links: Chain::new(),
        num_links: 0,
        orderings: Rc::new(orderings),
        bindings: Rc::new(bindings),
        frames: Chain::new(),
        num_frames: 0,
        decomposition_links: Chain::new(),
        num_decomposition_links: 0,
        unsafes: Chain::new(),
        num_unsafes: 0,
        open_conds,
        num_open_conds,
        unexpanded_steps: Chain::new(),
        num_unexpanded_steps: 0,
        mutex_threats: Chain::new().push(MutexThreat::Placeholder),
    };
    Some(Plan::from_parts(parts, None))
}

/// Bind every remaining schema parameter of every step to a concrete
/// object, backtracking chronologically. Returns the completed
/// bindings, or `None` if no consistent instantiation exists.
pub(crate) fn step_instantiation(steps: &[Step], bindings: &Bindings) -> Option<Bindings> {
    fn rec(steps: &[Step], index: usize, param: usize, bindings: &Bindings) -> Option<Bindings> {
        let Some(step) = steps.get(index) else {
            return Some(bindings.clone());
        };
        let params = step.action().parameters();
        let Some(&v) = params.get(param) else {
            return rec(steps, index + 1, 0, bindings);
        };
        if bindings.value(v, step.id()).is_some() {
            return rec(steps, index, param + 1, bindings);
        }
        for object in bindings.domain(v, step.id()) {
            let binding = Binding::equal(v, step.id(), Term::Object(object), 0);
            if let Some(next) = bindings.add(&[binding]) {
                if let Some(done) = rec(steps, index, param + 1, &next) {
                    return Some(done);
                }
            }
        }
        None
    }
    rec(steps, 0, 0, bindings)
}

/// Renders a plan ordered by scheduled start times.
pub struct PlanDisplay<'a> {
    plan: &'a Plan,
    symbols: &'a SymbolStore,
}

impl fmt::Display for PlanDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plan = self.plan;
        let schedule = plan
            .orderings()
            .schedule(plan.steps().iter().map(|s| s.id()));
        writeln!(f, "makespan: {}", schedule.makespan)?;
        let mut rows: Vec<&Step> = plan
            .steps()
            .iter()
            .filter(|s| s.id() != INIT_ID && s.id() != GOAL_ID && !s.action().is_dummy())
            .collect();
        rows.sort_by(|a, b| {
            let ta = schedule.start_times.get(&a.id()).copied().unwrap_or(0.0);
            let tb = schedule.start_times.get(&b.id()).copied().unwrap_or(0.0);
            ta.partial_cmp(&tb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id().cmp(&b.id()))
        });
        for step in rows {
            let t = schedule.start_times.get(&step.id()).copied().unwrap_or(0.0);
            let name = self
                .symbols
                .resolve(step.action().name())
                .unwrap_or("?");
            write!(f, "{t}: ({name}")?;
            for &param in step.action().parameters() {
                match plan.bindings().binding(Term::Variable(param), step.id()) {
                    Term::Object(o) => {
                        let name = plan.bindings().terms().object_name(o);
                        write!(f, " {}", self.symbols.resolve(name).unwrap_or("?"))?;
                    }
                    Term::Variable(v) => write!(f, " ?{}", v.raw())?,
                }
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::test_support::simple_context;

    #[test]
    fn empty_goal_yields_complete_initial_plan() {
        let (ctx, _symbols) = simple_context(|_, _, _| Rc::new(Formula::True));
        let plan = make_initial_plan(&ctx).unwrap();
        // The mutex placeholder is the only flaw-chain entry.
        assert!(plan.unsafes().is_empty());
        assert!(plan.open_conds().is_empty());
        assert!(plan.unexpanded_steps().is_empty());
        assert_eq!(plan.mutex_threats().len(), 1);
        assert!(!plan.complete());
    }

    #[test]
    fn contradictory_goal_has_no_initial_plan() {
        let (ctx, _symbols) = simple_context(|_, _, _| Rc::new(Formula::False));
        assert!(make_initial_plan(&ctx).is_none());
    }

    #[test]
    fn goal_literal_becomes_open_condition() {
        let (ctx, _symbols) = simple_context(|goal_lit, _, _| goal_lit);
        let plan = make_initial_plan(&ctx).unwrap();
        assert_eq!(plan.open_conds().len(), 1);
        assert_eq!(plan.num_open_conds(), 1);
        let oc = plan.open_conds().first().unwrap();
        assert_eq!(oc.step_id, GOAL_ID);
    }

    #[test]
    fn conjunction_admits_each_conjunct() {
        let (ctx, _symbols) = simple_context(|goal_lit, other_lit, _| {
            Formula::and([goal_lit, other_lit])
        });
        let plan = make_initial_plan(&ctx).unwrap();
        assert_eq!(plan.open_conds().len(), 2);
    }

    #[test]
    fn disjunction_is_one_open_condition() {
        let (ctx, _symbols) = simple_context(|goal_lit, other_lit, _| {
            Formula::or([goal_lit, other_lit])
        });
        let plan = make_initial_plan(&ctx).unwrap();
        assert_eq!(plan.open_conds().len(), 1);
        assert!(matches!(
            plan.open_conds().first().unwrap().condition,
            OpenCond::Disjunction(_)
        ));
    }

    #[test]
    fn tautology_admission_changes_nothing() {
        let (ctx, _symbols) = simple_context(|goal_lit, _, _| goal_lit);
        let plan = make_initial_plan(&ctx).unwrap();
        let mut open_conds = plan.open_conds().clone();
        let mut num = plan.num_open_conds();
        let mut bindings = Vec::new();
        let ok = add_goal(
            &ctx,
            &mut open_conds,
            &mut num,
            &mut bindings,
            &Rc::new(Formula::True),
            GOAL_ID,
            false,
        );
        assert!(ok);
        assert_eq!(num, plan.num_open_conds());
        assert_eq!(open_conds.len(), plan.open_conds().len());
        assert!(bindings.is_empty());
    }

    #[test]
    fn contradiction_admission_reports_failure() {
        let (ctx, _symbols) = simple_context(|goal_lit, _, _| goal_lit);
        let mut open_conds = Chain::new();
        let mut num = 0;
        let mut bindings = Vec::new();
        let ok = add_goal(
            &ctx,
            &mut open_conds,
            &mut num,
            &mut bindings,
            &Rc::new(Formula::False),
            GOAL_ID,
            false,
        );
        assert!(!ok);
    }

    #[test]
    fn forked_plans_share_parent_chains() {
        let (ctx, _symbols) = simple_context(|goal_lit, _, _| goal_lit);
        let plan = make_initial_plan(&ctx).unwrap();
        let mut parts = plan.parts();
        parts.mutex_threats = parts.mutex_threats.remove(&MutexThreat::Placeholder);
        let child = Plan::from_parts(parts, Some(&plan));
        assert_eq!(plan.mutex_threats().len(), 1);
        assert!(child.mutex_threats().is_empty());
        assert_eq!(child.open_conds().len(), plan.open_conds().len());
    }
}
