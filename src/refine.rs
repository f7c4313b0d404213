//! Refinement operators: each takes a plan and one flaw and produces
//! the successor plans that repair it. A successor that runs into an
//! inconsistency (bindings, orderings, or a contradictory goal) is
//! abandoned without side effects on the parent.

use crate::bindings::{Binding, Bindings};
use crate::chain::Chain;
use crate::decomposition::{Decomposition, DecompositionFrame, DecompositionLink};
use crate::flaw::{Flaw, MutexThreat, OpenCond, OpenCondition, UnexpandedStep, UnsafeFlaw};
use crate::flawsel::FlawSelectionOrder;
use crate::formula::{BindingLiteral, Formula, Literal};
use crate::orderings::OrderingConstraint;
use crate::plan::{add_goal, link_threats, mutex_threats, step_threats, Plan};
use crate::search::SearchContext;
use crate::step::{Link, Step, StepId, StepTime, INIT_ID};
use crate::term::Term;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Expand a plan: select one flaw via the given order and produce the
/// successors that repair it.
pub(crate) fn refinements(
    plan: &Plan,
    ctx: &SearchContext,
    order: &FlawSelectionOrder,
) -> Vec<Rc<Plan>> {
    let flaw = order.select(plan, ctx);
    if !ctx.params().ground_actions {
        let is_static = matches!(&flaw, Flaw::OpenCondition(oc) if oc.is_static(ctx.domain()));
        ctx.set_static_flaw(is_static);
    }
    let mut out = Vec::new();
    match flaw {
        Flaw::Unsafe(u) => handle_unsafe(plan, ctx, &u, &mut out),
        Flaw::OpenCondition(oc) => handle_open_condition(plan, ctx, &oc, &mut out),
        Flaw::UnexpandedStep(u) => handle_unexpanded_step(plan, ctx, &u, &mut out),
        Flaw::MutexThreat(m) => handle_mutex_threat(plan, ctx, &m, &mut out),
    }
    out
}

/* ====================================================================== */
/* Unsafe links */

fn handle_unsafe(plan: &Plan, ctx: &SearchContext, unsafe_: &UnsafeFlaw, out: &mut Vec<Rc<Plan>>) {
    let link = &unsafe_.link;
    let lt1 = link.effect_time();
    let lt2 = link.condition_time().end_time();
    let et = unsafe_.effect.when().step_time();
    let orderings = plan.orderings();
    let threat = orderings.possibly_not_after(link.from_id(), lt1, unsafe_.step_id, et)
        && orderings.possibly_not_before(link.to_id(), lt2, unsafe_.step_id, et);
    let unifier = threat
        .then(|| {
            plan.bindings().affects(
                unsafe_.effect.literal(),
                unsafe_.step_id,
                link.condition(),
                link.to_id(),
            )
        })
        .flatten();
    match unifier {
        Some(unifier) => {
            separate(plan, ctx, unsafe_, &unifier, false, out);
            promote(plan, ctx, unsafe_, false, out);
            demote(plan, ctx, unsafe_, false, out);
        }
        None => {
            // Bogus flaw: discharged by dropping the entry.
            let mut parts = plan.parts();
            parts.unsafes = parts.unsafes.remove(unsafe_);
            parts.num_unsafes -= 1;
            out.push(Plan::from_parts(parts, Some(plan)));
        }
    }
}

/// Repair a threat by constraining the bindings so the effect cannot
/// unify with the link condition: a disjunction of inequalities over
/// the unifier, plus the universally negated effect condition when the
/// effect is conditional.
pub(crate) fn separate(
    plan: &Plan,
    ctx: &SearchContext,
    unsafe_: &UnsafeFlaw,
    unifier: &[Binding],
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let mut disjuncts: Vec<Rc<Formula>> = Vec::new();
    for subst in unifier {
        if unsafe_.effect.quantifies(subst.var) {
            continue;
        }
        if subst.term == Term::Variable(subst.var) && subst.term_step == subst.var_step {
            continue;
        }
        if plan.bindings().consistent_with_inequality(
            subst.var,
            subst.var_step,
            subst.term,
            subst.term_step,
        ) {
            disjuncts.push(Rc::new(Formula::Inequality(BindingLiteral {
                var: subst.var,
                var_step: Some(subst.var_step),
                term: subst.term,
                term_step: Some(subst.term_step),
            })));
        }
    }
    let effect_cond = unsafe_.effect.condition();
    if !effect_cond.tautology() {
        disjuncts.push(negated_effect_condition(
            ctx,
            &unsafe_.effect,
            unsafe_.step_id,
            test_only,
        ));
    }
    let goal = Formula::or(disjuncts);

    let mut new_open_conds = if test_only {
        Chain::new()
    } else {
        plan.open_conds().clone()
    };
    let mut new_num_open_conds = if test_only { 0 } else { plan.num_open_conds() };
    let mut new_bindings = Vec::new();
    if !add_goal(
        ctx,
        &mut new_open_conds,
        &mut new_num_open_conds,
        &mut new_bindings,
        &goal,
        unsafe_.step_id,
        test_only,
    ) {
        return 0;
    }
    let Some(bindings) = plan.bindings().add(&new_bindings) else {
        return 0;
    };
    if test_only {
        return 1;
    }
    let mut orderings = plan.orderings_rc().clone();
    if !goal.tautology() && orderings.is_temporal() {
        if let Some(graph) = ctx.graph() {
            let hv = graph.formula_value(
                &goal,
                unsafe_.step_id,
                (!ctx.params().ground_actions).then_some(&bindings),
            );
            match orderings.refine_bounds(unsafe_.step_id, hv.makespan, hv.makespan) {
                Some(o) => orderings = Rc::new(o),
                None => return 0,
            }
        }
    }
    let mut parts = plan.parts();
    parts.orderings = orderings;
    parts.bindings = Rc::new(bindings);
    parts.unsafes = parts.unsafes.remove(unsafe_);
    parts.num_unsafes -= 1;
    parts.open_conds = new_open_conds;
    parts.num_open_conds = new_num_open_conds;
    out.push(Plan::from_parts(parts, Some(plan)));
    1
}

/// The universal negation of a conditional effect's condition, with the
/// effect's quantified parameters re-bound to fresh variables.
fn negated_effect_condition(
    ctx: &SearchContext,
    effect: &crate::action::Effect,
    _step_id: StepId,
    test_only: bool,
) -> Rc<Formula> {
    let negated = Formula::negation(effect.condition());
    if effect.arity() == 0 {
        return negated;
    }
    let mut parameters = smallvec::SmallVec::new();
    let mut map = FxHashMap::default();
    for &vi in effect.parameters() {
        let v = if test_only {
            vi
        } else {
            ctx.terms().add_variable(ctx.terms().variable_type(vi))
        };
        parameters.push(v);
        if !test_only {
            map.insert(vi, Term::Variable(v));
        }
    }
    let body = negated.substitution(&map);
    if body.tautology() || body.contradiction() {
        return body;
    }
    Rc::new(Formula::Forall { parameters, body })
}

pub(crate) fn promote(
    plan: &Plan,
    ctx: &SearchContext,
    unsafe_: &UnsafeFlaw,
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let link = &unsafe_.link;
    let lt2 = link.condition_time().end_time();
    let et = unsafe_.effect.when().step_time();
    if plan
        .orderings()
        .possibly_before(link.to_id(), lt2, unsafe_.step_id, et)
    {
        if !test_only {
            new_ordering(plan, ctx, link.to_id(), lt2, unsafe_.step_id, et, unsafe_, out);
        }
        1
    } else {
        0
    }
}

pub(crate) fn demote(
    plan: &Plan,
    ctx: &SearchContext,
    unsafe_: &UnsafeFlaw,
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let link = &unsafe_.link;
    let lt1 = link.effect_time();
    let et = unsafe_.effect.when().step_time();
    if plan
        .orderings()
        .possibly_before(unsafe_.step_id, et, link.from_id(), lt1)
    {
        if !test_only {
            new_ordering(plan, ctx, unsafe_.step_id, et, link.from_id(), lt1, unsafe_, out);
        }
        1
    } else {
        0
    }
}

#[allow(clippy::too_many_arguments)]
fn new_ordering(
    plan: &Plan,
    _ctx: &SearchContext,
    before_id: StepId,
    t1: StepTime,
    after_id: StepId,
    t2: StepTime,
    unsafe_: &UnsafeFlaw,
    out: &mut Vec<Rc<Plan>>,
) {
    if let Some(orderings) = plan
        .orderings()
        .refine(&OrderingConstraint::new(before_id, t1, after_id, t2))
    {
        let mut parts = plan.parts();
        parts.orderings = Rc::new(orderings);
        parts.unsafes = parts.unsafes.remove(unsafe_);
        parts.num_unsafes -= 1;
        out.push(Plan::from_parts(parts, Some(plan)));
    }
}

/* ====================================================================== */
/* Mutex threats */

fn handle_mutex_threat(
    plan: &Plan,
    ctx: &SearchContext,
    threat: &MutexThreat,
    out: &mut Vec<Rc<Plan>>,
) {
    let MutexThreat::Threat {
        step_id1,
        effect1,
        step_id2,
        effect2,
    } = threat
    else {
        // First handling: sweep all step pairs and replace the
        // placeholder with the discovered threats.
        let mut threats = Chain::new();
        for s in plan.steps().iter() {
            mutex_threats(
                ctx,
                &mut threats,
                s,
                plan.steps(),
                plan.orderings(),
                plan.bindings(),
            );
        }
        let mut parts = plan.parts();
        parts.mutex_threats = threats;
        out.push(Plan::from_parts(parts, Some(plan)));
        return;
    };
    let et1 = effect1.when().step_time();
    let et2 = effect2.when().step_time();
    let orderings = plan.orderings();
    let live = orderings.possibly_not_before(*step_id1, et1, *step_id2, et2)
        && orderings.possibly_not_after(*step_id1, et1, *step_id2, et2);
    let unifier = live
        .then(|| {
            plan.bindings()
                .unify_atoms(effect1.literal(), *step_id1, effect2.literal(), *step_id2)
        })
        .flatten();
    match unifier {
        Some(unifier) => {
            separate_mutex(plan, ctx, threat, &unifier, out);
            promote_mutex(plan, threat, out);
            demote_mutex(plan, threat, out);
        }
        None => {
            let mut parts = plan.parts();
            parts.mutex_threats = parts.mutex_threats.remove(threat);
            out.push(Plan::from_parts(parts, Some(plan)));
        }
    }
}

fn separate_mutex(
    plan: &Plan,
    ctx: &SearchContext,
    threat: &MutexThreat,
    unifier: &[Binding],
    out: &mut Vec<Rc<Plan>>,
) {
    let MutexThreat::Threat {
        step_id1,
        effect1,
        step_id2,
        effect2,
    } = threat
    else {
        return;
    };
    // One successor ruling out the unification.
    if !unifier.is_empty() {
        let mut disjuncts: Vec<Rc<Formula>> = Vec::new();
        for subst in unifier {
            if effect1.quantifies(subst.var) || effect2.quantifies(subst.var) {
                continue;
            }
            if plan.bindings().consistent_with_inequality(
                subst.var,
                subst.var_step,
                subst.term,
                subst.term_step,
            ) {
                disjuncts.push(Rc::new(Formula::Inequality(BindingLiteral {
                    var: subst.var,
                    var_step: Some(subst.var_step),
                    term: subst.term,
                    term_step: Some(subst.term_step),
                })));
            }
        }
        let goal = Formula::or(disjuncts);
        let mut new_open_conds = plan.open_conds().clone();
        let mut new_num_open_conds = plan.num_open_conds();
        let mut new_bindings = Vec::new();
        if add_goal(
            ctx,
            &mut new_open_conds,
            &mut new_num_open_conds,
            &mut new_bindings,
            &goal,
            INIT_ID,
            false,
        ) {
            if let Some(bindings) = plan.bindings().add(&new_bindings) {
                let mut parts = plan.parts();
                parts.bindings = Rc::new(bindings);
                parts.open_conds = new_open_conds;
                parts.num_open_conds = new_num_open_conds;
                parts.mutex_threats = parts.mutex_threats.remove(threat);
                out.push(Plan::from_parts(parts, Some(plan)));
            }
        }
    }
    // One successor per conditional effect, defusing it by negating its
    // condition.
    for (step_id, effect) in [(*step_id1, effect1), (*step_id2, effect2)] {
        if effect.condition().tautology() {
            continue;
        }
        let goal = negated_effect_condition(ctx, effect, step_id, false);
        let mut new_open_conds = plan.open_conds().clone();
        let mut new_num_open_conds = plan.num_open_conds();
        let mut new_bindings = Vec::new();
        if !add_goal(
            ctx,
            &mut new_open_conds,
            &mut new_num_open_conds,
            &mut new_bindings,
            &goal,
            step_id,
            false,
        ) {
            continue;
        }
        let Some(bindings) = plan.bindings().add(&new_bindings) else {
            continue;
        };
        let mut orderings = plan.orderings_rc().clone();
        if !goal.tautology() && orderings.is_temporal() {
            if let Some(graph) = ctx.graph() {
                let hv = graph.formula_value(
                    &goal,
                    step_id,
                    (!ctx.params().ground_actions).then_some(&bindings),
                );
                match orderings.refine_bounds(step_id, hv.makespan, hv.makespan) {
                    Some(o) => orderings = Rc::new(o),
                    None => continue,
                }
            }
        }
        let mut parts = plan.parts();
        parts.orderings = orderings;
        parts.bindings = Rc::new(bindings);
        parts.open_conds = new_open_conds;
        parts.num_open_conds = new_num_open_conds;
        parts.mutex_threats = parts.mutex_threats.remove(threat);
        out.push(Plan::from_parts(parts, Some(plan)));
    }
}

fn promote_mutex(plan: &Plan, threat: &MutexThreat, out: &mut Vec<Rc<Plan>>) {
    let MutexThreat::Threat {
        step_id1,
        effect1,
        step_id2,
        effect2,
    } = threat
    else {
        return;
    };
    let et1 = effect1.when().step_time();
    let et2 = effect2.when().step_time();
    if plan.orderings().possibly_before(*step_id2, et2, *step_id1, et1) {
        new_mutex_ordering(plan, *step_id2, et2, *step_id1, et1, threat, out);
    }
}

fn demote_mutex(plan: &Plan, threat: &MutexThreat, out: &mut Vec<Rc<Plan>>) {
    let MutexThreat::Threat {
        step_id1,
        effect1,
        step_id2,
        effect2,
    } = threat
    else {
        return;
    };
    let et1 = effect1.when().step_time();
    let et2 = effect2.when().step_time();
    if plan.orderings().possibly_before(*step_id1, et1, *step_id2, et2) {
        new_mutex_ordering(plan, *step_id1, et1, *step_id2, et2, threat, out);
    }
}

fn new_mutex_ordering(
    plan: &Plan,
    before_id: StepId,
    t1: StepTime,
    after_id: StepId,
    t2: StepTime,
    threat: &MutexThreat,
    out: &mut Vec<Rc<Plan>>,
) {
    if let Some(orderings) = plan
        .orderings()
        .refine(&OrderingConstraint::new(before_id, t1, after_id, t2))
    {
        let mut parts = plan.parts();
        parts.orderings = Rc::new(orderings);
        parts.mutex_threats = parts.mutex_threats.remove(threat);
        out.push(Plan::from_parts(parts, Some(plan)));
    }
}

/* ====================================================================== */
/* Open conditions */

fn handle_open_condition(
    plan: &Plan,
    ctx: &SearchContext,
    open_cond: &OpenCondition,
    out: &mut Vec<Rc<Plan>>,
) {
    match &open_cond.condition {
        OpenCond::Literal { literal, .. } => {
            let achievers = ctx.literal_achievers(literal);
            add_step(plan, ctx, literal, open_cond, &achievers, out);
            reuse_step(plan, ctx, literal, open_cond, &achievers, out);
            if literal.negated {
                new_cw_link(plan, ctx, literal, open_cond, false, out);
            }
        }
        OpenCond::Disjunction(disj) => {
            handle_disjunction(plan, ctx, &disj.clone(), open_cond, false, out);
        }
        OpenCond::Inequality(neq) => {
            handle_inequality(plan, ctx, &neq.clone(), open_cond, false, out);
        }
    }
}

/// One successor per disjunct: drop the disjunctive condition and admit
/// the disjunct as a fresh goal.
pub(crate) fn handle_disjunction(
    plan: &Plan,
    ctx: &SearchContext,
    disjunction: &Rc<Formula>,
    open_cond: &OpenCondition,
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let Formula::Disjunction(disjuncts) = &**disjunction else {
        return 0;
    };
    let mut count = 0;
    for disjunct in disjuncts {
        let mut new_open_conds = if test_only {
            Chain::new()
        } else {
            plan.open_conds().remove(open_cond)
        };
        let mut new_num_open_conds = if test_only {
            0
        } else {
            plan.num_open_conds() - 1
        };
        let mut new_bindings = Vec::new();
        if !add_goal(
            ctx,
            &mut new_open_conds,
            &mut new_num_open_conds,
            &mut new_bindings,
            disjunct,
            open_cond.step_id,
            test_only,
        ) {
            continue;
        }
        let Some(bindings) = plan.bindings().add(&new_bindings) else {
            continue;
        };
        count += 1;
        if !test_only {
            let mut parts = plan.parts();
            parts.bindings = Rc::new(bindings);
            parts.open_conds = new_open_conds;
            parts.num_open_conds = new_num_open_conds;
            out.push(Plan::from_parts(parts, Some(plan)));
        }
    }
    count
}

/// Branch on the variable with the smaller domain: one successor per
/// candidate object, binding one side to it and the other side away
/// from it.
pub(crate) fn handle_inequality(
    plan: &Plan,
    ctx: &SearchContext,
    neq: &BindingLiteral,
    open_cond: &OpenCondition,
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let _ = ctx;
    let step_id = open_cond.step_id;
    let s1 = neq.var_step_or(step_id);
    let bindings = plan.bindings();
    let Term::Variable(var2) = neq.term else {
        // Variable-object inequality: branch the variable over the
        // rest of its domain.
        let Term::Object(excluded) = neq.term else {
            return 0;
        };
        let mut count = 0;
        for object in bindings.domain(neq.var, s1) {
            if object == excluded {
                continue;
            }
            let Some(new_bindings) =
                bindings.add(&[Binding::equal(neq.var, s1, Term::Object(object), 0)])
            else {
                continue;
            };
            count += 1;
            if !test_only {
                let mut parts = plan.parts();
                parts.bindings = Rc::new(new_bindings);
                parts.open_conds = parts.open_conds.remove(open_cond);
                parts.num_open_conds -= 1;
                out.push(Plan::from_parts(parts, Some(plan)));
            }
        }
        return count;
    };
    let s2 = neq.term_step_or(step_id);
    let d1 = bindings.domain(neq.var, s1);
    let d2 = bindings.domain(var2, s2);
    let (var_a, id_a, var_b, id_b, dom) = if d1.len() < d2.len() {
        (neq.var, s1, var2, s2, d1)
    } else {
        (var2, s2, neq.var, s1, d2)
    };
    let mut count = 0;
    for object in dom {
        let new_bindings = bindings.add(&[
            Binding::equal(var_a, id_a, Term::Object(object), 0),
            Binding::unequal(var_b, id_b, Term::Object(object), 0),
        ]);
        let Some(new_bindings) = new_bindings else {
            continue;
        };
        count += 1;
        if !test_only {
            let mut parts = plan.parts();
            parts.bindings = Rc::new(new_bindings);
            parts.open_conds = parts.open_conds.remove(open_cond);
            parts.num_open_conds -= 1;
            out.push(Plan::from_parts(parts, Some(plan)));
        }
    }
    count
}

/// Repair a literal open condition by introducing a fresh step per
/// achieving (action, effect) pair.
fn add_step(
    plan: &Plan,
    ctx: &SearchContext,
    literal: &Literal,
    open_cond: &OpenCondition,
    achievers: &[(Rc<crate::action::Action>, Rc<crate::action::Effect>)],
    out: &mut Vec<Rc<Plan>>,
) {
    for (action, effect) in achievers {
        if action.is_dummy() {
            continue;
        }
        let step = Step::new(plan.num_steps() as StepId + 1, action.clone());
        new_link(plan, ctx, &step, effect, literal, open_cond, false, out);
    }
}

/// Repair a literal open condition by linking from an existing step
/// that can be ordered before the consumer.
fn reuse_step(
    plan: &Plan,
    ctx: &SearchContext,
    literal: &Literal,
    open_cond: &OpenCondition,
    achievers: &[(Rc<crate::action::Action>, Rc<crate::action::Effect>)],
    out: &mut Vec<Rc<Plan>>,
) {
    let _ = ctx;
    let gt = match &open_cond.condition {
        OpenCond::Literal { when, .. } => when.start_time(),
        _ => return,
    };
    for step in plan.steps().iter() {
        if !plan
            .orderings()
            .possibly_before(step.id(), StepTime::Start, open_cond.step_id, gt)
        {
            continue;
        }
        for (action, effect) in achievers {
            if !Rc::ptr_eq(action, step.action()) {
                continue;
            }
            let et = effect.when().step_time();
            if plan
                .orderings()
                .possibly_before(step.id(), et, open_cond.step_id, gt)
            {
                new_link(plan, ctx, &step.clone(), effect, literal, open_cond, false, out);
            }
        }
    }
}

/// Link an effect to an open condition if they unify.
#[allow(clippy::too_many_arguments)]
pub(crate) fn new_link(
    plan: &Plan,
    ctx: &SearchContext,
    step: &Step,
    effect: &Rc<crate::action::Effect>,
    literal: &Literal,
    open_cond: &OpenCondition,
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let Some(unifier) = plan
        .bindings()
        .unify(effect.literal(), step.id(), literal, open_cond.step_id)
    else {
        return 0;
    };
    make_link(plan, ctx, step, effect, literal, open_cond, &unifier, test_only, out)
}

/// Close a negated open condition from the initial state under the
/// closed-world assumption: for every initial atom that could unify
/// with the goal atom, at least one unifying binding is ruled out by an
/// inequality.
pub(crate) fn new_cw_link(
    plan: &Plan,
    ctx: &SearchContext,
    negation: &Literal,
    open_cond: &OpenCondition,
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    debug_assert!(negation.negated);
    let goal_atom = negation.complement();
    let mut conjuncts: Vec<Rc<Formula>> = Vec::new();
    for effect in ctx.problem().init_action().effects() {
        let Some(mgu) =
            plan.bindings()
                .unify_atoms(effect.literal(), INIT_ID, &goal_atom, open_cond.step_id)
        else {
            continue;
        };
        if mgu.is_empty() {
            // The goal atom is identically true initially; it cannot be
            // separated from the initial state.
            return 0;
        }
        let binds = Formula::or(mgu.iter().map(|subst| {
            Rc::new(Formula::Inequality(BindingLiteral {
                var: subst.var,
                var_step: Some(subst.var_step),
                term: subst.term,
                term_step: Some(subst.term_step),
            }))
        }));
        conjuncts.push(binds);
    }
    let goals = Formula::and(conjuncts);
    let mut new_open_conds = if test_only {
        Chain::new()
    } else {
        plan.open_conds().remove(open_cond)
    };
    let mut new_num_open_conds = if test_only {
        0
    } else {
        plan.num_open_conds() - 1
    };
    let mut new_bindings = Vec::new();
    if !add_goal(
        ctx,
        &mut new_open_conds,
        &mut new_num_open_conds,
        &mut new_bindings,
        &goals,
        INIT_ID,
        test_only,
    ) {
        return 0;
    }
    let Some(bindings) = plan.bindings().add(&new_bindings) else {
        return 0;
    };
    if test_only {
        return 1;
    }
    let when = match &open_cond.condition {
        OpenCond::Literal { when, .. } => *when,
        _ => return 0,
    };
    let link = Link::new(
        INIT_ID,
        StepTime::End,
        open_cond.step_id,
        negation.clone(),
        when,
    );
    let mut parts = plan.parts();
    parts.links = parts.links.push(link.clone());
    parts.num_links += 1;
    link_threats(
        ctx,
        &mut parts.unsafes,
        &mut parts.num_unsafes,
        &link,
        plan.steps(),
        plan.orderings(),
        &bindings,
    );
    parts.bindings = Rc::new(bindings);
    parts.open_conds = new_open_conds;
    parts.num_open_conds = new_num_open_conds;
    out.push(Plan::from_parts(parts, Some(plan)));
    1
}

/// Install a causal link from `step`'s effect to the open condition:
/// freshen quantified effect parameters, admit the effect condition
/// (and, for a new step, the step's precondition), refine orderings,
/// and detect the threats the new link and step introduce.
#[allow(clippy::too_many_arguments)]
pub(crate) fn make_link(
    plan: &Plan,
    ctx: &SearchContext,
    step: &Step,
    effect: &Rc<crate::action::Effect>,
    literal: &Literal,
    open_cond: &OpenCondition,
    unifier: &[Binding],
    test_only: bool,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let new_step = step.id() as usize > plan.num_steps() && step.id() != crate::step::GOAL_ID;

    // Bindings that unify effect and goal, with universally quantified
    // effect parameters renamed to fresh variables.
    let mut new_bindings: Vec<Binding> = Vec::new();
    let mut forall_map: FxHashMap<crate::term::VariableId, Term> = FxHashMap::default();
    if test_only {
        new_bindings.extend_from_slice(unifier);
    } else {
        for subst in unifier {
            if effect.quantifies(subst.var) {
                let v = ctx
                    .terms()
                    .add_variable(ctx.terms().variable_type(subst.var));
                forall_map.insert(subst.var, Term::Variable(v));
                new_bindings.push(Binding::equal(v, subst.var_step, subst.term, subst.term_step));
            } else {
                new_bindings.push(subst.clone());
            }
        }
    }

    let mut new_open_conds = if test_only {
        Chain::new()
    } else {
        plan.open_conds().remove(open_cond)
    };
    let mut new_num_open_conds = if test_only {
        0
    } else {
        plan.num_open_conds() - 1
    };

    // A conditional effect contributes its condition as a new goal.
    let mut cond_goal = Formula::and([effect.condition().clone(), effect.link_condition().clone()]);
    if !cond_goal.tautology() {
        if !test_only && effect.arity() > 0 {
            for &vi in effect.parameters() {
                forall_map.entry(vi).or_insert_with(|| {
                    Term::Variable(ctx.terms().add_variable(ctx.terms().variable_type(vi)))
                });
            }
            cond_goal = cond_goal.substitution(&forall_map);
        }
        if !add_goal(
            ctx,
            &mut new_open_conds,
            &mut new_num_open_conds,
            &mut new_bindings,
            &cond_goal,
            step.id(),
            test_only,
        ) {
            return 0;
        }
    }

    // A new step contributes its precondition, and under domain
    // constraints its parameters must keep non-empty domains.
    let mut bindings = plan.bindings().clone();
    if new_step {
        if !add_goal(
            ctx,
            &mut new_open_conds,
            &mut new_num_open_conds,
            &mut new_bindings,
            step.action().condition(),
            step.id(),
            test_only,
        ) {
            return 0;
        }
        if ctx.params().domain_constraints {
            match bindings.add_step_domains(step.id(), step.action()) {
                Some(b) => bindings = b,
                None => return 0,
            }
        }
    }
    let Some(bindings) = bindings.add(&new_bindings) else {
        return 0;
    };
    if test_only {
        return 1;
    }

    // Order the producing effect before the consumed condition.
    let et = effect.when().step_time();
    let gt = match &open_cond.condition {
        OpenCond::Literal { when, .. } => when.start_time(),
        _ => return 0,
    };
    let Some(mut orderings) = plan.orderings().refine(&OrderingConstraint::new(
        step.id(),
        et,
        open_cond.step_id,
        gt,
    )) else {
        return 0;
    };
    if !cond_goal.tautology() && orderings.is_temporal() {
        if let Some(graph) = ctx.graph() {
            let hv = graph.formula_value(
                &cond_goal,
                step.id(),
                (!ctx.params().ground_actions).then_some(&bindings),
            );
            match orderings.refine_bounds(step.id(), hv.makespan, hv.makespan) {
                Some(o) => orderings = o,
                None => return 0,
            }
        }
    }

    let new_steps = if new_step {
        plan.steps().push(step.clone())
    } else {
        plan.steps().clone()
    };
    let link = Link::new(
        step.id(),
        et,
        open_cond.step_id,
        literal.clone(),
        match &open_cond.condition {
            OpenCond::Literal { when, .. } => *when,
            _ => return 0,
        },
    );
    let mut parts = plan.parts();
    parts.steps = new_steps;
    if new_step {
        parts.num_steps += 1;
    }
    parts.links = parts.links.push(link.clone());
    parts.num_links += 1;
    parts.orderings = Rc::new(orderings);
    parts.open_conds = new_open_conds;
    parts.num_open_conds = new_num_open_conds;

    link_threats(
        ctx,
        &mut parts.unsafes,
        &mut parts.num_unsafes,
        &link,
        &parts.steps,
        &parts.orderings,
        &bindings,
    );
    if new_step {
        step_threats(
            ctx,
            &mut parts.unsafes,
            &mut parts.num_unsafes,
            step,
            plan.links(),
            &parts.orderings,
            &bindings,
        );
        mutex_threats(
            ctx,
            &mut parts.mutex_threats,
            step,
            &parts.steps,
            &parts.orderings,
            &bindings,
        );
        if step.action().composite() {
            parts.unexpanded_steps = parts.unexpanded_steps.push(UnexpandedStep {
                step: step.clone(),
            });
            parts.num_unexpanded_steps += 1;
        }
    }
    parts.bindings = Rc::new(bindings);
    out.push(Plan::from_parts(parts, Some(plan)));
    1
}

/* ====================================================================== */
/* Composite steps */

fn handle_unexpanded_step(
    plan: &Plan,
    ctx: &SearchContext,
    unexpanded: &UnexpandedStep,
    out: &mut Vec<Rc<Plan>>,
) {
    for decomposition in ctx.decompositions_for(unexpanded.step.action()) {
        add_decomposition_frame(plan, ctx, unexpanded, decomposition, out);
    }
}

/// Expand a composite step with one decomposition: install the frame's
/// pseudo-steps under fresh ids, fold its bindings, orderings, and
/// links into the plan, and swap the unexpanded-step flaw for a
/// decomposition link. Threats introduced by the installed links and
/// steps are detected like any others.
pub(crate) fn add_decomposition_frame(
    plan: &Plan,
    ctx: &SearchContext,
    unexpanded: &UnexpandedStep,
    decomposition: &Rc<Decomposition>,
    out: &mut Vec<Rc<Plan>>,
) -> usize {
    let mut frame = DecompositionFrame::instantiate(decomposition);
    frame.assign_ids(plan.num_steps() as StepId + 1);

    let mut parts = plan.parts();
    let mut bindings = plan.bindings().clone();
    let mut orderings = plan.orderings().clone();

    // Install steps: preconditions become open conditions, composite
    // pseudo-steps raise their own expansion flaws.
    for step in frame.steps() {
        parts.steps = parts.steps.push(step.clone());
        parts.num_steps += 1;
        if step.action().composite() {
            parts.unexpanded_steps = parts.unexpanded_steps.push(UnexpandedStep {
                step: step.clone(),
            });
            parts.num_unexpanded_steps += 1;
        }
        let mut step_bindings = Vec::new();
        if !add_goal(
            ctx,
            &mut parts.open_conds,
            &mut parts.num_open_conds,
            &mut step_bindings,
            step.action().condition(),
            step.id(),
            false,
        ) {
            return 0;
        }
        match bindings.add(&step_bindings) {
            Some(b) => bindings = b,
            None => return 0,
        }
    }

    // Install the frame's own bindings.
    match bindings.add(frame.bindings()) {
        Some(b) => bindings = b,
        None => return 0,
    }

    // The dummy final step inherits the composite step's obligations:
    // it precedes everything the composite contributed to.
    for link in plan.links().iter() {
        if link.from_id() == unexpanded.step_id() {
            match orderings.refine(&OrderingConstraint::new(
                frame.dummy_final_id(),
                StepTime::End,
                link.to_id(),
                StepTime::Start,
            )) {
                Some(o) => orderings = o,
                None => return 0,
            }
        }
    }
    // Each installed step follows its ancestors in the frame's link DAG.
    for step in frame.steps() {
        for link in frame.incoming_links(step.id()) {
            match orderings.refine(&OrderingConstraint::new(
                link.from_id(),
                StepTime::End,
                step.id(),
                StepTime::Start,
            )) {
                Some(o) => orderings = o,
                None => return 0,
            }
        }
    }
    // Explicit orderings declared by the decomposition.
    for constraint in frame.orderings() {
        match orderings.refine(constraint) {
            Some(o) => orderings = o,
            None => return 0,
        }
    }

    // Install internal links and detect the threats they are exposed to.
    for link in frame.links() {
        parts.links = parts.links.push(link.clone());
        parts.num_links += 1;
        link_threats(
            ctx,
            &mut parts.unsafes,
            &mut parts.num_unsafes,
            link,
            &parts.steps,
            &orderings,
            &bindings,
        );
    }
    // And the threats the installed steps pose to pre-existing links.
    for step in frame.steps() {
        step_threats(
            ctx,
            &mut parts.unsafes,
            &mut parts.num_unsafes,
            step,
            plan.links(),
            &orderings,
            &bindings,
        );
    }

    parts.unexpanded_steps = parts.unexpanded_steps.remove(unexpanded);
    parts.num_unexpanded_steps -= 1;
    parts.frames = parts.frames.push(frame.clone());
    parts.num_frames += 1;
    parts.decomposition_links = parts
        .decomposition_links
        .push(DecompositionLink::new(unexpanded.step_id(), frame));
    parts.num_decomposition_links += 1;
    parts.orderings = Rc::new(orderings);
    parts.bindings = Rc::new(bindings);
    out.push(Plan::from_parts(parts, Some(plan)));
    1
}

/* ====================================================================== */
/* Refinement counting (flaw-selection support) */

/// Breakdown of the refinements available for a threat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnsafeRefinements {
    pub total: usize,
    pub separable: usize,
    pub promotable: usize,
    pub demotable: usize,
}

impl Plan {
    /// Count the refinements for a threat; `None` if the count exceeds
    /// `limit`.
    pub fn unsafe_refinements(
        &self,
        ctx: &SearchContext,
        unsafe_: &UnsafeFlaw,
        limit: usize,
    ) -> Option<UnsafeRefinements> {
        let link = &unsafe_.link;
        let lt1 = link.effect_time();
        let lt2 = link.condition_time().end_time();
        let et = unsafe_.effect.when().step_time();
        let live = self
            .orderings()
            .possibly_not_after(link.from_id(), lt1, unsafe_.step_id, et)
            && self
                .orderings()
                .possibly_not_before(link.to_id(), lt2, unsafe_.step_id, et);
        let unifier = live
            .then(|| {
                self.bindings().affects(
                    unsafe_.effect.literal(),
                    unsafe_.step_id,
                    link.condition(),
                    link.to_id(),
                )
            })
            .flatten();
        let Some(unifier) = unifier else {
            // Bogus flaw: the single discharge refinement.
            return (1 <= limit).then_some(UnsafeRefinements {
                total: 1,
                ..Default::default()
            });
        };
        let mut dummy = Vec::new();
        let separable = separate(self, ctx, unsafe_, &unifier, true, &mut dummy);
        if separable > limit {
            return None;
        }
        let promotable = promote(self, ctx, unsafe_, true, &mut dummy);
        if separable + promotable > limit {
            return None;
        }
        let demotable = demote(self, ctx, unsafe_, true, &mut dummy);
        let total = separable + promotable + demotable;
        (total <= limit).then_some(UnsafeRefinements {
            total,
            separable,
            promotable,
            demotable,
        })
    }

    /// Check how many ways the given threat can be separated.
    pub fn separable(&self, ctx: &SearchContext, unsafe_: &UnsafeFlaw) -> usize {
        self.unsafe_refinements(ctx, unsafe_, usize::MAX)
            .map(|r| r.separable)
            .unwrap_or(0)
    }

    /// Count the refinements for an open condition; `None` if the count
    /// exceeds `limit`.
    pub fn open_cond_refinements(
        &self,
        ctx: &SearchContext,
        open_cond: &OpenCondition,
        limit: usize,
    ) -> Option<usize> {
        let mut dummy = Vec::new();
        match &open_cond.condition {
            OpenCond::Literal { literal, .. } => {
                let achievers = ctx.literal_achievers(literal);
                let mut count = 0;
                // Add-step refinements.
                for (action, effect) in &achievers {
                    if action.is_dummy() {
                        continue;
                    }
                    let step = Step::new(self.num_steps() as StepId + 1, action.clone());
                    count +=
                        new_link(self, ctx, &step, effect, literal, open_cond, true, &mut dummy);
                    if count > limit {
                        return None;
                    }
                }
                // Reuse-step refinements.
                let gt = match &open_cond.condition {
                    OpenCond::Literal { when, .. } => when.start_time(),
                    _ => unreachable!("literal arm"),
                };
                for step in self.steps().iter() {
                    if !self.orderings().possibly_before(
                        step.id(),
                        StepTime::Start,
                        open_cond.step_id,
                        gt,
                    ) {
                        continue;
                    }
                    for (action, effect) in &achievers {
                        if !Rc::ptr_eq(action, step.action()) {
                            continue;
                        }
                        let et = effect.when().step_time();
                        if self
                            .orderings()
                            .possibly_before(step.id(), et, open_cond.step_id, gt)
                        {
                            count += new_link(
                                self, ctx, step, effect, literal, open_cond, true, &mut dummy,
                            );
                            if count > limit {
                                return None;
                            }
                        }
                    }
                }
                if literal.negated {
                    count += new_cw_link(self, ctx, literal, open_cond, true, &mut dummy);
                }
                (count <= limit).then_some(count)
            }
            OpenCond::Disjunction(disj) => {
                let count = handle_disjunction(self, ctx, disj, open_cond, true, &mut dummy);
                (count <= limit).then_some(count)
            }
            OpenCond::Inequality(neq) => {
                let count = handle_inequality(self, ctx, neq, open_cond, true, &mut dummy);
                (count <= limit).then_some(count)
            }
        }
    }

    /// Number of decompositions applicable to an unexpanded composite
    /// step.
    pub fn unexpanded_step_refinements(
        &self,
        ctx: &SearchContext,
        unexpanded: &UnexpandedStep,
    ) -> usize {
        ctx.decompositions_for(unexpanded.step.action()).len()
    }

    /// Check if a literal open condition is threatened by some step's
    /// effect.
    pub fn unsafe_open_condition(&self, _ctx: &SearchContext, open_cond: &OpenCondition) -> bool {
        let Some((literal, when)) = open_cond.literal() else {
            return false;
        };
        let gt = when.end_time();
        for s in self.steps().iter() {
            if !self
                .orderings()
                .possibly_not_before(open_cond.step_id, gt, s.id(), StepTime::Start)
            {
                continue;
            }
            for effect in s.action().effects() {
                let et = effect.when().step_time();
                if self
                    .orderings()
                    .possibly_not_before(open_cond.step_id, gt, s.id(), et)
                    && self
                        .bindings()
                        .affects(effect.literal(), s.id(), literal, open_cond.step_id)
                        .is_some()
                {
                    return true;
                }
            }
        }
        false
    }
}
