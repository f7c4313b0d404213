use crate::action::{Action, Effect, EffectTime};
use crate::domain::Domain;
use crate::formula::{Atom, Formula, Literal};
use crate::symbol::{NameId, SymbolStore};
use crate::term::TermTable;
use std::rc::Rc;

/// A planning problem: a domain, typed objects, an initial state, an
/// optional list of timed initial literals, and a goal.
///
/// The initial state is carried as the effects of a dummy action with
/// id 0, and each timed initial literal as its own dummy action pinned
/// to its time, so the rest of the planner treats them uniformly as
/// steps.
pub struct Problem {
    name: NameId,
    domain: Rc<Domain>,
    init_action: Rc<Action>,
    timed_actions: Vec<(f32, Rc<Action>)>,
    goal: Rc<Formula>,
}

/// Assembles a problem against a domain.
pub struct ProblemBuilder {
    name: NameId,
    domain: Rc<Domain>,
    init_action: Action,
    timed: Vec<(f32, Literal)>,
    goal: Rc<Formula>,
}

impl Problem {
    pub fn builder(name: NameId, domain: Rc<Domain>, symbols: &SymbolStore) -> ProblemBuilder {
        ProblemBuilder {
            name,
            domain,
            init_action: Action::dummy(symbols.intern("init")),
            timed: Vec::new(),
            goal: Rc::new(Formula::True),
        }
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn domain(&self) -> &Rc<Domain> {
        &self.domain
    }

    pub fn terms(&self) -> &Rc<TermTable> {
        self.domain.terms()
    }

    /// The dummy action whose effects encode the initial state.
    pub fn init_action(&self) -> &Rc<Action> {
        &self.init_action
    }

    /// Timed initial literals as `(time, dummy action)` rows, sorted by
    /// time.
    pub fn timed_actions(&self) -> &[(f32, Rc<Action>)] {
        &self.timed_actions
    }

    pub fn goal(&self) -> &Rc<Formula> {
        &self.goal
    }

    /// Check if a ground atom holds in the initial state.
    pub fn init_holds(&self, atom: &Atom) -> bool {
        self.init_action
            .effects()
            .iter()
            .any(|e| !e.literal().negated && e.literal().atom == *atom)
    }
}

impl ProblemBuilder {
    /// Assert a ground atom in the initial state.
    pub fn init(&mut self, atom: Atom) {
        self.init_action
            .add_effect(Effect::new(Literal::positive(atom), EffectTime::AtEnd));
    }

    /// Assert a literal that becomes true at an absolute time.
    pub fn timed_init(&mut self, time: f32, literal: Literal) {
        self.timed.push((time, literal));
    }

    pub fn goal(&mut self, goal: Rc<Formula>) {
        self.goal = goal;
    }

    pub fn finish(self, symbols: &SymbolStore) -> Rc<Problem> {
        let mut timed_actions: Vec<(f32, Rc<Action>)> = Vec::with_capacity(self.timed.len());
        for (time, literal) in self.timed {
            let mut action = Action::dummy(symbols.intern("timed-init"));
            action.add_effect(Effect::new(literal, EffectTime::AtEnd));
            timed_actions.push((time, Rc::new(action)));
        }
        timed_actions.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Rc::new(Problem {
            name: self.name,
            domain: self.domain,
            init_action: Rc::new(self.init_action),
            timed_actions,
            goal: self.goal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Requirements;
    use crate::term::Term;
    use smallvec::SmallVec;

    fn setup() -> (SymbolStore, Rc<Domain>) {
        let symbols = SymbolStore::new();
        let terms = Rc::new(TermTable::new(symbols.intern("object")));
        let domain = Rc::new(Domain::new(
            symbols.intern("d"),
            Requirements::default(),
            terms,
        ));
        (symbols, domain)
    }

    fn atom(pred: u32, args: &[Term]) -> Atom {
        Atom {
            predicate: crate::formula::PredicateId(pred),
            args: args.iter().copied().collect::<SmallVec<[Term; 4]>>(),
        }
    }

    #[test]
    fn init_literals_become_effects() {
        let (symbols, domain) = setup();
        let mut b = Problem::builder(symbols.intern("p"), domain, &symbols);
        b.init(atom(0, &[]));
        let problem = b.finish(&symbols);
        assert_eq!(problem.init_action().effects().len(), 1);
        assert!(problem.init_holds(&atom(0, &[])));
        assert!(!problem.init_holds(&atom(1, &[])));
    }

    #[test]
    fn timed_literals_sort_by_time() {
        let (symbols, domain) = setup();
        let mut b = Problem::builder(symbols.intern("p"), domain, &symbols);
        b.timed_init(7.0, Literal::positive(atom(0, &[])));
        b.timed_init(3.0, Literal::positive(atom(1, &[])));
        let problem = b.finish(&symbols);
        assert_eq!(problem.timed_actions()[0].0, 3.0);
        assert_eq!(problem.timed_actions()[1].0, 7.0);
    }

    #[test]
    fn default_goal_is_empty() {
        let (symbols, domain) = setup();
        let problem = Problem::builder(symbols.intern("p"), domain, &symbols).finish(&symbols);
        assert!(problem.goal().tautology());
    }
}
