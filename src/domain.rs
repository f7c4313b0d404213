use crate::action::Action;
use crate::decomposition::Decomposition;
use crate::error::PlanError;
use crate::formula::PredicateId;
use crate::symbol::{NameId, SymbolStore};
use crate::term::TermTable;
use rustc_hash::{FxHashMap, FxHashSet};
use std::rc::Rc;

/// Requirement flags that change planner behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct Requirements {
    /// Actions have durations; conditions and effects carry time tags,
    /// orderings are temporal, and mutex threats are tracked.
    pub durative_actions: bool,
    /// The domain declares composite actions and decompositions.
    pub decompositions: bool,
}

#[derive(Debug)]
struct PredicateEntry {
    name: NameId,
    arity: usize,
}

/// Declared predicates with arities.
#[derive(Debug, Default)]
pub struct PredicateTable {
    entries: Vec<PredicateEntry>,
    by_name: FxHashMap<NameId, PredicateId>,
}

impl PredicateTable {
    pub fn declare(&mut self, name: NameId, arity: usize) -> PredicateId {
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = PredicateId(self.entries.len() as u32);
        self.entries.push(PredicateEntry { name, arity });
        self.by_name.insert(name, id);
        id
    }

    pub fn find(&self, name: NameId) -> Option<PredicateId> {
        self.by_name.get(&name).copied()
    }

    pub fn arity(&self, predicate: PredicateId) -> usize {
        self.entries[predicate.raw() as usize].arity
    }

    pub fn name(&self, predicate: PredicateId) -> NameId {
        self.entries[predicate.raw() as usize].name
    }
}

/// A planning domain: predicates, action schemas, decomposition
/// schemas, and the term table they are typed against.
pub struct Domain {
    name: NameId,
    requirements: Requirements,
    predicates: PredicateTable,
    actions: Vec<Rc<Action>>,
    actions_by_name: FxHashMap<NameId, usize>,
    decompositions: Vec<Rc<Decomposition>>,
    /// Predicates some action effect can change; the rest are static.
    dynamic_predicates: FxHashSet<PredicateId>,
    terms: Rc<TermTable>,
}

impl Domain {
    pub fn new(name: NameId, requirements: Requirements, terms: Rc<TermTable>) -> Self {
        Self {
            name,
            requirements,
            predicates: PredicateTable::default(),
            actions: Vec::new(),
            actions_by_name: FxHashMap::default(),
            decompositions: Vec::new(),
            dynamic_predicates: FxHashSet::default(),
            terms,
        }
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    pub fn terms(&self) -> &Rc<TermTable> {
        &self.terms
    }

    pub fn predicates(&self) -> &PredicateTable {
        &self.predicates
    }

    pub fn declare_predicate(&mut self, name: NameId, arity: usize) -> PredicateId {
        self.predicates.declare(name, arity)
    }

    /// Add an action schema. Every effect's predicate becomes dynamic.
    pub fn add_action(
        &mut self,
        action: Action,
        symbols: &SymbolStore,
    ) -> Result<Rc<Action>, PlanError> {
        if self.actions_by_name.contains_key(&action.name()) {
            let name = symbols.resolve(action.name()).unwrap_or("?").to_owned();
            return Err(PlanError::DuplicateAction(name));
        }
        for effect in action.effects() {
            self.dynamic_predicates.insert(effect.literal().predicate());
        }
        let action = Rc::new(action);
        self.actions_by_name
            .insert(action.name(), self.actions.len());
        self.actions.push(action.clone());
        Ok(action)
    }

    pub fn actions(&self) -> &[Rc<Action>] {
        &self.actions
    }

    pub fn find_action(&self, name: NameId) -> Option<&Rc<Action>> {
        self.actions_by_name.get(&name).map(|&i| &self.actions[i])
    }

    /// Add a decomposition schema; its target must be a declared
    /// composite action.
    pub fn add_decomposition(
        &mut self,
        decomposition: Decomposition,
        symbols: &SymbolStore,
    ) -> Result<Rc<Decomposition>, PlanError> {
        let resolve = |id: NameId| symbols.resolve(id).unwrap_or("?").to_owned();
        let target = match self.find_action(decomposition.composite_action()) {
            Some(action) => action,
            None => {
                return Err(PlanError::UnknownCompositeAction(
                    resolve(decomposition.name()),
                    resolve(decomposition.composite_action()),
                ))
            }
        };
        if !target.composite() {
            return Err(PlanError::NotComposite(
                resolve(decomposition.name()),
                resolve(target.name()),
            ));
        }
        let decomposition = Rc::new(decomposition);
        self.decompositions.push(decomposition.clone());
        Ok(decomposition)
    }

    pub fn decompositions(&self) -> &[Rc<Decomposition>] {
        &self.decompositions
    }

    /// A predicate no action effect mentions is static: its truth is
    /// fixed by the initial state.
    pub fn static_predicate(&self, predicate: PredicateId) -> bool {
        !self.dynamic_predicates.contains(&predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Effect, EffectTime};
    use crate::formula::{Atom, Literal};
    use smallvec::SmallVec;

    fn setup() -> (SymbolStore, Rc<TermTable>) {
        let symbols = SymbolStore::new();
        let terms = Rc::new(TermTable::new(symbols.intern("object")));
        (symbols, terms)
    }

    #[test]
    fn declare_predicate_is_idempotent() {
        let (symbols, terms) = setup();
        let mut domain = Domain::new(symbols.intern("d"), Requirements::default(), terms);
        let at = symbols.intern("at");
        let p1 = domain.declare_predicate(at, 2);
        let p2 = domain.declare_predicate(at, 2);
        assert_eq!(p1, p2);
        assert_eq!(domain.predicates().arity(p1), 2);
    }

    #[test]
    fn duplicate_action_is_rejected() {
        let (symbols, terms) = setup();
        let mut domain = Domain::new(symbols.intern("d"), Requirements::default(), terms);
        let name = symbols.intern("move");
        domain.add_action(Action::schema(name), &symbols).unwrap();
        assert!(matches!(
            domain.add_action(Action::schema(name), &symbols),
            Err(PlanError::DuplicateAction(_))
        ));
    }

    #[test]
    fn predicates_without_achievers_are_static() {
        let (symbols, terms) = setup();
        let mut domain = Domain::new(symbols.intern("d"), Requirements::default(), terms);
        let road = domain.declare_predicate(symbols.intern("road"), 2);
        let at = domain.declare_predicate(symbols.intern("at"), 1);
        let mut action = Action::schema(symbols.intern("move"));
        action.add_effect(Effect::new(
            Literal::positive(Atom {
                predicate: at,
                args: SmallVec::new(),
            }),
            EffectTime::AtEnd,
        ));
        domain.add_action(action, &symbols).unwrap();
        assert!(domain.static_predicate(road));
        assert!(!domain.static_predicate(at));
    }

    #[test]
    fn decomposition_requires_composite_target() {
        let (symbols, terms) = setup();
        let mut domain = Domain::new(
            symbols.intern("d"),
            Requirements {
                decompositions: true,
                ..Default::default()
            },
            terms,
        );
        let travel = symbols.intern("travel");
        let mut action = Action::schema(travel);
        action.set_composite(false);
        domain.add_action(action, &symbols).unwrap();
        let decomposition =
            Decomposition::builder(symbols.intern("drive"), travel).finish(&symbols);
        assert!(matches!(
            domain.add_decomposition(decomposition, &symbols),
            Err(PlanError::NotComposite(_, _))
        ));
    }
}
