use crate::formula::{Formula, Literal};
use crate::step::StepTime;
use crate::symbol::NameId;
use crate::term::VariableId;
use smallvec::SmallVec;
use std::rc::Rc;

/// When an effect takes hold relative to its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectTime {
    AtStart,
    AtEnd,
}

impl EffectTime {
    /// The step time point at which the effect becomes true.
    pub fn step_time(self) -> StepTime {
        match self {
            EffectTime::AtStart => StepTime::Start,
            EffectTime::AtEnd => StepTime::End,
        }
    }
}

/// One effect of an action: a literal made true at `when`, guarded by
/// `condition`, with `parameters` universally quantified over the
/// effect. `link_condition` is an extra condition attached to any
/// causal link drawn from this effect.
#[derive(Debug)]
pub struct Effect {
    parameters: SmallVec<[VariableId; 2]>,
    condition: Rc<Formula>,
    link_condition: Rc<Formula>,
    literal: Literal,
    when: EffectTime,
}

impl Effect {
    pub fn new(literal: Literal, when: EffectTime) -> Self {
        Self {
            parameters: SmallVec::new(),
            condition: Rc::new(Formula::True),
            link_condition: Rc::new(Formula::True),
            literal,
            when,
        }
    }

    pub fn with_condition(mut self, condition: Rc<Formula>) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_link_condition(mut self, link_condition: Rc<Formula>) -> Self {
        self.link_condition = link_condition;
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = VariableId>) -> Self {
        self.parameters = parameters.into_iter().collect();
        self
    }

    pub fn parameters(&self) -> &[VariableId] {
        &self.parameters
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Check if the effect universally quantifies the given variable.
    pub fn quantifies(&self, variable: VariableId) -> bool {
        self.parameters.contains(&variable)
    }

    pub fn condition(&self) -> &Rc<Formula> {
        &self.condition
    }

    pub fn link_condition(&self) -> &Rc<Formula> {
        &self.link_condition
    }

    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    pub fn when(&self) -> EffectTime {
        self.when
    }
}

/// An action schema or a ground action.
///
/// Schemas carry parameters that the bindings structure instantiates
/// lazily during search; ground actions have none. Composite actions
/// cannot execute directly and must be expanded via a decomposition.
#[derive(Debug)]
pub struct Action {
    name: NameId,
    parameters: SmallVec<[VariableId; 4]>,
    condition: Rc<Formula>,
    effects: Vec<Rc<Effect>>,
    schema: bool,
    composite: bool,
    durative: bool,
    dummy: bool,
}

impl Action {
    /// Create an action schema with no parameters, condition, or
    /// effects yet.
    pub fn schema(name: NameId) -> Self {
        Self {
            name,
            parameters: SmallVec::new(),
            condition: Rc::new(Formula::True),
            effects: Vec::new(),
            schema: true,
            composite: false,
            durative: false,
            dummy: false,
        }
    }

    /// Create a ground action.
    pub fn ground(name: NameId) -> Self {
        Self {
            schema: false,
            ..Self::schema(name)
        }
    }

    /// Create a dummy action (initial state, goal, timed literal
    /// carrier). Dummy actions never appear as add-step candidates.
    pub fn dummy(name: NameId) -> Self {
        Self {
            dummy: true,
            ..Self::ground(name)
        }
    }

    pub fn add_parameter(&mut self, parameter: VariableId) {
        self.parameters.push(parameter);
    }

    pub fn set_condition(&mut self, condition: Rc<Formula>) {
        self.condition = condition;
    }

    pub fn add_effect(&mut self, effect: Effect) {
        self.effects.push(Rc::new(effect));
    }

    pub fn set_composite(&mut self, composite: bool) {
        self.composite = composite;
    }

    pub fn set_durative(&mut self, durative: bool) {
        self.durative = durative;
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    /// Schema parameters; empty for ground actions.
    pub fn parameters(&self) -> &[VariableId] {
        &self.parameters
    }

    pub fn is_schema(&self) -> bool {
        self.schema
    }

    pub fn condition(&self) -> &Rc<Formula> {
        &self.condition
    }

    pub fn effects(&self) -> &[Rc<Effect>] {
        &self.effects
    }

    pub fn composite(&self) -> bool {
        self.composite
    }

    pub fn durative(&self) -> bool {
        self.durative
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Atom, PredicateId};
    use crate::symbol::SymbolStore;
    use crate::term::Term;

    fn lit(pred: u32) -> Literal {
        Literal::positive(Atom {
            predicate: PredicateId(pred),
            args: SmallVec::<[Term; 4]>::new(),
        })
    }

    #[test]
    fn effect_defaults_are_unconditional() {
        let e = Effect::new(lit(0), EffectTime::AtEnd);
        assert!(e.condition().tautology());
        assert!(e.link_condition().tautology());
        assert_eq!(e.arity(), 0);
    }

    #[test]
    fn effect_quantifies_its_parameters() {
        let symbols = SymbolStore::new();
        let terms = crate::term::TermTable::new(symbols.intern("object"));
        let v = terms.add_variable(terms.root_type());
        let w = terms.add_variable(terms.root_type());
        let e = Effect::new(lit(0), EffectTime::AtEnd).with_parameters([v]);
        assert!(e.quantifies(v));
        assert!(!e.quantifies(w));
    }

    #[test]
    fn dummy_actions_are_ground() {
        let symbols = SymbolStore::new();
        let a = Action::dummy(symbols.intern("init"));
        assert!(a.is_dummy());
        assert!(!a.is_schema());
    }

    #[test]
    fn effect_times_map_to_step_times() {
        assert_eq!(EffectTime::AtStart.step_time(), StepTime::Start);
        assert_eq!(EffectTime::AtEnd.step_time(), StepTime::End);
    }
}
