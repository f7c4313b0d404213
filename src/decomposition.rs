use crate::action::Action;
use crate::bindings::Binding;
use crate::orderings::OrderingConstraint;
use crate::step::{Link, Step, StepId};
use crate::symbol::{NameId, SymbolStore};
use crate::term::Term;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// A decomposition schema: a subplan template realizing one composite
/// action. Pseudo-steps carry dense local ids; id 0 is the dummy
/// initial step and the largest id the dummy final step. Internal
/// bindings, orderings, and links reference those local ids.
#[derive(Debug)]
pub struct Decomposition {
    name: NameId,
    composite_action: NameId,
    pseudo_steps: Vec<Step>,
    dummy_initial: StepId,
    dummy_final: StepId,
    bindings: Vec<Binding>,
    orderings: Vec<OrderingConstraint>,
    links: Vec<Link>,
}

impl Decomposition {
    pub fn builder(name: NameId, composite_action: NameId) -> DecompositionBuilder {
        DecompositionBuilder {
            name,
            composite_action,
            steps: Vec::new(),
            final_action: None,
            bindings: Vec::new(),
            orderings: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn name(&self) -> NameId {
        self.name
    }

    pub fn composite_action(&self) -> NameId {
        self.composite_action
    }

    pub fn pseudo_steps(&self) -> &[Step] {
        &self.pseudo_steps
    }
}

/// Assembles a decomposition schema. Add every pseudo-step before
/// referencing the dummy final id in orderings or links.
pub struct DecompositionBuilder {
    name: NameId,
    composite_action: NameId,
    steps: Vec<Rc<Action>>,
    final_action: Option<Action>,
    bindings: Vec<Binding>,
    orderings: Vec<OrderingConstraint>,
    links: Vec<Link>,
}

impl DecompositionBuilder {
    /// Local id of the dummy initial pseudo-step.
    pub fn initial_id(&self) -> StepId {
        0
    }

    /// Local id of the dummy final pseudo-step, valid once all
    /// pseudo-steps have been added.
    pub fn final_id(&self) -> StepId {
        self.steps.len() as StepId + 1
    }

    /// Add a pseudo-step, returning its local id.
    pub fn pseudo_step(&mut self, action: Rc<Action>) -> StepId {
        self.steps.push(action);
        self.steps.len() as StepId
    }

    /// Replace the dummy final step's action (e.g. to give it a
    /// precondition the decomposition as a whole must establish).
    pub fn final_action(&mut self, action: Action) {
        self.final_action = Some(action);
    }

    pub fn binding(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub fn ordering(&mut self, ordering: OrderingConstraint) {
        self.orderings.push(ordering);
    }

    pub fn link(&mut self, link: Link) {
        self.links.push(link);
    }

    pub fn finish(self, symbols: &SymbolStore) -> Decomposition {
        let initial = Rc::new(Action::dummy(symbols.intern("begin")));
        let final_action = Rc::new(
            self.final_action
                .unwrap_or_else(|| Action::dummy(symbols.intern("end"))),
        );
        let mut pseudo_steps = Vec::with_capacity(self.steps.len() + 2);
        pseudo_steps.push(Step::new(0, initial));
        for (i, action) in self.steps.iter().enumerate() {
            pseudo_steps.push(Step::new(i as StepId + 1, action.clone()));
        }
        let dummy_final = self.steps.len() as StepId + 1;
        pseudo_steps.push(Step::new(dummy_final, final_action));
        Decomposition {
            name: self.name,
            composite_action: self.composite_action,
            pseudo_steps,
            dummy_initial: 0,
            dummy_final,
            bindings: self.bindings,
            orderings: self.orderings,
            links: self.links,
        }
    }
}

/// An instantiated decomposition: the schema's pseudo-steps and
/// internal constraints, rewritten to fresh plan-level step ids when
/// the frame is installed.
#[derive(Debug, Clone)]
pub struct DecompositionFrame {
    decomposition: Rc<Decomposition>,
    steps: Vec<Step>,
    dummy_initial: StepId,
    dummy_final: StepId,
    bindings: Vec<Binding>,
    orderings: Vec<OrderingConstraint>,
    links: Vec<Link>,
}

impl DecompositionFrame {
    /// Clone the schema's contents with its local ids intact.
    pub fn instantiate(decomposition: &Rc<Decomposition>) -> Self {
        Self {
            decomposition: decomposition.clone(),
            steps: decomposition.pseudo_steps.to_vec(),
            dummy_initial: decomposition.dummy_initial,
            dummy_final: decomposition.dummy_final,
            bindings: decomposition.bindings.clone(),
            orderings: decomposition.orderings.clone(),
            links: decomposition.links.clone(),
        }
    }

    /// Rewrite every local pseudo-step id to a fresh plan-level id.
    /// The i-th pseudo-step becomes `base + i`.
    pub fn assign_ids(&mut self, base: StepId) {
        let mut map: FxHashMap<StepId, StepId> = FxHashMap::default();
        for (i, step) in self.steps.iter().enumerate() {
            map.insert(step.id(), base + i as StepId);
        }
        let remap = |id: StepId| map.get(&id).copied().unwrap_or(id);
        self.steps = self
            .steps
            .iter()
            .map(|s| s.with_id(remap(s.id())))
            .collect();
        self.dummy_initial = remap(self.dummy_initial);
        self.dummy_final = remap(self.dummy_final);
        for binding in &mut self.bindings {
            binding.var_step = remap(binding.var_step);
            if matches!(binding.term, Term::Variable(_)) {
                binding.term_step = remap(binding.term_step);
            }
        }
        self.orderings = self
            .orderings
            .iter()
            .map(|o| o.with_ids(remap(o.before_id), remap(o.after_id)))
            .collect();
        self.links = self
            .links
            .iter()
            .map(|l| l.with_ids(remap(l.from_id()), remap(l.to_id())))
            .collect();
    }

    pub fn decomposition(&self) -> &Rc<Decomposition> {
        &self.decomposition
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn dummy_initial_id(&self) -> StepId {
        self.dummy_initial
    }

    pub fn dummy_final_id(&self) -> StepId {
        self.dummy_final
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn orderings(&self) -> &[OrderingConstraint] {
        &self.orderings
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Internal links flowing into the given step.
    pub fn incoming_links(&self, step_id: StepId) -> impl Iterator<Item = &Link> {
        self.links.iter().filter(move |l| l.to_id() == step_id)
    }
}

impl PartialEq for DecompositionFrame {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.decomposition, &other.decomposition)
            && self.dummy_initial == other.dummy_initial
            && self.dummy_final == other.dummy_final
    }
}

/// Records that a composite step was expanded via the given frame.
#[derive(Debug, Clone)]
pub struct DecompositionLink {
    composite_id: StepId,
    frame: DecompositionFrame,
}

impl DecompositionLink {
    pub fn new(composite_id: StepId, frame: DecompositionFrame) -> Self {
        Self {
            composite_id,
            frame,
        }
    }

    pub fn composite_id(&self) -> StepId {
        self.composite_id
    }

    pub fn frame(&self) -> &DecompositionFrame {
        &self.frame
    }
}

impl PartialEq for DecompositionLink {
    fn eq(&self, other: &Self) -> bool {
        self.composite_id == other.composite_id && self.frame == other.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Atom, FormulaTime, Literal, PredicateId};
    use crate::step::StepTime;
    use smallvec::SmallVec;

    fn schema(symbols: &SymbolStore, name: &str) -> Rc<Action> {
        Rc::new(Action::schema(symbols.intern(name)))
    }

    fn build_two_step() -> (SymbolStore, Decomposition) {
        let symbols = SymbolStore::new();
        let mut b = Decomposition::builder(symbols.intern("drive"), symbols.intern("travel"));
        let s1 = b.pseudo_step(schema(&symbols, "get-in"));
        let s2 = b.pseudo_step(schema(&symbols, "get-out"));
        b.ordering(OrderingConstraint::new(
            s1,
            StepTime::End,
            s2,
            StepTime::Start,
        ));
        b.link(Link::new(
            s1,
            StepTime::End,
            s2,
            Literal::positive(Atom {
                predicate: PredicateId(0),
                args: SmallVec::new(),
            }),
            FormulaTime::AtStart,
        ));
        let d = b.finish(&symbols);
        (symbols, d)
    }

    #[test]
    fn builder_brackets_steps_with_dummies() {
        let (_, d) = build_two_step();
        assert_eq!(d.pseudo_steps().len(), 4);
        assert_eq!(d.pseudo_steps()[0].id(), 0);
        assert_eq!(d.pseudo_steps()[3].id(), 3);
        assert!(d.pseudo_steps()[0].action().is_dummy());
        assert!(d.pseudo_steps()[3].action().is_dummy());
    }

    #[test]
    fn assign_ids_rewrites_references() {
        let (_, d) = build_two_step();
        let d = Rc::new(d);
        let mut frame = DecompositionFrame::instantiate(&d);
        frame.assign_ids(10);
        assert_eq!(frame.dummy_initial_id(), 10);
        assert_eq!(frame.dummy_final_id(), 13);
        let ids: Vec<StepId> = frame.steps().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![10, 11, 12, 13]);
        assert_eq!(frame.orderings()[0].before_id, 11);
        assert_eq!(frame.orderings()[0].after_id, 12);
        assert_eq!(frame.links()[0].from_id(), 11);
        assert_eq!(frame.links()[0].to_id(), 12);
    }

    #[test]
    fn instantiation_leaves_schema_untouched() {
        let (_, d) = build_two_step();
        let d = Rc::new(d);
        let mut frame = DecompositionFrame::instantiate(&d);
        frame.assign_ids(5);
        assert_eq!(d.pseudo_steps()[1].id(), 1);
    }

    #[test]
    fn incoming_links_filters_by_target() {
        let (_, d) = build_two_step();
        let d = Rc::new(d);
        let frame = DecompositionFrame::instantiate(&d);
        assert_eq!(frame.incoming_links(2).count(), 1);
        assert_eq!(frame.incoming_links(1).count(), 0);
    }
}
