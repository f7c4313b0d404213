use crate::action::Action;
use crate::formula::Literal;
use crate::step::StepId;
use crate::term::{ObjectId, Term, TermTable, VariableId};
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// A single (in)equality constraint between a step-scoped variable and
/// a term. `term_step` is only meaningful when `term` is a variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub var: VariableId,
    pub var_step: StepId,
    pub term: Term,
    pub term_step: StepId,
    pub equal: bool,
}

impl Binding {
    pub fn equal(var: VariableId, var_step: StepId, term: Term, term_step: StepId) -> Self {
        Self {
            var,
            var_step,
            term,
            term_step,
            equal: true,
        }
    }

    pub fn unequal(var: VariableId, var_step: StepId, term: Term, term_step: StepId) -> Self {
        Self {
            var,
            var_step,
            term,
            term_step,
            equal: false,
        }
    }
}

/// A variable scoped to the step that introduced it. The same schema
/// variable appearing in two steps is two distinct planning variables.
pub type StepVar = (VariableId, StepId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NeqEntry {
    Var(StepVar),
    Object(ObjectId),
}

/// Binding constraints of a plan: equivalence classes of step-scoped
/// variables, each with an optional object value, a type, and
/// inequality edges.
///
/// Values are immutable; `add` folds a batch of constraints into a
/// clone and returns it, or `None` if the batch is inconsistent. Plans
/// share bindings via `Rc`.
#[derive(Debug, Clone)]
pub struct Bindings {
    terms: Rc<TermTable>,
    parent: FxHashMap<StepVar, StepVar>,
    values: FxHashMap<StepVar, ObjectId>,
    types: FxHashMap<StepVar, crate::term::TypeId>,
    neqs: FxHashMap<StepVar, Vec<NeqEntry>>,
}

impl Bindings {
    pub fn new(terms: Rc<TermTable>) -> Self {
        Self {
            terms,
            parent: FxHashMap::default(),
            values: FxHashMap::default(),
            types: FxHashMap::default(),
            neqs: FxHashMap::default(),
        }
    }

    pub fn terms(&self) -> &Rc<TermTable> {
        &self.terms
    }

    fn root(&self, mut sv: StepVar) -> StepVar {
        while let Some(&p) = self.parent.get(&sv) {
            sv = p;
        }
        sv
    }

    fn class_type(&self, root: StepVar) -> crate::term::TypeId {
        self.types
            .get(&root)
            .copied()
            .unwrap_or_else(|| self.terms.variable_type(root.0))
    }

    /// The representative of a term: the bound object if the class has
    /// a value, otherwise the class root variable. Objects represent
    /// themselves.
    pub fn binding(&self, term: Term, step_id: StepId) -> Term {
        match term {
            Term::Object(_) => term,
            Term::Variable(v) => {
                let root = self.root((v, step_id));
                match self.values.get(&root) {
                    Some(&o) => Term::Object(o),
                    None => Term::Variable(root.0),
                }
            }
        }
    }

    /// The object a variable is bound to, if any.
    pub fn value(&self, var: VariableId, step_id: StepId) -> Option<ObjectId> {
        self.values.get(&self.root((var, step_id))).copied()
    }

    /// Candidate objects for a variable: its type's objects, minus
    /// those ruled out by inequality edges. A bound variable's domain
    /// is the singleton of its value.
    pub fn domain(&self, var: VariableId, step_id: StepId) -> Vec<ObjectId> {
        let root = self.root((var, step_id));
        if let Some(&o) = self.values.get(&root) {
            return vec![o];
        }
        let excluded: Vec<ObjectId> = self
            .neqs
            .get(&root)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| match e {
                        NeqEntry::Object(o) => Some(*o),
                        NeqEntry::Var(sv) => self.values.get(&self.root(*sv)).copied(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.terms
            .compatible_objects(self.class_type(root))
            .into_iter()
            .filter(|o| !excluded.contains(o))
            .collect()
    }

    fn neq_violated(&self, root_a: StepVar, entry: NeqEntry) -> bool {
        match entry {
            NeqEntry::Var(sv) => self.root(sv) == root_a,
            NeqEntry::Object(o) => self.values.get(&root_a) == Some(&o),
        }
    }

    fn roots_unequal(&self, a: StepVar, b: StepVar) -> bool {
        if let Some(entries) = self.neqs.get(&a) {
            if entries.iter().any(|&e| self.neq_violated(b, e)) {
                return true;
            }
        }
        if let Some(entries) = self.neqs.get(&b) {
            if entries.iter().any(|&e| self.neq_violated(a, e)) {
                return true;
            }
        }
        false
    }

    fn bind_object(&mut self, root: StepVar, object: ObjectId) -> bool {
        if let Some(&existing) = self.values.get(&root) {
            return existing == object;
        }
        if !self
            .terms
            .subtype(self.terms.object_type(object), self.class_type(root))
        {
            return false;
        }
        if let Some(entries) = self.neqs.get(&root) {
            for &e in entries {
                let clash = match e {
                    NeqEntry::Object(o) => o == object,
                    NeqEntry::Var(sv) => {
                        let r = self.root(sv);
                        self.values.get(&r) == Some(&object)
                    }
                };
                if clash {
                    return false;
                }
            }
        }
        self.values.insert(root, object);
        true
    }

    fn union(&mut self, a: StepVar, b: StepVar) -> bool {
        let ra = self.root(a);
        let rb = self.root(b);
        if ra == rb {
            return true;
        }
        if self.roots_unequal(ra, rb) {
            return false;
        }
        // The merged class takes the more specific of the two types.
        let (ta, tb) = (self.class_type(ra), self.class_type(rb));
        let merged_ty = if self.terms.subtype(ta, tb) {
            ta
        } else if self.terms.subtype(tb, ta) {
            tb
        } else {
            return false;
        };
        match (self.values.get(&ra).copied(), self.values.get(&rb).copied()) {
            (Some(va), Some(vb)) if va != vb => return false,
            (Some(va), None) => {
                if !self.bind_object(rb, va) {
                    return false;
                }
            }
            (None, Some(vb)) => {
                if !self.bind_object(ra, vb) {
                    return false;
                }
            }
            _ => {}
        }
        self.parent.insert(ra, rb);
        self.types.insert(rb, merged_ty);
        if let Some(v) = self.values.remove(&ra) {
            self.values.insert(rb, v);
        }
        if let Some(mut entries) = self.neqs.remove(&ra) {
            self.neqs.entry(rb).or_default().append(&mut entries);
        }
        true
    }

    fn add_one(&mut self, binding: &Binding) -> bool {
        let sv = (binding.var, binding.var_step);
        if binding.equal {
            match binding.term {
                Term::Object(o) => {
                    let root = self.root(sv);
                    self.bind_object(root, o)
                }
                Term::Variable(w) => self.union(sv, (w, binding.term_step)),
            }
        } else {
            match binding.term {
                Term::Object(o) => {
                    let root = self.root(sv);
                    if self.values.get(&root) == Some(&o) {
                        return false;
                    }
                    self.neqs.entry(root).or_default().push(NeqEntry::Object(o));
                    true
                }
                Term::Variable(w) => {
                    let ra = self.root(sv);
                    let rb = self.root((w, binding.term_step));
                    if ra == rb {
                        return false;
                    }
                    if let (Some(va), Some(vb)) =
                        (self.values.get(&ra).copied(), self.values.get(&rb).copied())
                    {
                        if va == vb {
                            return false;
                        }
                    }
                    self.neqs.entry(ra).or_default().push(NeqEntry::Var(rb));
                    self.neqs.entry(rb).or_default().push(NeqEntry::Var(ra));
                    true
                }
            }
        }
    }

    /// Fold a batch of constraints into a new bindings value. Returns
    /// `None` if any constraint is inconsistent with the rest.
    pub fn add(&self, bindings: &[Binding]) -> Option<Bindings> {
        if bindings.is_empty() {
            return Some(self.clone());
        }
        let mut out = self.clone();
        for b in bindings {
            if !out.add_one(b) {
                return None;
            }
        }
        Some(out)
    }

    /// Check that every schema parameter of a newly introduced step has
    /// a non-empty object domain.
    pub fn add_step_domains(&self, step_id: StepId, action: &Action) -> Option<Bindings> {
        for &param in action.parameters() {
            if self.domain(param, step_id).is_empty() {
                return None;
            }
        }
        Some(self.clone())
    }

    /// Check that asserting the inequality would not contradict the
    /// current classes.
    pub fn consistent_with_inequality(
        &self,
        var: VariableId,
        var_step: StepId,
        term: Term,
        term_step: StepId,
    ) -> bool {
        let ra = self.root((var, var_step));
        match term {
            Term::Object(o) => self.values.get(&ra) != Some(&o),
            Term::Variable(w) => {
                let rb = self.root((w, term_step));
                if ra == rb {
                    return false;
                }
                match (self.values.get(&ra), self.values.get(&rb)) {
                    (Some(va), Some(vb)) => va != vb,
                    _ => true,
                }
            }
        }
    }

    fn unify_terms(
        scratch: &mut Bindings,
        unifier: &mut Vec<Binding>,
        t1: Term,
        id1: StepId,
        t2: Term,
        id2: StepId,
    ) -> bool {
        let d1 = scratch.binding(t1, id1);
        let d2 = scratch.binding(t2, id2);
        // Both sides dereference to objects: no binding to record.
        if let (Term::Object(a), Term::Object(b)) = (d1, d2) {
            return a == b;
        }
        // At least one side is an unbound variable class; record the
        // constraint against the original, step-scoped terms.
        let binding = match (t1, t2) {
            (Term::Variable(v), _) if d1.is_variable() => Binding::equal(v, id1, t2, id2),
            (_, Term::Variable(w)) => Binding::equal(w, id2, t1, id1),
            // Objects never dereference to variables.
            _ => return false,
        };
        if !scratch.add_one(&binding) {
            return false;
        }
        unifier.push(binding);
        true
    }

    /// Unify two literals of the same polarity, returning the most
    /// general unifier as a binding list. Returns `None` if predicates,
    /// polarities, or arguments clash.
    pub fn unify(
        &self,
        l1: &Literal,
        id1: StepId,
        l2: &Literal,
        id2: StepId,
    ) -> Option<Vec<Binding>> {
        if l1.negated != l2.negated {
            return None;
        }
        self.unify_atoms(l1, id1, l2, id2)
    }

    /// Unify the underlying atoms regardless of polarity.
    pub fn unify_atoms(
        &self,
        l1: &Literal,
        id1: StepId,
        l2: &Literal,
        id2: StepId,
    ) -> Option<Vec<Binding>> {
        if l1.predicate() != l2.predicate() || l1.atom.args.len() != l2.atom.args.len() {
            return None;
        }
        let mut scratch = self.clone();
        let mut unifier = Vec::new();
        for (&t1, &t2) in l1.atom.args.iter().zip(l2.atom.args.iter()) {
            if !Self::unify_terms(&mut scratch, &mut unifier, t1, id1, t2, id2) {
                return None;
            }
        }
        Some(unifier)
    }

    /// Check whether an effect literal can change the truth of a
    /// condition literal: opposite polarity and unifiable atoms.
    /// Returns the unifier if so.
    pub fn affects(
        &self,
        effect_literal: &Literal,
        effect_step: StepId,
        condition: &Literal,
        condition_step: StepId,
    ) -> Option<Vec<Binding>> {
        if effect_literal.negated == condition.negated {
            return None;
        }
        self.unify_atoms(effect_literal, effect_step, condition, condition_step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Atom, PredicateId};
    use crate::symbol::SymbolStore;

    struct Fixture {
        terms: Rc<TermTable>,
        objects: Vec<ObjectId>,
        vars: Vec<VariableId>,
    }

    fn setup(num_objects: usize, num_vars: usize) -> Fixture {
        let symbols = SymbolStore::new();
        let terms = Rc::new(TermTable::new(symbols.intern("object")));
        let objects = (0..num_objects)
            .map(|i| terms.add_object(symbols.intern(&format!("o{i}")), terms.root_type()))
            .collect();
        let vars = (0..num_vars)
            .map(|_| terms.add_variable(terms.root_type()))
            .collect();
        Fixture {
            terms,
            objects,
            vars,
        }
    }

    fn lit(pred: u32, args: &[Term], negated: bool) -> Literal {
        Literal {
            atom: Atom {
                predicate: PredicateId(pred),
                args: args.iter().copied().collect(),
            },
            negated,
        }
    }

    // ========== ADD ==========

    #[test]
    fn bind_variable_to_object() {
        let f = setup(2, 1);
        let b = Bindings::new(f.terms.clone());
        let out = b
            .add(&[Binding::equal(
                f.vars[0],
                1,
                Term::Object(f.objects[0]),
                0,
            )])
            .unwrap();
        assert_eq!(out.value(f.vars[0], 1), Some(f.objects[0]));
        // The original is untouched.
        assert_eq!(b.value(f.vars[0], 1), None);
    }

    #[test]
    fn conflicting_values_fail() {
        let f = setup(2, 1);
        let b = Bindings::new(f.terms.clone());
        let out = b.add(&[
            Binding::equal(f.vars[0], 1, Term::Object(f.objects[0]), 0),
            Binding::equal(f.vars[0], 1, Term::Object(f.objects[1]), 0),
        ]);
        assert!(out.is_none());
    }

    #[test]
    fn union_propagates_value() {
        let f = setup(2, 2);
        let b = Bindings::new(f.terms.clone());
        let out = b
            .add(&[
                Binding::equal(f.vars[0], 1, Term::Variable(f.vars[1]), 2),
                Binding::equal(f.vars[1], 2, Term::Object(f.objects[1]), 0),
            ])
            .unwrap();
        assert_eq!(out.value(f.vars[0], 1), Some(f.objects[1]));
    }

    #[test]
    fn same_variable_different_steps_is_distinct() {
        let f = setup(2, 1);
        let b = Bindings::new(f.terms.clone());
        let out = b
            .add(&[Binding::equal(
                f.vars[0],
                1,
                Term::Object(f.objects[0]),
                0,
            )])
            .unwrap();
        assert_eq!(out.value(f.vars[0], 2), None);
    }

    #[test]
    fn inequality_then_equality_fails() {
        let f = setup(2, 1);
        let b = Bindings::new(f.terms.clone());
        let out = b.add(&[
            Binding::unequal(f.vars[0], 1, Term::Object(f.objects[0]), 0),
            Binding::equal(f.vars[0], 1, Term::Object(f.objects[0]), 0),
        ]);
        assert!(out.is_none());
    }

    #[test]
    fn unequal_variables_cannot_merge() {
        let f = setup(2, 2);
        let b = Bindings::new(f.terms.clone());
        let out = b.add(&[
            Binding::unequal(f.vars[0], 1, Term::Variable(f.vars[1]), 1),
            Binding::equal(f.vars[0], 1, Term::Variable(f.vars[1]), 1),
        ]);
        assert!(out.is_none());
    }

    // ========== DOMAIN ==========

    #[test]
    fn domain_excludes_unequal_objects() {
        let f = setup(3, 1);
        let b = Bindings::new(f.terms.clone())
            .add(&[Binding::unequal(
                f.vars[0],
                1,
                Term::Object(f.objects[0]),
                0,
            )])
            .unwrap();
        let d = b.domain(f.vars[0], 1);
        assert_eq!(d, vec![f.objects[1], f.objects[2]]);
    }

    #[test]
    fn domain_of_bound_variable_is_singleton() {
        let f = setup(3, 1);
        let b = Bindings::new(f.terms.clone())
            .add(&[Binding::equal(
                f.vars[0],
                1,
                Term::Object(f.objects[2]),
                0,
            )])
            .unwrap();
        assert_eq!(b.domain(f.vars[0], 1), vec![f.objects[2]]);
    }

    // ========== UNIFY / AFFECTS ==========

    #[test]
    fn unify_binds_variable_to_object() {
        let f = setup(2, 1);
        let b = Bindings::new(f.terms.clone());
        let l1 = lit(0, &[Term::Variable(f.vars[0])], false);
        let l2 = lit(0, &[Term::Object(f.objects[0])], false);
        let mgu = b.unify(&l1, 1, &l2, 2).unwrap();
        assert_eq!(mgu.len(), 1);
        assert_eq!(mgu[0].var, f.vars[0]);
        assert_eq!(mgu[0].term, Term::Object(f.objects[0]));
    }

    #[test]
    fn unify_ground_identical_atoms_is_empty() {
        let f = setup(2, 0);
        let b = Bindings::new(f.terms.clone());
        let l = lit(0, &[Term::Object(f.objects[0])], false);
        let mgu = b.unify(&l, 1, &l, 2).unwrap();
        assert!(mgu.is_empty());
    }

    #[test]
    fn unify_distinct_objects_fails() {
        let f = setup(2, 0);
        let b = Bindings::new(f.terms.clone());
        let l1 = lit(0, &[Term::Object(f.objects[0])], false);
        let l2 = lit(0, &[Term::Object(f.objects[1])], false);
        assert!(b.unify(&l1, 1, &l2, 2).is_none());
    }

    #[test]
    fn unify_respects_existing_inequality() {
        let f = setup(2, 1);
        let b = Bindings::new(f.terms.clone())
            .add(&[Binding::unequal(
                f.vars[0],
                1,
                Term::Object(f.objects[0]),
                0,
            )])
            .unwrap();
        let l1 = lit(0, &[Term::Variable(f.vars[0])], false);
        let l2 = lit(0, &[Term::Object(f.objects[0])], false);
        assert!(b.unify(&l1, 1, &l2, 2).is_none());
    }

    #[test]
    fn unify_repeated_variable_must_agree() {
        let f = setup(2, 1);
        let b = Bindings::new(f.terms.clone());
        let l1 = lit(
            0,
            &[Term::Variable(f.vars[0]), Term::Variable(f.vars[0])],
            false,
        );
        let l2 = lit(
            0,
            &[Term::Object(f.objects[0]), Term::Object(f.objects[1])],
            false,
        );
        assert!(b.unify(&l1, 1, &l2, 2).is_none());
    }

    #[test]
    fn affects_requires_opposite_polarity() {
        let f = setup(2, 0);
        let b = Bindings::new(f.terms.clone());
        let pos = lit(0, &[Term::Object(f.objects[0])], false);
        let neg = lit(0, &[Term::Object(f.objects[0])], true);
        assert!(b.affects(&pos, 1, &pos, 2).is_none());
        assert!(b.affects(&neg, 1, &pos, 2).is_some());
    }

    #[test]
    fn consistency_check_for_inequalities() {
        let f = setup(2, 2);
        let b = Bindings::new(f.terms.clone())
            .add(&[Binding::equal(
                f.vars[0],
                1,
                Term::Variable(f.vars[1]),
                1,
            )])
            .unwrap();
        assert!(!b.consistent_with_inequality(f.vars[0], 1, Term::Variable(f.vars[1]), 1));
        assert!(b.consistent_with_inequality(f.vars[0], 1, Term::Object(f.objects[0]), 0));
    }

    #[test]
    fn typed_union_keeps_subtype() {
        let symbols = SymbolStore::new();
        let terms = Rc::new(TermTable::new(symbols.intern("object")));
        let vehicle = terms.add_type(symbols.intern("vehicle"), terms.root_type());
        let truck = terms.add_type(symbols.intern("truck"), vehicle);
        let t1 = terms.add_object(symbols.intern("t1"), truck);
        let c1 = terms.add_object(symbols.intern("c1"), terms.root_type());
        let v_vehicle = terms.add_variable(vehicle);
        let v_truck = terms.add_variable(truck);
        let b = Bindings::new(terms.clone())
            .add(&[Binding::equal(
                v_vehicle,
                1,
                Term::Variable(v_truck),
                1,
            )])
            .unwrap();
        // The merged class only accepts trucks.
        assert!(b
            .add(&[Binding::equal(v_vehicle, 1, Term::Object(c1), 0)])
            .is_none());
        assert!(b
            .add(&[Binding::equal(v_vehicle, 1, Term::Object(t1), 0)])
            .is_some());
    }
}
