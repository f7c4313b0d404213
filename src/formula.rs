use crate::step::StepId;
use crate::term::{Term, TermTable, VariableId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::rc::Rc;

/// Unique identifier for a predicate declared in the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateId(pub(crate) u32);

impl PredicateId {
    /// Raw index (for display).
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// When a condition must hold relative to the step it belongs to.
/// Only meaningful for durative actions; plain conditions are `AtStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaTime {
    AtStart,
    OverAll,
    AtEnd,
}

/// A predicate applied to terms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom {
    pub predicate: PredicateId,
    pub args: SmallVec<[Term; 4]>,
}

/// An atom or its negation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub atom: Atom,
    pub negated: bool,
}

impl Literal {
    pub fn positive(atom: Atom) -> Self {
        Self {
            atom,
            negated: false,
        }
    }

    pub fn negative(atom: Atom) -> Self {
        Self {
            atom,
            negated: true,
        }
    }

    pub fn predicate(&self) -> PredicateId {
        self.atom.predicate
    }

    /// The same atom with the opposite polarity.
    pub fn complement(&self) -> Self {
        Self {
            atom: self.atom.clone(),
            negated: !self.negated,
        }
    }

    /// Apply a variable substitution to the atom's arguments.
    pub fn substitution(&self, map: &FxHashMap<VariableId, Term>) -> Self {
        Self {
            atom: Atom {
                predicate: self.atom.predicate,
                args: self
                    .atom
                    .args
                    .iter()
                    .map(|t| substitute_term(*t, map))
                    .collect(),
            },
            negated: self.negated,
        }
    }
}

/// An equality or inequality between a variable and a term, each side
/// optionally scoped to a step. `None` means the step the enclosing
/// formula is admitted for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingLiteral {
    pub var: VariableId,
    pub var_step: Option<StepId>,
    pub term: Term,
    pub term_step: Option<StepId>,
}

impl BindingLiteral {
    pub fn var_step_or(&self, default: StepId) -> StepId {
        self.var_step.unwrap_or(default)
    }

    pub fn term_step_or(&self, default: StepId) -> StepId {
        self.term_step.unwrap_or(default)
    }
}

/// First-order conditions, as a closed variant.
///
/// Smart constructors keep formulas simplified: `and` and `or` fold
/// units and collapse singletons, negation is pushed to the literals,
/// so `True`/`False` only ever appear at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    True,
    False,
    Literal(Literal),
    TimedLiteral { literal: Literal, when: FormulaTime },
    Equality(BindingLiteral),
    Inequality(BindingLiteral),
    Conjunction(Vec<Rc<Formula>>),
    Disjunction(Vec<Rc<Formula>>),
    Exists {
        parameters: SmallVec<[VariableId; 2]>,
        body: Rc<Formula>,
    },
    Forall {
        parameters: SmallVec<[VariableId; 2]>,
        body: Rc<Formula>,
    },
}

fn substitute_term(term: Term, map: &FxHashMap<VariableId, Term>) -> Term {
    match term {
        Term::Variable(v) => map.get(&v).copied().unwrap_or(term),
        Term::Object(_) => term,
    }
}

impl Formula {
    pub fn tautology(&self) -> bool {
        matches!(self, Formula::True)
    }

    pub fn contradiction(&self) -> bool {
        matches!(self, Formula::False)
    }

    /// Conjunction of the given formulas, with unit folding:
    /// a contradiction poisons the whole conjunction, tautologies
    /// drop out, and a singleton collapses to its element.
    pub fn and(conjuncts: impl IntoIterator<Item = Rc<Formula>>) -> Rc<Formula> {
        let mut out: Vec<Rc<Formula>> = Vec::new();
        for f in conjuncts {
            match &*f {
                Formula::False => return Rc::new(Formula::False),
                Formula::True => {}
                Formula::Conjunction(inner) => out.extend(inner.iter().cloned()),
                _ => out.push(f),
            }
        }
        match out.len() {
            0 => Rc::new(Formula::True),
            1 => out.pop().unwrap(),
            _ => Rc::new(Formula::Conjunction(out)),
        }
    }

    /// Disjunction of the given formulas, dual folding to [`Formula::and`].
    pub fn or(disjuncts: impl IntoIterator<Item = Rc<Formula>>) -> Rc<Formula> {
        let mut out: Vec<Rc<Formula>> = Vec::new();
        for f in disjuncts {
            match &*f {
                Formula::True => return Rc::new(Formula::True),
                Formula::False => {}
                Formula::Disjunction(inner) => out.extend(inner.iter().cloned()),
                _ => out.push(f),
            }
        }
        match out.len() {
            0 => Rc::new(Formula::False),
            1 => out.pop().unwrap(),
            _ => Rc::new(Formula::Disjunction(out)),
        }
    }

    /// Negation in negation normal form: De Morgan over the
    /// connectives, quantifier flipping, literal complement.
    pub fn negation(formula: &Rc<Formula>) -> Rc<Formula> {
        match &**formula {
            Formula::True => Rc::new(Formula::False),
            Formula::False => Rc::new(Formula::True),
            Formula::Literal(l) => Rc::new(Formula::Literal(l.complement())),
            Formula::TimedLiteral { literal, when } => Rc::new(Formula::TimedLiteral {
                literal: literal.complement(),
                when: *when,
            }),
            Formula::Equality(bl) => Rc::new(Formula::Inequality(bl.clone())),
            Formula::Inequality(bl) => Rc::new(Formula::Equality(bl.clone())),
            Formula::Conjunction(fs) => Formula::or(fs.iter().map(Formula::negation)),
            Formula::Disjunction(fs) => Formula::and(fs.iter().map(Formula::negation)),
            Formula::Exists { parameters, body } => Rc::new(Formula::Forall {
                parameters: parameters.clone(),
                body: Formula::negation(body),
            }),
            Formula::Forall { parameters, body } => Rc::new(Formula::Exists {
                parameters: parameters.clone(),
                body: Formula::negation(body),
            }),
        }
    }

    /// Apply a variable substitution. Quantified variables are assumed
    /// globally unique (the term table mints them), so no shadowing
    /// arises.
    pub fn substitution(self: &Rc<Self>, map: &FxHashMap<VariableId, Term>) -> Rc<Formula> {
        if map.is_empty() {
            return self.clone();
        }
        match &**self {
            Formula::True | Formula::False => self.clone(),
            Formula::Literal(l) => Rc::new(Formula::Literal(l.substitution(map))),
            Formula::TimedLiteral { literal, when } => Rc::new(Formula::TimedLiteral {
                literal: literal.substitution(map),
                when: *when,
            }),
            Formula::Equality(bl) | Formula::Inequality(bl) => {
                let var_term = substitute_term(Term::Variable(bl.var), map);
                let term = substitute_term(bl.term, map);
                let new_bl = match var_term {
                    Term::Variable(v) => BindingLiteral {
                        var: v,
                        var_step: bl.var_step,
                        term,
                        term_step: bl.term_step,
                    },
                    Term::Object(o) => match term {
                        // Both sides ground: evaluate on the spot.
                        Term::Object(o2) => {
                            let eq = matches!(&**self, Formula::Equality(_));
                            return Rc::new(if (o == o2) == eq {
                                Formula::True
                            } else {
                                Formula::False
                            });
                        }
                        Term::Variable(v) => BindingLiteral {
                            var: v,
                            var_step: bl.term_step,
                            term: Term::Object(o),
                            term_step: bl.var_step,
                        },
                    },
                };
                if matches!(&**self, Formula::Equality(_)) {
                    Rc::new(Formula::Equality(new_bl))
                } else {
                    Rc::new(Formula::Inequality(new_bl))
                }
            }
            Formula::Conjunction(fs) => Formula::and(fs.iter().map(|f| f.substitution(map))),
            Formula::Disjunction(fs) => Formula::or(fs.iter().map(|f| f.substitution(map))),
            Formula::Exists { parameters, body } => Rc::new(Formula::Exists {
                parameters: parameters.clone(),
                body: body.substitution(map),
            }),
            Formula::Forall { parameters, body } => Rc::new(Formula::Forall {
                parameters: parameters.clone(),
                body: body.substitution(map),
            }),
        }
    }

    /// Expand a `Forall` against the finite object domain: the
    /// conjunction of the body under every type-compatible assignment
    /// of the parameters. Non-universal formulas are returned as-is.
    pub fn universal_base(self: &Rc<Self>, terms: &TermTable) -> Rc<Formula> {
        let Formula::Forall { parameters, body } = &**self else {
            return self.clone();
        };
        let mut expansions = vec![body.clone()];
        for &param in parameters {
            let objects = terms.compatible_objects(terms.variable_type(param));
            let mut next = Vec::with_capacity(expansions.len() * objects.len().max(1));
            for f in &expansions {
                for &obj in &objects {
                    let mut map = FxHashMap::default();
                    map.insert(param, Term::Object(obj));
                    next.push(f.substitution(&map));
                }
            }
            expansions = next;
        }
        Formula::and(expansions)
    }

    /// Expand an `Exists` dually to [`Formula::universal_base`].
    pub fn existential_base(self: &Rc<Self>, terms: &TermTable) -> Rc<Formula> {
        let Formula::Exists { parameters, body } = &**self else {
            return self.clone();
        };
        let mut expansions = vec![body.clone()];
        for &param in parameters {
            let objects = terms.compatible_objects(terms.variable_type(param));
            let mut next = Vec::with_capacity(expansions.len() * objects.len().max(1));
            for f in &expansions {
                for &obj in &objects {
                    let mut map = FxHashMap::default();
                    map.insert(param, Term::Object(obj));
                    next.push(f.substitution(&map));
                }
            }
            expansions = next;
        }
        Formula::or(expansions)
    }

    /// Ground instantiation: expand all quantifiers against the object
    /// domain. Used on the goal when the search runs over ground
    /// actions.
    pub fn instantiation(self: &Rc<Self>, terms: &TermTable) -> Rc<Formula> {
        match &**self {
            Formula::Forall { .. } => {
                let expanded = self.universal_base(terms);
                if Rc::ptr_eq(&expanded, self) {
                    expanded
                } else {
                    expanded.instantiation(terms)
                }
            }
            Formula::Exists { .. } => {
                let expanded = self.existential_base(terms);
                if Rc::ptr_eq(&expanded, self) {
                    expanded
                } else {
                    expanded.instantiation(terms)
                }
            }
            Formula::Conjunction(fs) => Formula::and(fs.iter().map(|f| f.instantiation(terms))),
            Formula::Disjunction(fs) => Formula::or(fs.iter().map(|f| f.instantiation(terms))),
            _ => self.clone(),
        }
    }
}
