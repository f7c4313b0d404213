use crate::action::Effect;
use crate::domain::Domain;
use crate::formula::{BindingLiteral, Formula, FormulaTime, Literal};
use crate::step::{Link, Step, StepId};
use std::rc::Rc;

/// A reason a plan is not yet a solution. Closed sum; refinement
/// dispatches exhaustively on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Flaw {
    Unsafe(UnsafeFlaw),
    OpenCondition(OpenCondition),
    MutexThreat(MutexThreat),
    UnexpandedStep(UnexpandedStep),
}

/// A step whose effect may fall between a link's producer and consumer
/// and negate its condition.
#[derive(Debug, Clone)]
pub struct UnsafeFlaw {
    pub link: Link,
    pub step_id: StepId,
    pub effect: Rc<Effect>,
}

impl PartialEq for UnsafeFlaw {
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link
            && self.step_id == other.step_id
            && Rc::ptr_eq(&self.effect, &other.effect)
    }
}

/// The shape of an unsatisfied precondition.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenCond {
    Literal { literal: Literal, when: FormulaTime },
    Disjunction(Rc<Formula>),
    Inequality(BindingLiteral),
}

/// A precondition of a step not yet established by any link.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenCondition {
    pub step_id: StepId,
    pub condition: OpenCond,
}

impl OpenCondition {
    pub fn literal(&self) -> Option<(&Literal, FormulaTime)> {
        match &self.condition {
            OpenCond::Literal { literal, when } => Some((literal, *when)),
            _ => None,
        }
    }

    /// Check if this is a literal condition over a static predicate.
    pub fn is_static(&self, domain: &Domain) -> bool {
        match &self.condition {
            OpenCond::Literal { literal, .. } => domain.static_predicate(literal.predicate()),
            _ => false,
        }
    }
}

/// Two effects of possibly concurrent steps whose atoms can unify
/// (durative domains only). The placeholder variant seeds the initial
/// plan; its first handling sweeps all step pairs for real threats.
#[derive(Debug, Clone)]
pub enum MutexThreat {
    Placeholder,
    Threat {
        step_id1: StepId,
        effect1: Rc<Effect>,
        step_id2: StepId,
        effect2: Rc<Effect>,
    },
}

impl PartialEq for MutexThreat {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MutexThreat::Placeholder, MutexThreat::Placeholder) => true,
            (
                MutexThreat::Threat {
                    step_id1: a1,
                    effect1: e1,
                    step_id2: a2,
                    effect2: e2,
                },
                MutexThreat::Threat {
                    step_id1: b1,
                    effect1: f1,
                    step_id2: b2,
                    effect2: f2,
                },
            ) => a1 == b1 && a2 == b2 && Rc::ptr_eq(e1, f1) && Rc::ptr_eq(e2, f2),
            _ => false,
        }
    }
}

/// A composite step awaiting expansion via a decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct UnexpandedStep {
    pub step: Step,
}

impl UnexpandedStep {
    pub fn step_id(&self) -> StepId {
        self.step.id()
    }
}
