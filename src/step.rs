use crate::action::{Action, Effect};
use crate::formula::{FormulaTime, Literal};
use std::rc::Rc;

/// Step identifier within one plan. Dense, assigned in creation order.
pub type StepId = u32;

/// Id of the dummy initial step whose effects encode the initial state.
pub const INIT_ID: StepId = 0;

/// Id of the dummy goal step whose preconditions encode the goal.
pub const GOAL_ID: StepId = StepId::MAX;

/// One of the two time points of a step. Plain (non-durative) steps
/// collapse both onto the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepTime {
    Start,
    End,
}

impl FormulaTime {
    /// The step time point at which a condition with this tag starts
    /// to be required.
    pub fn start_time(self) -> StepTime {
        match self {
            FormulaTime::AtStart | FormulaTime::OverAll => StepTime::Start,
            FormulaTime::AtEnd => StepTime::End,
        }
    }

    /// The step time point at which a condition with this tag stops
    /// being required.
    pub fn end_time(self) -> StepTime {
        match self {
            FormulaTime::AtStart => StepTime::Start,
            FormulaTime::OverAll | FormulaTime::AtEnd => StepTime::End,
        }
    }
}

/// A plan step: an id paired with the action it executes.
#[derive(Debug, Clone)]
pub struct Step {
    id: StepId,
    action: Rc<Action>,
}

impl Step {
    pub fn new(id: StepId, action: Rc<Action>) -> Self {
        Self { id, action }
    }

    pub fn id(&self) -> StepId {
        self.id
    }

    pub fn action(&self) -> &Rc<Action> {
        &self.action
    }

    /// Rewrite the step id; used when installing decomposition
    /// pseudo-steps under fresh plan-level ids.
    pub(crate) fn with_id(&self, id: StepId) -> Self {
        Self {
            id,
            action: self.action.clone(),
        }
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.action, &other.action)
    }
}

/// A causal link: `from`'s effect at `effect_time` establishes
/// `condition` for `to` at `condition_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    from_id: StepId,
    effect_time: StepTime,
    to_id: StepId,
    condition: Literal,
    condition_time: FormulaTime,
}

impl Link {
    pub fn new(
        from_id: StepId,
        effect_time: StepTime,
        to_id: StepId,
        condition: Literal,
        condition_time: FormulaTime,
    ) -> Self {
        Self {
            from_id,
            effect_time,
            to_id,
            condition,
            condition_time,
        }
    }

    pub fn from_id(&self) -> StepId {
        self.from_id
    }

    pub fn effect_time(&self) -> StepTime {
        self.effect_time
    }

    pub fn to_id(&self) -> StepId {
        self.to_id
    }

    pub fn condition(&self) -> &Literal {
        &self.condition
    }

    pub fn condition_time(&self) -> FormulaTime {
        self.condition_time
    }

    /// Rewrite the endpoint ids; used when installing decomposition
    /// frames.
    pub(crate) fn with_ids(&self, from_id: StepId, to_id: StepId) -> Self {
        Self {
            from_id,
            effect_time: self.effect_time,
            to_id,
            condition: self.condition.clone(),
            condition_time: self.condition_time,
        }
    }
}

/// A step id paired with one of its effects; how flaws and repairs
/// refer to effects without copying them.
#[derive(Debug, Clone)]
pub struct StepEffect {
    pub step_id: StepId,
    pub effect: Rc<Effect>,
}

impl PartialEq for StepEffect {
    fn eq(&self, other: &Self) -> bool {
        self.step_id == other.step_id && Rc::ptr_eq(&self.effect, &other.effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_time_start_points() {
        assert_eq!(FormulaTime::AtStart.start_time(), StepTime::Start);
        assert_eq!(FormulaTime::OverAll.start_time(), StepTime::Start);
        assert_eq!(FormulaTime::AtEnd.start_time(), StepTime::End);
    }

    #[test]
    fn formula_time_end_points() {
        assert_eq!(FormulaTime::AtStart.end_time(), StepTime::Start);
        assert_eq!(FormulaTime::OverAll.end_time(), StepTime::End);
        assert_eq!(FormulaTime::AtEnd.end_time(), StepTime::End);
    }

    #[test]
    fn goal_id_is_largest() {
        assert!(INIT_ID < GOAL_ID);
        assert_eq!(GOAL_ID, u32::MAX);
    }
}
