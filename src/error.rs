use thiserror::Error;

/// Errors raised while assembling a domain or problem, or by a
/// structurally invalid planning request. Inconsistencies found during
/// search are not errors; they silently discard the branch, and an
/// exhausted frontier yields `Ok(None)`.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("action '{0}' is declared twice")]
    DuplicateAction(String),

    #[error("decomposition '{0}' targets unknown action '{1}'")]
    UnknownCompositeAction(String, String),

    #[error("decomposition '{0}' targets non-composite action '{1}'")]
    NotComposite(String, String),

    #[error("predicate '{0}' used with {1} arguments but declared with {2}")]
    ArityMismatch(String, usize, usize),

    #[error("flaw orders and search limits differ in length ({0} vs {1})")]
    MismatchedSearchLimits(usize, usize),
}
