use crate::step::{StepId, StepTime, GOAL_ID, INIT_ID};
use rustc_hash::{FxHashMap, FxHashSet};

/// A single precedence constraint between two step time points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderingConstraint {
    pub before_id: StepId,
    pub t1: StepTime,
    pub after_id: StepId,
    pub t2: StepTime,
}

impl OrderingConstraint {
    pub fn new(before_id: StepId, t1: StepTime, after_id: StepId, t2: StepTime) -> Self {
        Self {
            before_id,
            t1,
            after_id,
            t2,
        }
    }

    /// Rewrite the endpoint ids; used when installing decomposition
    /// frames.
    pub(crate) fn with_ids(&self, before_id: StepId, after_id: StepId) -> Self {
        Self {
            before_id,
            t1: self.t1,
            after_id,
            t2: self.t2,
        }
    }
}

/// Which pairs of end points of two steps may coincide in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConcurrencyFlags {
    pub start_start: bool,
    pub start_end: bool,
    pub end_start: bool,
    pub end_end: bool,
}

impl ConcurrencyFlags {
    pub fn any(&self) -> bool {
        self.start_start || self.start_end || self.end_start || self.end_end
    }
}

/// The scheduled layout of a plan's steps.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    pub start_times: FxHashMap<StepId, f32>,
    pub end_times: FxHashMap<StepId, f32>,
    pub makespan: f32,
}

type Point = (StepId, StepTime);

/// Ordering constraints of a plan.
///
/// `Binary` treats every step as an instant and maintains a strict
/// partial order; `Temporal` orders (step, start/end) time points and
/// additionally carries numeric windows so timed initial literals and
/// heuristic makespans can tighten the schedule. Values are immutable;
/// `refine` returns a new value or `None` on inconsistency.
#[derive(Debug, Clone)]
pub enum Orderings {
    Binary(BinaryOrderings),
    Temporal(TemporalOrderings),
}

impl Orderings {
    pub fn binary() -> Self {
        Orderings::Binary(BinaryOrderings::default())
    }

    pub fn temporal() -> Self {
        Orderings::Temporal(TemporalOrderings::default())
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Orderings::Temporal(_))
    }

    /// Can the first point be strictly before the second?
    pub fn possibly_before(&self, id1: StepId, t1: StepTime, id2: StepId, t2: StepTime) -> bool {
        match self {
            Orderings::Binary(b) => b.possibly_before(id1, id2),
            Orderings::Temporal(t) => t.possibly_before((id1, t1), (id2, t2)),
        }
    }

    /// Can the first point avoid being strictly before the second?
    pub fn possibly_not_before(
        &self,
        id1: StepId,
        t1: StepTime,
        id2: StepId,
        t2: StepTime,
    ) -> bool {
        match self {
            Orderings::Binary(b) => !b.necessarily_before(id1, id2),
            Orderings::Temporal(t) => !t.necessarily_before((id1, t1), (id2, t2)),
        }
    }

    /// Can the first point avoid being strictly after the second?
    pub fn possibly_not_after(
        &self,
        id1: StepId,
        t1: StepTime,
        id2: StepId,
        t2: StepTime,
    ) -> bool {
        match self {
            Orderings::Binary(b) => !b.necessarily_before(id2, id1),
            Orderings::Temporal(t) => !t.necessarily_before((id2, t2), (id1, t1)),
        }
    }

    /// Check whether two steps may overlap in time, and if so which of
    /// their end-point pairs may coincide.
    pub fn possibly_concurrent(&self, id1: StepId, id2: StepId) -> Option<ConcurrencyFlags> {
        if id1 == id2 || id1 == INIT_ID || id2 == INIT_ID || id1 == GOAL_ID || id2 == GOAL_ID {
            return None;
        }
        let flags = match self {
            Orderings::Binary(b) => {
                if b.necessarily_before(id1, id2) || b.necessarily_before(id2, id1) {
                    ConcurrencyFlags::default()
                } else {
                    ConcurrencyFlags {
                        start_start: true,
                        start_end: true,
                        end_start: true,
                        end_end: true,
                    }
                }
            }
            Orderings::Temporal(t) => t.concurrency(id1, id2),
        };
        flags.any().then_some(flags)
    }

    /// Add a precedence constraint. Returns the refined orderings, or
    /// `None` if the constraint closes a cycle or empties a window.
    pub fn refine(&self, constraint: &OrderingConstraint) -> Option<Orderings> {
        match self {
            Orderings::Binary(b) => b.refine(constraint).map(Orderings::Binary),
            Orderings::Temporal(t) => t.refine(constraint).map(Orderings::Temporal),
        }
    }

    /// Pin a step to an absolute time (timed initial literals).
    /// A no-op for binary orderings.
    pub fn refine_timed(&self, time: f32, step_id: StepId) -> Option<Orderings> {
        match self {
            Orderings::Binary(_) => Some(self.clone()),
            Orderings::Temporal(t) => t.refine_timed(time, step_id).map(Orderings::Temporal),
        }
    }

    /// Raise the earliest start/end of a step (heuristic makespan
    /// tightening). A no-op for binary orderings.
    pub fn refine_bounds(&self, step_id: StepId, min_start: f32, min_end: f32) -> Option<Orderings> {
        match self {
            Orderings::Binary(_) => Some(self.clone()),
            Orderings::Temporal(t) => t
                .refine_bounds(step_id, min_start, min_end)
                .map(Orderings::Temporal),
        }
    }

    /// Lay out the given steps as early as the constraints allow.
    pub fn schedule(&self, step_ids: impl IntoIterator<Item = StepId>) -> Schedule {
        match self {
            Orderings::Binary(b) => b.schedule(step_ids),
            Orderings::Temporal(t) => t.schedule(step_ids),
        }
    }
}

/// Strict partial order over whole steps, kept transitively closed.
#[derive(Debug, Clone, Default)]
pub struct BinaryOrderings {
    before: FxHashSet<(StepId, StepId)>,
}

fn real(id: StepId) -> bool {
    id != INIT_ID && id != GOAL_ID
}

impl BinaryOrderings {
    fn necessarily_before(&self, id1: StepId, id2: StepId) -> bool {
        if id1 == id2 {
            return false;
        }
        if id1 == INIT_ID || id2 == GOAL_ID {
            return true;
        }
        if id1 == GOAL_ID || id2 == INIT_ID {
            return false;
        }
        self.before.contains(&(id1, id2))
    }

    fn possibly_before(&self, id1: StepId, id2: StepId) -> bool {
        id1 != id2 && !self.necessarily_before(id2, id1)
    }

    fn refine(&self, constraint: &OrderingConstraint) -> Option<BinaryOrderings> {
        let (a, b) = (constraint.before_id, constraint.after_id);
        if a == b {
            // Start before End of the same step is implicit.
            return (constraint.t1 <= constraint.t2).then(|| self.clone());
        }
        if a == GOAL_ID || b == INIT_ID {
            return None;
        }
        if a == INIT_ID || b == GOAL_ID {
            return Some(self.clone());
        }
        if self.before.contains(&(b, a)) {
            return None;
        }
        if self.before.contains(&(a, b)) {
            return Some(self.clone());
        }
        let mut out = self.clone();
        let mut preds: Vec<StepId> = vec![a];
        let mut succs: Vec<StepId> = vec![b];
        for &(x, y) in &self.before {
            if y == a {
                preds.push(x);
            }
            if x == b {
                succs.push(y);
            }
        }
        for &p in &preds {
            for &s in &succs {
                out.before.insert((p, s));
            }
        }
        Some(out)
    }

    fn schedule(&self, step_ids: impl IntoIterator<Item = StepId>) -> Schedule {
        // Longest-path layering: each step starts one tick after the
        // latest of its predecessors.
        let ids: Vec<StepId> = step_ids.into_iter().filter(|&id| real(id)).collect();
        let mut times: FxHashMap<StepId, f32> = FxHashMap::default();
        let mut changed = true;
        while changed {
            changed = false;
            for &id in &ids {
                let mut t: f32 = 1.0;
                for &pred in &ids {
                    if self.necessarily_before(pred, id) {
                        let pt = times.get(&pred).copied().unwrap_or(1.0);
                        t = t.max(pt + 1.0);
                    }
                }
                if times.get(&id) != Some(&t) {
                    times.insert(id, t);
                    changed = true;
                }
            }
        }
        let makespan = times.values().fold(0.0f32, |m, &t| m.max(t));
        Schedule {
            end_times: times.clone(),
            start_times: times,
            makespan,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    min: f32,
    max: f32,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: f32::INFINITY,
        }
    }
}

/// Partial order over (step, start/end) time points with numeric
/// windows per point.
#[derive(Debug, Clone, Default)]
pub struct TemporalOrderings {
    before: FxHashSet<(Point, Point)>,
    windows: FxHashMap<Point, Window>,
}

impl TemporalOrderings {
    fn window(&self, p: Point) -> Window {
        self.windows.get(&p).copied().unwrap_or_default()
    }

    fn necessarily_before(&self, p: Point, q: Point) -> bool {
        if p.0 == q.0 {
            return false;
        }
        if p.0 == INIT_ID || q.0 == GOAL_ID {
            return true;
        }
        if p.0 == GOAL_ID || q.0 == INIT_ID {
            return false;
        }
        if self.before.contains(&(p, q)) {
            return true;
        }
        // A window wholly before another forces the order.
        self.window(p).max < self.window(q).min
    }

    fn possibly_before(&self, p: Point, q: Point) -> bool {
        if p.0 == q.0 {
            return p.1 < q.1;
        }
        if !real(p.0) || !real(q.0) {
            return self.necessarily_before(p, q);
        }
        if self.necessarily_before(q, p) {
            return false;
        }
        // Windows must leave room for p to precede q.
        self.window(p).min < self.window(q).max
    }

    fn concurrency(&self, id1: StepId, id2: StepId) -> ConcurrencyFlags {
        let pair = |t1: StepTime, t2: StepTime| {
            let p = (id1, t1);
            let q = (id2, t2);
            if self.necessarily_before(p, q) || self.necessarily_before(q, p) {
                return false;
            }
            let (wp, wq) = (self.window(p), self.window(q));
            wp.min <= wq.max && wq.min <= wp.max
        };
        ConcurrencyFlags {
            start_start: pair(StepTime::Start, StepTime::Start),
            start_end: pair(StepTime::Start, StepTime::End),
            end_start: pair(StepTime::End, StepTime::Start),
            end_end: pair(StepTime::End, StepTime::End),
        }
    }

    /// Propagate window minimums along the precedence edges until a
    /// fixpoint; fails if some window empties.
    fn propagate(mut self) -> Option<TemporalOrderings> {
        let edges: Vec<(Point, Point)> = self.before.iter().copied().collect();
        let mut changed = true;
        while changed {
            changed = false;
            let steps: Vec<StepId> = self.windows.keys().map(|p| p.0).collect();
            for id in steps {
                let start = self.window((id, StepTime::Start));
                let end = self.windows.entry((id, StepTime::End)).or_default();
                if end.min < start.min {
                    end.min = start.min;
                    changed = true;
                }
            }
            for &(p, q) in &edges {
                let pm = self.window(p).min;
                let target = self.windows.entry(q).or_default();
                if target.min < pm {
                    target.min = pm;
                    changed = true;
                }
            }
        }
        for w in self.windows.values() {
            if w.min > w.max {
                return None;
            }
        }
        Some(self)
    }

    fn refine(&self, constraint: &OrderingConstraint) -> Option<TemporalOrderings> {
        let p = (constraint.before_id, constraint.t1);
        let q = (constraint.after_id, constraint.t2);
        if p.0 == q.0 {
            return (constraint.t1 <= constraint.t2).then(|| self.clone());
        }
        if p.0 == GOAL_ID || q.0 == INIT_ID {
            return None;
        }
        if p.0 == INIT_ID || q.0 == GOAL_ID {
            return Some(self.clone());
        }
        if self.necessarily_before(q, p) {
            return None;
        }
        if self.before.contains(&(p, q)) {
            return Some(self.clone());
        }
        let mut out = self.clone();
        let mut preds: Vec<Point> = vec![p, (p.0, StepTime::Start)];
        let mut succs: Vec<Point> = vec![q, (q.0, StepTime::End)];
        for &(x, y) in &self.before {
            if y == p || y == (p.0, StepTime::Start) {
                preds.push(x);
            }
            if x == q || x == (q.0, StepTime::End) {
                succs.push(y);
            }
        }
        for &a in &preds {
            for &b in &succs {
                if a.0 != b.0 {
                    out.before.insert((a, b));
                }
            }
        }
        out.propagate()
    }

    fn refine_timed(&self, time: f32, step_id: StepId) -> Option<TemporalOrderings> {
        let mut out = self.clone();
        for t in [StepTime::Start, StepTime::End] {
            let w = out.windows.entry((step_id, t)).or_default();
            if time < w.min || time > w.max {
                return None;
            }
            w.min = time;
            w.max = time;
        }
        out.propagate()
    }

    fn refine_bounds(
        &self,
        step_id: StepId,
        min_start: f32,
        min_end: f32,
    ) -> Option<TemporalOrderings> {
        if !real(step_id) {
            return Some(self.clone());
        }
        let mut out = self.clone();
        let start = out.windows.entry((step_id, StepTime::Start)).or_default();
        start.min = start.min.max(min_start);
        let end = out.windows.entry((step_id, StepTime::End)).or_default();
        end.min = end.min.max(min_end);
        out.propagate()
    }

    fn schedule(&self, step_ids: impl IntoIterator<Item = StepId>) -> Schedule {
        let ids: Vec<StepId> = step_ids.into_iter().filter(|&id| real(id)).collect();
        let mut times: FxHashMap<Point, f32> = FxHashMap::default();
        let mut changed = true;
        while changed {
            changed = false;
            for &id in &ids {
                for t in [StepTime::Start, StepTime::End] {
                    let p = (id, t);
                    let mut v = self.window(p).min;
                    if t == StepTime::End {
                        v = v.max(times.get(&(id, StepTime::Start)).copied().unwrap_or(0.0));
                    }
                    let known: Vec<(Point, f32)> =
                        times.iter().map(|(&q, &tv)| (q, tv)).collect();
                    for (q, tv) in known {
                        if self.before.contains(&(q, p)) {
                            v = v.max(tv);
                        }
                    }
                    if times.get(&p) != Some(&v) {
                        times.insert(p, v);
                        changed = true;
                    }
                }
            }
        }
        let mut schedule = Schedule::default();
        for &id in &ids {
            let s = times.get(&(id, StepTime::Start)).copied().unwrap_or(0.0);
            let e = times.get(&(id, StepTime::End)).copied().unwrap_or(s);
            schedule.start_times.insert(id, s);
            schedule.end_times.insert(id, e);
            schedule.makespan = schedule.makespan.max(e);
        }
        schedule
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oc(a: StepId, b: StepId) -> OrderingConstraint {
        OrderingConstraint::new(a, StepTime::End, b, StepTime::Start)
    }

    // ========== BINARY ==========

    #[test]
    fn binary_init_and_goal_are_implicit() {
        let o = Orderings::binary();
        assert!(o.possibly_before(INIT_ID, StepTime::End, 1, StepTime::Start));
        assert!(!o.possibly_before(1, StepTime::End, INIT_ID, StepTime::Start));
        assert!(o.possibly_before(1, StepTime::End, GOAL_ID, StepTime::Start));
        assert!(!o.possibly_before(GOAL_ID, StepTime::End, 1, StepTime::Start));
    }

    #[test]
    fn binary_unordered_steps_can_go_either_way() {
        let o = Orderings::binary();
        assert!(o.possibly_before(1, StepTime::End, 2, StepTime::Start));
        assert!(o.possibly_before(2, StepTime::End, 1, StepTime::Start));
        assert!(o.possibly_not_before(1, StepTime::End, 2, StepTime::Start));
    }

    #[test]
    fn binary_refine_orders_the_pair() {
        let o = Orderings::binary().refine(&oc(1, 2)).unwrap();
        assert!(o.possibly_before(1, StepTime::End, 2, StepTime::Start));
        assert!(!o.possibly_before(2, StepTime::End, 1, StepTime::Start));
        assert!(!o.possibly_not_before(1, StepTime::End, 2, StepTime::Start));
        assert!(o.possibly_concurrent(1, 2).is_none());
    }

    #[test]
    fn binary_refine_rejects_cycle() {
        let o = Orderings::binary().refine(&oc(1, 2)).unwrap();
        assert!(o.refine(&oc(2, 1)).is_none());
    }

    #[test]
    fn binary_refine_is_transitive() {
        let o = Orderings::binary()
            .refine(&oc(1, 2))
            .unwrap()
            .refine(&oc(2, 3))
            .unwrap();
        assert!(!o.possibly_before(3, StepTime::End, 1, StepTime::Start));
        assert!(o.refine(&oc(3, 1)).is_none());
    }

    #[test]
    fn binary_refine_involving_dummies() {
        let o = Orderings::binary();
        assert!(o.refine(&oc(INIT_ID, 1)).is_some());
        assert!(o.refine(&oc(1, GOAL_ID)).is_some());
        assert!(o.refine(&oc(GOAL_ID, 1)).is_none());
        assert!(o.refine(&oc(1, INIT_ID)).is_none());
    }

    #[test]
    fn binary_schedule_layers_steps() {
        let o = Orderings::binary()
            .refine(&oc(1, 2))
            .unwrap()
            .refine(&oc(2, 3))
            .unwrap();
        let s = o.schedule([1, 2, 3]);
        assert!(s.start_times[&1] < s.start_times[&2]);
        assert!(s.start_times[&2] < s.start_times[&3]);
        assert_eq!(s.makespan, s.start_times[&3]);
    }

    // ========== TEMPORAL ==========

    #[test]
    fn temporal_refine_orders_points() {
        let o = Orderings::temporal().refine(&oc(1, 2)).unwrap();
        assert!(!o.possibly_not_before(1, StepTime::End, 2, StepTime::Start));
        assert!(!o.possibly_before(2, StepTime::Start, 1, StepTime::End));
    }

    #[test]
    fn temporal_refine_rejects_cycle() {
        let o = Orderings::temporal().refine(&oc(1, 2)).unwrap();
        assert!(o.refine(&oc(2, 1)).is_none());
    }

    #[test]
    fn temporal_same_step_start_before_end() {
        let o = Orderings::temporal();
        assert!(o.possibly_before(1, StepTime::Start, 1, StepTime::End));
        assert!(!o.possibly_before(1, StepTime::End, 1, StepTime::Start));
    }

    #[test]
    fn timed_step_is_pinned() {
        let o = Orderings::temporal().refine_timed(5.0, 1).unwrap();
        let s = o.schedule([1]);
        assert_eq!(s.start_times[&1], 5.0);
        assert_eq!(s.makespan, 5.0);
    }

    #[test]
    fn successor_of_timed_step_starts_no_earlier() {
        let o = Orderings::temporal()
            .refine_timed(5.0, 1)
            .unwrap()
            .refine(&oc(1, 2))
            .unwrap();
        let s = o.schedule([1, 2]);
        assert!(s.start_times[&2] >= 5.0);
    }

    #[test]
    fn bounds_tighten_the_schedule() {
        let o = Orderings::temporal().refine_bounds(1, 3.0, 4.0).unwrap();
        let s = o.schedule([1]);
        assert_eq!(s.start_times[&1], 3.0);
        assert_eq!(s.end_times[&1], 4.0);
    }

    #[test]
    fn bounds_beyond_pin_are_inconsistent() {
        let o = Orderings::temporal().refine_timed(2.0, 1).unwrap();
        assert!(o.refine_bounds(1, 3.0, 3.0).is_none());
    }

    #[test]
    fn temporal_concurrency_flags() {
        let o = Orderings::temporal();
        let flags = o.possibly_concurrent(1, 2).unwrap();
        assert!(flags.start_start && flags.end_end);
        let o = o.refine(&oc(1, 2)).unwrap();
        let flags = o.possibly_concurrent(1, 2);
        // End of 1 strictly precedes start of 2; starts may still align
        // only if windows allow, but the ordered pair is gone.
        if let Some(f) = flags {
            assert!(!f.end_start);
        }
    }
}
