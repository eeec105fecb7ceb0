//! Traversal builder
//!
//! `Traversal` accumulates steps without doing any I/O. Every step method
//! takes `self` and returns the extended traversal; clone a traversal to
//! branch it. Modulators (`by`, `times`) attach to the step immediately
//! before them and fail on the spot when there is nothing to attach to.
//!
//! `build()` validates the whole step sequence and produces an immutable
//! [`TraversalPlan`]. Terminal operations (`to_list`, `next`, ...) consume
//! the builder, so no step can be appended after execution.
//!
//! ```no_run
//! use gremlin_client::statics::*;
//! use gremlin_client::Connection;
//!
//! let mut conn = Connection::open("ws://localhost:8182/gremlin", "g")?;
//! let names: Vec<String> = g()
//!     .v(())
//!     .has_label("person")
//!     .has("age", gt(30))
//!     .order()
//!     .by(("age", DESC))?
//!     .values("name")
//!     .to_list(&mut conn)?;
//! # Ok::<(), gremlin_client::ClientError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::materialize::{FromGraphValue, Materializer};
use crate::process::step::{Order, ResultShape, Step, P};
use crate::structure::{ElementId, Vertex};

// ============================================================================
// Argument helpers
// ============================================================================

/// Zero or more labels / property keys
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Names(Vec<String>);

impl Names {
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<()> for Names {
    fn from(_: ()) -> Self {
        Names(Vec::new())
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Names(vec![name.to_string()])
    }
}

impl From<String> for Names {
    fn from(name: String) -> Self {
        Names(vec![name])
    }
}

impl<const N: usize> From<[&str; N]> for Names {
    fn from(names: [&str; N]) -> Self {
        Names(names.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[&str]> for Names {
    fn from(names: &[&str]) -> Self {
        Names(names.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<String>> for Names {
    fn from(names: Vec<String>) -> Self {
        Names(names)
    }
}

impl From<Vec<&str>> for Names {
    fn from(names: Vec<&str>) -> Self {
        Names(names.into_iter().map(str::to_string).collect())
    }
}

/// Zero or more vertex ids for `V(...)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ids(Vec<ElementId>);

impl From<()> for Ids {
    fn from(_: ()) -> Self {
        Ids(Vec::new())
    }
}

impl From<i32> for Ids {
    fn from(id: i32) -> Self {
        Ids(vec![id.into()])
    }
}

impl From<i64> for Ids {
    fn from(id: i64) -> Self {
        Ids(vec![id.into()])
    }
}

impl From<&str> for Ids {
    fn from(id: &str) -> Self {
        Ids(vec![id.into()])
    }
}

impl From<ElementId> for Ids {
    fn from(id: ElementId) -> Self {
        Ids(vec![id])
    }
}

impl<T: Into<ElementId>, const N: usize> From<[T; N]> for Ids {
    fn from(ids: [T; N]) -> Self {
        Ids(ids.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ElementId>> From<Vec<T>> for Ids {
    fn from(ids: Vec<T>) -> Self {
        Ids(ids.into_iter().map(Into::into).collect())
    }
}

/// Argument of the `by()` modulator: a key, optionally with a sort order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct By {
    key: String,
    order: Option<Order>,
}

impl From<&str> for By {
    fn from(key: &str) -> Self {
        By { key: key.to_string(), order: None }
    }
}

impl From<String> for By {
    fn from(key: String) -> Self {
        By { key, order: None }
    }
}

impl From<(&str, Order)> for By {
    fn from((key, order): (&str, Order)) -> Self {
        By { key: key.to_string(), order: Some(order) }
    }
}

impl From<(String, Order)> for By {
    fn from((key, order): (String, Order)) -> Self {
        By { key, order: Some(order) }
    }
}

// ============================================================================
// Source
// ============================================================================

/// Starting point for traversals (`g`). The server-side source name is bound
/// when the connection is opened, not here.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphTraversalSource;

impl GraphTraversalSource {
    /// `V()` with no ids selects every vertex, otherwise the given ids
    pub fn v(&self, ids: impl Into<Ids>) -> Traversal {
        Traversal::vertices(ids)
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// Chainable, side-effect free step accumulator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traversal {
    steps: Vec<Step>,
}

impl Traversal {
    /// Anonymous traversal with no steps, for use inside `repeat()`
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn vertices(ids: impl Into<Ids>) -> Self {
        let Ids(ids) = ids.into();
        let step = if ids.is_empty() {
            Step::SelectAll
        } else {
            Step::SelectById { ids }
        };
        Self { steps: vec![step] }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn push(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    // === FILTERS ===

    pub fn has_label(self, labels: impl Into<Names>) -> Self {
        self.push(Step::HasLabel { labels: labels.into().into_vec() })
    }

    /// `has(key, literal)` tests equality; pass a [`P`] for other comparisons
    pub fn has(self, key: impl Into<String>, predicate: impl Into<P>) -> Self {
        self.push(Step::HasProperty { key: key.into(), predicate: predicate.into() })
    }

    pub fn dedup(self) -> Self {
        self.push(Step::Deduplicate)
    }

    // === DIRECTION ===

    pub fn out(self, labels: impl Into<Names>) -> Self {
        self.push(Step::Out { labels: labels.into().into_vec() })
    }

    pub fn in_(self, labels: impl Into<Names>) -> Self {
        self.push(Step::In { labels: labels.into().into_vec() })
    }

    pub fn both(self, labels: impl Into<Names>) -> Self {
        self.push(Step::Both { labels: labels.into().into_vec() })
    }

    pub fn out_e(self, labels: impl Into<Names>) -> Self {
        self.push(Step::OutEdges { labels: labels.into().into_vec() })
    }

    pub fn in_e(self, labels: impl Into<Names>) -> Self {
        self.push(Step::InEdges { labels: labels.into().into_vec() })
    }

    pub fn both_e(self, labels: impl Into<Names>) -> Self {
        self.push(Step::BothEdges { labels: labels.into().into_vec() })
    }

    pub fn in_v(self) -> Self {
        self.push(Step::InVertices)
    }

    pub fn out_v(self) -> Self {
        self.push(Step::OutVertices)
    }

    // === PROJECTION ===

    pub fn values(self, keys: impl Into<Names>) -> Self {
        self.push(Step::ValuesOf { keys: keys.into().into_vec() })
    }

    pub fn value_map(self, include_tokens: bool) -> Self {
        self.push(Step::ValueMap { include_tokens })
    }

    // === AGGREGATION ===

    pub fn count(self) -> Self {
        self.push(Step::Count)
    }

    pub fn mean(self) -> Self {
        self.push(Step::Mean)
    }

    /// Needs a following `by()`
    pub fn order(self) -> Self {
        self.push(Step::Order { key: None, order: Order::Asc })
    }

    /// Needs a following `by()`
    pub fn group_count(self) -> Self {
        self.push(Step::GroupCount { key: None })
    }

    /// Needs a following `times()`
    pub fn repeat(self, body: Traversal) -> Self {
        self.push(Step::Repeat { steps: body.steps, times: None })
    }

    // === MODULATORS ===

    /// Attach a key (and for `order()`, a direction) to the preceding
    /// `order()` or `group_count()`
    pub fn by(mut self, modulator: impl Into<By>) -> Result<Self> {
        let By { key, order } = modulator.into();
        let index = self.steps.len();
        match self.steps.last_mut() {
            Some(Step::Order { key: slot @ None, order: direction }) => {
                *slot = Some(key);
                *direction = order.unwrap_or_default();
                Ok(self)
            }
            Some(Step::GroupCount { key: slot @ None }) => {
                if order.is_some() {
                    return Err(plan_error(index, "by", "groupCount().by() takes a key, not a sort order"));
                }
                *slot = Some(key);
                Ok(self)
            }
            Some(Step::Order { .. }) | Some(Step::GroupCount { .. }) => {
                Err(plan_error(index, "by", "preceding step already has a by() modulator"))
            }
            Some(other) => Err(plan_error(
                index,
                "by",
                format!("by() must follow order() or groupCount(), found {}()", other.name()),
            )),
            None => Err(plan_error(index, "by", "by() must follow order() or groupCount()")),
        }
    }

    /// Set the iteration count of the preceding `repeat()`
    pub fn times(mut self, n: u32) -> Result<Self> {
        let index = self.steps.len();
        match self.steps.last_mut() {
            Some(Step::Repeat { times: slot @ None, .. }) => {
                *slot = Some(n);
                Ok(self)
            }
            Some(Step::Repeat { .. }) => {
                Err(plan_error(index, "times", "preceding repeat() already has times()"))
            }
            Some(other) => Err(plan_error(
                index,
                "times",
                format!("times() must follow repeat(), found {}()", other.name()),
            )),
            None => Err(plan_error(index, "times", "times() must follow repeat()")),
        }
    }

    // === BUILD ===

    /// Validate the step sequence and freeze it into a plan
    pub fn build(&self) -> Result<TraversalPlan> {
        let shape = check_steps(&self.steps, None, 0)?;
        Ok(TraversalPlan { steps: self.steps.clone(), shape: Some(shape) })
    }

    // === TERMINALS ===

    /// Build, submit and decode every result, in server order
    pub fn to_list<T: FromGraphValue>(self, conn: &mut Connection) -> Result<Vec<T>> {
        let plan = self.build()?;
        Materializer::new(conn).to_list(&plan)
    }

    /// Build, submit and decode the first result
    pub fn next<T: FromGraphValue>(self, conn: &mut Connection) -> Result<T> {
        let plan = self.build()?;
        Materializer::new(conn).next(&plan)
    }

    /// Vertices with their full property maps, in a single round-trip
    pub fn vertex_snapshots(self, conn: &mut Connection) -> Result<Vec<Vertex>> {
        let plan = self.build()?;
        Materializer::new(conn).vertex_snapshots(&plan)
    }
}

fn plan_error(step_index: usize, step: &'static str, message: impl Into<String>) -> ClientError {
    ClientError::PlanConstruction { step_index, step, message: message.into() }
}

/// Walk the steps, checking each one against the shape produced so far.
///
/// `entry` is `None` for a top-level traversal (which must start with a
/// source step) and the incoming shape for a `repeat()` body. Errors inside
/// a body are reported at the index of the enclosing `repeat()`.
fn check_steps(steps: &[Step], entry: Option<ResultShape>, base: usize) -> Result<ResultShape> {
    let nested = entry.is_some();
    let mut shape = entry;

    if steps.is_empty() {
        return match shape {
            Some(s) if nested => Ok(s),
            _ => Err(plan_error(base, "V", "traversal has no steps")),
        };
    }

    for (offset, step) in steps.iter().enumerate() {
        let index = if nested { base } else { base + offset };
        let name = step.name();

        let current = match (step.is_source(), shape) {
            (true, None) => {
                shape = Some(ResultShape::Vertices);
                continue;
            }
            (true, Some(_)) => {
                return Err(plan_error(index, name, "V() may only start a traversal"));
            }
            (false, None) => {
                return Err(plan_error(index, name, "traversal must start with V()"));
            }
            (false, Some(s)) => s,
        };

        let require = |ok: bool, what: &str| -> Result<()> {
            if ok {
                Ok(())
            } else {
                Err(plan_error(index, name, format!("{}() needs {}, got {}", name, what, current)))
            }
        };

        shape = Some(match step {
            Step::SelectAll | Step::SelectById { .. } => unreachable!("handled above"),
            Step::HasLabel { .. } | Step::HasProperty { .. } => {
                require(current.is_element(), "vertices or edges")?;
                current
            }
            Step::Out { .. } | Step::In { .. } | Step::Both { .. } => {
                require(current == ResultShape::Vertices, "vertices")?;
                ResultShape::Vertices
            }
            Step::OutEdges { .. } | Step::InEdges { .. } | Step::BothEdges { .. } => {
                require(current == ResultShape::Vertices, "vertices")?;
                ResultShape::Edges
            }
            Step::InVertices | Step::OutVertices => {
                require(current == ResultShape::Edges, "edges")?;
                ResultShape::Vertices
            }
            Step::ValuesOf { .. } => {
                require(current.is_element(), "vertices or edges")?;
                ResultShape::Values
            }
            Step::ValueMap { .. } => {
                require(current.is_element(), "vertices or edges")?;
                ResultShape::PropertyMaps
            }
            Step::Count => ResultShape::Count,
            Step::Deduplicate => current,
            Step::Order { key, .. } => {
                if key.is_none() {
                    return Err(plan_error(index, name, "order() requires a by() modulator"));
                }
                require(current.is_element(), "vertices or edges")?;
                current
            }
            Step::GroupCount { key } => {
                if key.is_none() {
                    return Err(plan_error(index, name, "groupCount() requires a by() modulator"));
                }
                require(current.is_element(), "vertices or edges")?;
                ResultShape::GroupCount
            }
            Step::Repeat { steps: body, times } => {
                if times.is_none() {
                    return Err(plan_error(index, name, "repeat() requires a times() modulator"));
                }
                if body.is_empty() {
                    return Err(plan_error(index, name, "repeat() body has no steps"));
                }
                let out = check_steps(body, Some(current), index)?;
                if out != current {
                    return Err(plan_error(
                        index,
                        name,
                        format!("repeat() body must produce {}, produces {}", current, out),
                    ));
                }
                current
            }
            Step::Mean => {
                require(current == ResultShape::Values, "property values")?;
                ResultShape::Mean
            }
        });
    }

    // Loop above always sets the shape for a non-empty sequence.
    shape.ok_or_else(|| plan_error(base, "V", "traversal has no steps"))
}

// ============================================================================
// Plan
// ============================================================================

/// Validated, immutable step sequence. Submitting the same plan twice is
/// safe; it holds no client state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalPlan {
    steps: Vec<Step>,
    #[serde(skip)]
    shape: Option<ResultShape>,
}

impl TraversalPlan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Declared shape of the results, from the terminal step. `None` only
    /// for plans that were received off the wire rather than built.
    pub fn result_shape(&self) -> Option<ResultShape> {
        self.shape
    }

    /// New plan with one more step, validated like `Traversal::build`
    pub(crate) fn extended(&self, step: Step) -> Result<TraversalPlan> {
        let mut steps = self.steps.clone();
        steps.push(step);
        Traversal { steps }.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::anonymous as __;
    use crate::structure::GraphValue;

    fn g() -> GraphTraversalSource {
        GraphTraversalSource
    }

    fn assert_plan_error(err: ClientError, index: usize, step: &str) {
        match err {
            ClientError::PlanConstruction { step_index, step: s, .. } => {
                assert_eq!(step_index, index);
                assert_eq!(s, step);
            }
            other => panic!("expected PlanConstruction, got {:?}", other),
        }
    }

    #[test]
    fn test_v_without_ids_selects_all() {
        assert_eq!(g().v(()).steps(), &[Step::SelectAll]);
        assert_eq!(
            g().v([1, 4]).steps(),
            &[Step::SelectById { ids: vec![ElementId::Int(1), ElementId::Int(4)] }]
        );
        assert_eq!(g().v("a").steps(), &[Step::SelectById { ids: vec![ElementId::Str("a".into())] }]);
    }

    #[test]
    fn test_steps_append_in_order() {
        let t = g().v(1).out("knows").values("name");
        assert_eq!(
            t.steps(),
            &[
                Step::SelectById { ids: vec![ElementId::Int(1)] },
                Step::Out { labels: vec!["knows".into()] },
                Step::ValuesOf { keys: vec!["name".into()] },
            ]
        );
    }

    #[test]
    fn test_builder_is_branchable() {
        let base = g().v(()).has_label("person");
        let names = base.clone().values("name");
        let count = base.clone().count();
        assert_eq!(base.steps().len(), 2);
        assert_eq!(names.steps().len(), 3);
        assert_eq!(count.steps().len(), 3);
    }

    #[test]
    fn test_has_literal_is_eq() {
        let t = g().v(()).has("name", "marko");
        assert_eq!(
            t.steps()[1],
            Step::HasProperty { key: "name".into(), predicate: P::Eq(GraphValue::from("marko")) }
        );
    }

    #[test]
    fn test_by_attaches_to_order() {
        let t = g().v(()).order().by(("age", Order::Desc)).unwrap();
        assert_eq!(t.steps()[1], Step::Order { key: Some("age".into()), order: Order::Desc });

        let t = g().v(()).order().by("name").unwrap();
        assert_eq!(t.steps()[1], Step::Order { key: Some("name".into()), order: Order::Asc });
    }

    #[test]
    fn test_by_attaches_to_group_count() {
        let t = g().v(()).group_count().by("name").unwrap();
        assert_eq!(t.steps()[1], Step::GroupCount { key: Some("name".into()) });
        assert_eq!(t.build().unwrap().result_shape(), Some(ResultShape::GroupCount));
    }

    #[test]
    fn test_by_without_preceding_step_fails() {
        let err = g().v(()).values("name").by("age").unwrap_err();
        assert_plan_error(err, 2, "by");

        let err = Traversal::anonymous().by("age").unwrap_err();
        assert_plan_error(err, 0, "by");
    }

    #[test]
    fn test_by_twice_fails() {
        let err = g().v(()).order().by("age").unwrap().by("name").unwrap_err();
        assert_plan_error(err, 2, "by");
    }

    #[test]
    fn test_group_count_by_rejects_order() {
        let err = g().v(()).group_count().by(("name", Order::Desc)).unwrap_err();
        assert_plan_error(err, 2, "by");
    }

    #[test]
    fn test_times_requires_repeat() {
        let err = g().v(()).out(()).times(3).unwrap_err();
        assert_plan_error(err, 2, "times");

        let t = g().v(()).repeat(__::both("knows")).times(5).unwrap();
        assert_eq!(
            t.steps()[1],
            Step::Repeat { steps: vec![Step::Both { labels: vec!["knows".into()] }], times: Some(5) }
        );
    }

    #[test]
    fn test_build_requires_modulators() {
        assert_plan_error(g().v(()).order().build().unwrap_err(), 1, "order");
        assert_plan_error(g().v(()).group_count().build().unwrap_err(), 1, "groupCount");
        assert_plan_error(g().v(()).repeat(__::out(())).build().unwrap_err(), 1, "repeat");
    }

    #[test]
    fn test_build_requires_source() {
        assert_plan_error(__::out("knows").build().unwrap_err(), 0, "out");
        assert_plan_error(Traversal::anonymous().build().unwrap_err(), 0, "V");
    }

    #[test]
    fn test_build_rejects_inner_source() {
        let t = Traversal { steps: vec![Step::SelectAll, Step::SelectAll] };
        assert_plan_error(t.build().unwrap_err(), 1, "V");
    }

    #[test]
    fn test_build_rejects_incompatible_steps() {
        // inV() needs edges
        assert_plan_error(g().v(()).in_v().build().unwrap_err(), 1, "inV");
        // out() after values()
        assert_plan_error(g().v(()).values("name").out(()).build().unwrap_err(), 2, "out");
        // mean() of vertices
        assert_plan_error(g().v(()).mean().build().unwrap_err(), 1, "mean");
    }

    #[test]
    fn test_repeat_body_must_preserve_shape() {
        let err = g().v(()).repeat(__::out_e(())).times(2).unwrap().build().unwrap_err();
        assert_plan_error(err, 1, "repeat");

        let ok = g().v(()).repeat(__::out_e(()).in_v()).times(2).unwrap().build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_result_shapes() {
        let shape = |t: Traversal| t.build().unwrap().result_shape().unwrap();

        assert_eq!(shape(g().v(())), ResultShape::Vertices);
        assert_eq!(shape(g().v(1).out_e("knows")), ResultShape::Edges);
        assert_eq!(shape(g().v(1).out_e("knows").in_v()), ResultShape::Vertices);
        assert_eq!(shape(g().v(1).values("name").dedup()), ResultShape::Values);
        assert_eq!(shape(g().v(1).value_map(true)), ResultShape::PropertyMaps);
        assert_eq!(shape(g().v(()).count()), ResultShape::Count);
        assert_eq!(shape(g().v(()).values("age").mean()), ResultShape::Mean);
        assert_eq!(shape(g().v(()).has("age", P::gt(30)).dedup()), ResultShape::Vertices);
    }

    #[test]
    fn test_extended_plan_is_validated() {
        let plan = g().v(()).build().unwrap();
        let with_map = plan.extended(Step::ValueMap { include_tokens: true }).unwrap();
        assert_eq!(with_map.len(), 2);
        assert_eq!(with_map.result_shape(), Some(ResultShape::PropertyMaps));
        // source plan untouched
        assert_eq!(plan.len(), 1);

        let counted = g().v(()).count().build().unwrap();
        assert!(counted.extended(Step::ValueMap { include_tokens: true }).is_err());
    }
}
