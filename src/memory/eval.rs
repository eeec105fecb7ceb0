//! Plan evaluator for the in-memory graph
//!
//! Evaluates steps left to right over a stream of traversers. Each step
//! consumes the whole stream produced by the previous one, which keeps the
//! semantics obvious at the cost of laziness (fine for test-sized graphs).

use std::cmp::Ordering;
use std::collections::BTreeSet;

use thiserror::Error;

use super::MemoryGraph;
use crate::process::{Order, Step, P};
use crate::structure::{Edge, ElementId, GraphValue, Token, Vertex};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("The property does not exist as the key has no associated value for the provided element: {element}:{key}")]
    MissingProperty { element: String, key: String },

    #[error("mean() expects numeric values, got {0}")]
    NotNumeric(&'static str),

    #[error("{step}() cannot be applied to {kind}")]
    UnexpectedInput { step: &'static str, kind: &'static str },

    #[error("{0}() may only start a traversal")]
    MisplacedSource(&'static str),

    #[error("traversal must start with V(), found {0}()")]
    MissingSource(&'static str),

    #[error("{step}() is missing its {modulator}() modulator")]
    MissingModulator { step: &'static str, modulator: &'static str },

    #[error("Vertex not found: {0}")]
    UnknownVertex(ElementId),
}

impl EvalError {
    pub fn code(&self) -> &'static str {
        match self {
            EvalError::MissingProperty { .. } | EvalError::NotNumeric(_) => "EVALUATION_FAILED",
            EvalError::UnexpectedInput { .. }
            | EvalError::MisplacedSource(_)
            | EvalError::MissingSource(_)
            | EvalError::MissingModulator { .. } => "INVALID_PLAN",
            EvalError::UnknownVertex(_) => "NOT_FOUND",
        }
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Whether `value` satisfies `predicate`. Numbers compare across int/float;
/// values of incomparable kinds never satisfy an ordering predicate.
pub fn test_predicate(predicate: &P, value: &GraphValue) -> bool {
    let at_least = |bound: &GraphValue| matches!(value.partial_compare(bound), Some(Ordering::Greater | Ordering::Equal));
    let at_most = |bound: &GraphValue| matches!(value.partial_compare(bound), Some(Ordering::Less | Ordering::Equal));

    match predicate {
        P::Eq(v) => values_equal(value, v),
        P::Neq(v) => !values_equal(value, v),
        P::Gt(v) => value.partial_compare(v) == Some(Ordering::Greater),
        P::Gte(v) => at_least(v),
        P::Lt(v) => value.partial_compare(v) == Some(Ordering::Less),
        P::Lte(v) => at_most(v),
        P::Within(vs) => vs.iter().any(|v| values_equal(value, v)),
        P::Without(vs) => !vs.iter().any(|v| values_equal(value, v)),
        P::Between(low, high) => at_least(low) && value.partial_compare(high) == Some(Ordering::Less),
    }
}

fn values_equal(a: &GraphValue, b: &GraphValue) -> bool {
    match a.partial_compare(b) {
        Some(ord) => ord == Ordering::Equal,
        None => a == b,
    }
}

fn matches_label(labels: &[String], label: &str) -> bool {
    labels.is_empty() || labels.iter().any(|l| l == label)
}

#[derive(Clone, Copy)]
enum Direction {
    Out,
    In,
    Both,
}

/// Evaluates plans against one graph
pub struct Evaluator<'g> {
    graph: &'g MemoryGraph,
}

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g MemoryGraph) -> Self {
        Self { graph }
    }

    /// Evaluate a top-level step sequence
    pub fn run(&self, steps: &[Step]) -> EvalResult<Vec<GraphValue>> {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(Vec::new());
        };

        let stream = match first {
            Step::SelectAll => self.graph.vertices().cloned().map(GraphValue::Vertex).collect(),
            Step::SelectById { ids } => ids
                .iter()
                .filter_map(|id| self.graph.vertex(id))
                .cloned()
                .map(GraphValue::Vertex)
                .collect(),
            other => return Err(EvalError::MissingSource(other.name())),
        };

        self.apply_all(rest, stream)
    }

    fn apply_all(&self, steps: &[Step], mut stream: Vec<GraphValue>) -> EvalResult<Vec<GraphValue>> {
        for step in steps {
            stream = self.apply(step, stream)?;
        }
        Ok(stream)
    }

    fn apply(&self, step: &Step, input: Vec<GraphValue>) -> EvalResult<Vec<GraphValue>> {
        let name = step.name();
        match step {
            Step::SelectAll | Step::SelectById { .. } => Err(EvalError::MisplacedSource(name)),

            Step::HasLabel { labels } => {
                let mut out = Vec::new();
                for value in input {
                    if matches_label(labels, element_label(&value, name)?) {
                        out.push(value);
                    }
                }
                Ok(out)
            }

            Step::HasProperty { key, predicate } => {
                let mut out = Vec::new();
                for value in input {
                    let keep = element_values(&value, key, name)?
                        .iter()
                        .any(|v| test_predicate(predicate, v));
                    if keep {
                        out.push(value);
                    }
                }
                Ok(out)
            }

            Step::Out { labels } => self.adjacent_vertices(input, labels, Direction::Out, name),
            Step::In { labels } => self.adjacent_vertices(input, labels, Direction::In, name),
            Step::Both { labels } => self.adjacent_vertices(input, labels, Direction::Both, name),
            Step::OutEdges { labels } => self.incident_edges(input, labels, Direction::Out, name),
            Step::InEdges { labels } => self.incident_edges(input, labels, Direction::In, name),
            Step::BothEdges { labels } => self.incident_edges(input, labels, Direction::Both, name),

            Step::InVertices | Step::OutVertices => {
                let mut out = Vec::with_capacity(input.len());
                for value in input {
                    let edge = as_edge(&value, name)?;
                    let id = if matches!(step, Step::InVertices) { &edge.in_v } else { &edge.out_v };
                    let vertex = self.graph.vertex(id).ok_or_else(|| EvalError::UnknownVertex(id.clone()))?;
                    out.push(GraphValue::Vertex(vertex.clone()));
                }
                Ok(out)
            }

            Step::ValuesOf { keys } => {
                let mut out = Vec::new();
                for value in input {
                    match &value {
                        GraphValue::Vertex(v) => {
                            for (key, values) in &v.properties {
                                if keys.is_empty() || keys.contains(key) {
                                    out.extend(values.iter().cloned());
                                }
                            }
                        }
                        GraphValue::Edge(e) => {
                            for (key, v) in &e.properties {
                                if keys.is_empty() || keys.contains(key) {
                                    out.push(v.clone());
                                }
                            }
                        }
                        other => return Err(EvalError::UnexpectedInput { step: name, kind: other.kind() }),
                    }
                }
                Ok(out)
            }

            Step::ValueMap { include_tokens } => input
                .iter()
                .map(|value| value_map(value, *include_tokens, name))
                .collect(),

            Step::Count => Ok(vec![GraphValue::Int(input.len() as i64)]),

            Step::Deduplicate => {
                // elements are identified by id, everything else by value
                let mut seen_elements = BTreeSet::new();
                let mut seen_values: Vec<GraphValue> = Vec::new();
                let mut out = Vec::with_capacity(input.len());
                for value in input {
                    let first = match &value {
                        GraphValue::Vertex(v) => seen_elements.insert((false, v.id.clone())),
                        GraphValue::Edge(e) => seen_elements.insert((true, e.id.clone())),
                        other if seen_values.contains(other) => false,
                        other => {
                            seen_values.push(other.clone());
                            true
                        }
                    };
                    if first {
                        out.push(value);
                    }
                }
                Ok(out)
            }

            Step::Order { key, order } => {
                let key = key.as_deref().ok_or(EvalError::MissingModulator { step: name, modulator: "by" })?;
                let mut keyed = Vec::with_capacity(input.len());
                for value in input {
                    let sort_key = first_value(&value, key, name)?.clone();
                    keyed.push((sort_key, value));
                }
                // sort_by is stable
                keyed.sort_by(|(a, _), (b, _)| match order {
                    Order::Asc => a.total_compare(b),
                    Order::Desc => b.total_compare(a),
                });
                Ok(keyed.into_iter().map(|(_, value)| value).collect())
            }

            Step::Repeat { steps, times } => {
                let times = times.ok_or(EvalError::MissingModulator { step: name, modulator: "times" })?;
                let mut stream = input;
                for _ in 0..times {
                    stream = self.apply_all(steps, stream)?;
                }
                Ok(stream)
            }

            Step::GroupCount { key } => {
                let key = key.as_deref().ok_or(EvalError::MissingModulator { step: name, modulator: "by" })?;
                let mut groups: Vec<(GraphValue, i64)> = Vec::new();
                for value in &input {
                    let group = first_value(value, key, name)?;
                    match groups.iter_mut().find(|(g, _)| g == group) {
                        Some((_, n)) => *n += 1,
                        None => groups.push((group.clone(), 1)),
                    }
                }
                let map = groups.into_iter().map(|(g, n)| (g, GraphValue::Int(n))).collect();
                Ok(vec![GraphValue::Map(map)])
            }

            Step::Mean => {
                if input.is_empty() {
                    return Ok(Vec::new());
                }
                let mut sum = 0.0;
                for value in &input {
                    sum += value.as_f64().ok_or(EvalError::NotNumeric(value.kind()))?;
                }
                Ok(vec![GraphValue::Float(sum / input.len() as f64)])
            }
        }
    }

    fn adjacent_vertices(
        &self,
        input: Vec<GraphValue>,
        labels: &[String],
        direction: Direction,
        step: &'static str,
    ) -> EvalResult<Vec<GraphValue>> {
        let mut out = Vec::new();
        for value in &input {
            let vertex = as_vertex(value, step)?;
            for id in self.neighbor_ids(&vertex.id, labels, direction) {
                let neighbor = self.graph.vertex(id).ok_or_else(|| EvalError::UnknownVertex(id.clone()))?;
                out.push(GraphValue::Vertex(neighbor.clone()));
            }
        }
        Ok(out)
    }

    fn incident_edges(
        &self,
        input: Vec<GraphValue>,
        labels: &[String],
        direction: Direction,
        step: &'static str,
    ) -> EvalResult<Vec<GraphValue>> {
        let mut out = Vec::new();
        for value in &input {
            let vertex = as_vertex(value, step)?;
            for edge in self.edges_of(&vertex.id, labels, direction) {
                out.push(GraphValue::Edge(edge.clone()));
            }
        }
        Ok(out)
    }

    /// Edges touching `id` in edge-id order; outgoing before incoming for `Both`
    fn edges_of<'a>(&'a self, id: &'a ElementId, labels: &'a [String], direction: Direction) -> Vec<&'a Edge> {
        let labelled = move |e: &&'a Edge| matches_label(labels, &e.label);
        let outgoing = self.graph.edges().filter(move |e| &e.out_v == id).filter(labelled);
        let incoming = self.graph.edges().filter(move |e| &e.in_v == id).filter(labelled);
        match direction {
            Direction::Out => outgoing.collect(),
            Direction::In => incoming.collect(),
            Direction::Both => outgoing.chain(incoming).collect(),
        }
    }

    fn neighbor_ids<'a>(&'a self, id: &'a ElementId, labels: &'a [String], direction: Direction) -> Vec<&'a ElementId> {
        self.edges_of(id, labels, direction)
            .into_iter()
            .map(|edge| match direction {
                Direction::Out => &edge.in_v,
                Direction::In => &edge.out_v,
                // a self-loop leads back to `id` either way
                Direction::Both if &edge.out_v == id => &edge.in_v,
                Direction::Both => &edge.out_v,
            })
            .collect()
    }
}

fn as_vertex<'v>(value: &'v GraphValue, step: &'static str) -> EvalResult<&'v Vertex> {
    match value {
        GraphValue::Vertex(v) => Ok(v),
        other => Err(EvalError::UnexpectedInput { step, kind: other.kind() }),
    }
}

fn as_edge<'v>(value: &'v GraphValue, step: &'static str) -> EvalResult<&'v Edge> {
    match value {
        GraphValue::Edge(e) => Ok(e),
        other => Err(EvalError::UnexpectedInput { step, kind: other.kind() }),
    }
}

fn element_label<'v>(value: &'v GraphValue, step: &'static str) -> EvalResult<&'v str> {
    match value {
        GraphValue::Vertex(v) => Ok(&v.label),
        GraphValue::Edge(e) => Ok(&e.label),
        other => Err(EvalError::UnexpectedInput { step, kind: other.kind() }),
    }
}

/// All values of `key` on an element; empty when the element lacks it
fn element_values<'v>(value: &'v GraphValue, key: &str, step: &'static str) -> EvalResult<&'v [GraphValue]> {
    match value {
        GraphValue::Vertex(v) => Ok(v.values(key)),
        GraphValue::Edge(e) => Ok(e.property(key).map(std::slice::from_ref).unwrap_or(&[])),
        other => Err(EvalError::UnexpectedInput { step, kind: other.kind() }),
    }
}

/// First value of `key`; missing keys are an evaluation failure
fn first_value<'v>(value: &'v GraphValue, key: &str, step: &'static str) -> EvalResult<&'v GraphValue> {
    element_values(value, key, step)?
        .first()
        .ok_or_else(|| EvalError::MissingProperty { element: value.to_string(), key: key.to_string() })
}

fn value_map(value: &GraphValue, include_tokens: bool, step: &'static str) -> EvalResult<GraphValue> {
    let tokens = |id: &ElementId, label: &str| {
        if include_tokens {
            vec![
                (GraphValue::Token(Token::Id), GraphValue::from(id.clone())),
                (GraphValue::Token(Token::Label), GraphValue::from(label)),
            ]
        } else {
            Vec::new()
        }
    };

    let mut entries;
    match value {
        GraphValue::Vertex(v) => {
            entries = tokens(&v.id, &v.label);
            for (key, values) in &v.properties {
                entries.push((GraphValue::from(key.as_str()), GraphValue::List(values.clone())));
            }
        }
        GraphValue::Edge(e) => {
            entries = tokens(&e.id, &e.label);
            for (key, v) in &e.properties {
                entries.push((GraphValue::from(key.as_str()), v.clone()));
            }
        }
        other => return Err(EvalError::UnexpectedInput { step, kind: other.kind() }),
    }
    Ok(GraphValue::Map(entries))
}
