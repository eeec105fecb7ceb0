//! Result materializer: submit a plan and decode the raw results
//!
//! Every returned value is checked against the shape the plan declared at
//! build time before it is converted into the caller's type. Results are
//! fully materialized and keep the order the server returned them in.

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::process::{ResultShape, Step, TraversalPlan};
use crate::structure::{Edge, ElementId, GraphValue, Token, Vertex};

// ============================================================================
// Decoding
// ============================================================================

/// Conversion from a decoded wire value into a caller-facing type
pub trait FromGraphValue: Sized {
    /// `None` when the value has the wrong kind for `Self`
    fn from_graph_value(value: GraphValue) -> Option<Self>;
}

impl FromGraphValue for GraphValue {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        Some(value)
    }
}

impl FromGraphValue for Vertex {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        match value {
            GraphValue::Vertex(v) => Some(v),
            _ => None,
        }
    }
}

impl FromGraphValue for Edge {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        match value {
            GraphValue::Edge(e) => Some(e),
            _ => None,
        }
    }
}

impl FromGraphValue for String {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        match value {
            GraphValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FromGraphValue for i64 {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromGraphValue for u64 {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        value.as_i64().and_then(|i| u64::try_from(i).ok())
    }
}

impl FromGraphValue for f64 {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromGraphValue for bool {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        match value {
            GraphValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

/// One `valueMap()` result. `id` and `label` are only present when the map
/// was requested with tokens.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyMap {
    pub id: Option<ElementId>,
    pub label: Option<String>,
    pub properties: Vec<(String, Vec<GraphValue>)>,
}

impl PropertyMap {
    pub fn get(&self, key: &str) -> Option<&[GraphValue]> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    /// Vertex snapshot; needs the id and label tokens
    pub fn into_vertex(self) -> Option<Vertex> {
        let mut vertex = Vertex::new(self.id?, self.label?);
        for (key, values) in self.properties {
            vertex.properties.insert(key, values);
        }
        Some(vertex)
    }
}

impl FromGraphValue for PropertyMap {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        let GraphValue::Map(entries) = value else {
            return None;
        };

        let mut map = PropertyMap::default();
        for (key, value) in entries {
            match key {
                GraphValue::Token(Token::Id) => map.id = Some(ElementId::from_value(&value)?),
                GraphValue::Token(Token::Label) => map.label = Some(String::from_graph_value(value)?),
                GraphValue::String(key) => {
                    let values = match value {
                        GraphValue::List(values) => values,
                        single => vec![single],
                    };
                    map.properties.push((key, values));
                }
                _ => return None,
            }
        }
        Some(map)
    }
}

/// `groupCount()` result: group key to number of traversers, in the order
/// the server produced them
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupCounts(pub Vec<(GraphValue, u64)>);

impl GroupCounts {
    pub fn get(&self, key: &GraphValue) -> Option<u64> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, n)| *n)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|(_, n)| n).sum()
    }
}

impl FromGraphValue for GroupCounts {
    fn from_graph_value(value: GraphValue) -> Option<Self> {
        let GraphValue::Map(entries) = value else {
            return None;
        };
        entries
            .into_iter()
            .map(|(key, count)| Some((key, u64::from_graph_value(count)?)))
            .collect::<Option<Vec<_>>>()
            .map(GroupCounts)
    }
}

/// Last path segment of a type name: `alloc::string::String` -> `String`
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

fn decode_one<T: FromGraphValue>(shape: Option<ResultShape>, value: GraphValue, index: usize) -> Result<T> {
    let actual = value.kind();
    let mismatch = |expected: ResultShape| ClientError::Decode {
        expected,
        target: short_type_name::<T>(),
        actual: actual.to_string(),
        index,
    };

    match shape {
        Some(expected) if !expected.admits(&value) => Err(mismatch(expected)),
        Some(expected) => T::from_graph_value(value).ok_or_else(|| mismatch(expected)),
        // Plan without a declared shape: only the target type decides
        None => T::from_graph_value(value).ok_or_else(|| mismatch(ResultShape::Values)),
    }
}

// ============================================================================
// Materializer
// ============================================================================

/// Bridges a plan to decoded values through a borrowed connection
pub struct Materializer<'c> {
    conn: &'c mut Connection,
}

impl<'c> Materializer<'c> {
    pub fn new(conn: &'c mut Connection) -> Self {
        Self { conn }
    }

    /// Every result, decoded, in server order
    pub fn to_list<T: FromGraphValue>(&mut self, plan: &TraversalPlan) -> Result<Vec<T>> {
        let shape = plan.result_shape();
        let raw = self.conn.submit(plan)?;
        raw.results
            .into_iter()
            .enumerate()
            .map(|(index, value)| decode_one(shape, value, index))
            .collect()
    }

    /// First result; `EmptyResult` when there is none
    pub fn next<T: FromGraphValue>(&mut self, plan: &TraversalPlan) -> Result<T> {
        let raw = self.conn.submit(plan)?;
        let first = raw.results.into_iter().next().ok_or(ClientError::EmptyResult)?;
        decode_one(plan.result_shape(), first, 0)
    }

    /// Vertices with every property, fetched with the selection itself
    /// (`valueMap(true)` appended) rather than one request per vertex
    pub fn vertex_snapshots(&mut self, plan: &TraversalPlan) -> Result<Vec<Vertex>> {
        if plan.result_shape() != Some(ResultShape::Vertices) {
            return Err(ClientError::PlanConstruction {
                step_index: plan.len(),
                step: "valueMap",
                message: "vertex snapshots need a traversal that ends on vertices".to_string(),
            });
        }

        let with_maps = plan.extended(Step::ValueMap { include_tokens: true })?;
        let maps: Vec<PropertyMap> = self.to_list(&with_maps)?;
        maps.into_iter()
            .enumerate()
            .map(|(index, map)| {
                map.into_vertex().ok_or_else(|| ClientError::Decode {
                    expected: ResultShape::PropertyMaps,
                    target: "Vertex",
                    actual: "map without id/label tokens".to_string(),
                    index,
                })
            })
            .collect()
    }
}
