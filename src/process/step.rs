//! Traversal steps, predicates and result shapes
//!
//! A step is one atomic operation of a plan. Steps are plain data: they are
//! serialized into the request and evaluated by the server.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::structure::{ElementId, GraphValue};

// ============================================================================
// Steps
// ============================================================================

/// One traversal operation. Each step consumes the output of the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum Step {
    /// `V()`
    SelectAll,
    /// `V(ids...)`
    SelectById { ids: Vec<ElementId> },
    HasLabel { labels: Vec<String> },
    HasProperty { key: String, predicate: P },
    Out { labels: Vec<String> },
    In { labels: Vec<String> },
    Both { labels: Vec<String> },
    OutEdges { labels: Vec<String> },
    InEdges { labels: Vec<String> },
    BothEdges { labels: Vec<String> },
    InVertices,
    OutVertices,
    /// Property values; all keys when `keys` is empty
    ValuesOf { keys: Vec<String> },
    ValueMap {
        #[serde(rename = "includeTokens")]
        include_tokens: bool,
    },
    Count,
    Deduplicate,
    /// `key` is filled in by the `by()` modulator
    Order { key: Option<String>, order: Order },
    /// `times` is filled in by the `times()` modulator
    Repeat { steps: Vec<Step>, times: Option<u32> },
    /// `key` is filled in by the `by()` modulator
    GroupCount { key: Option<String> },
    Mean,
}

impl Step {
    /// Gremlin name of the step, used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Step::SelectAll | Step::SelectById { .. } => "V",
            Step::HasLabel { .. } => "hasLabel",
            Step::HasProperty { .. } => "has",
            Step::Out { .. } => "out",
            Step::In { .. } => "in",
            Step::Both { .. } => "both",
            Step::OutEdges { .. } => "outE",
            Step::InEdges { .. } => "inE",
            Step::BothEdges { .. } => "bothE",
            Step::InVertices => "inV",
            Step::OutVertices => "outV",
            Step::ValuesOf { .. } => "values",
            Step::ValueMap { .. } => "valueMap",
            Step::Count => "count",
            Step::Deduplicate => "dedup",
            Step::Order { .. } => "order",
            Step::Repeat { .. } => "repeat",
            Step::GroupCount { .. } => "groupCount",
            Step::Mean => "mean",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Step::SelectAll | Step::SelectById { .. })
    }
}

// ============================================================================
// Predicates
// ============================================================================

/// Comparison predicate for `has(key, predicate)`. Evaluated by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum P {
    Eq(GraphValue),
    Neq(GraphValue),
    Gt(GraphValue),
    Gte(GraphValue),
    Lt(GraphValue),
    Lte(GraphValue),
    Within(Vec<GraphValue>),
    Without(Vec<GraphValue>),
    /// Lower bound inclusive, upper bound exclusive
    Between(GraphValue, GraphValue),
}

impl P {
    pub fn eq(value: impl Into<GraphValue>) -> Self {
        P::Eq(value.into())
    }

    pub fn neq(value: impl Into<GraphValue>) -> Self {
        P::Neq(value.into())
    }

    pub fn gt(value: impl Into<GraphValue>) -> Self {
        P::Gt(value.into())
    }

    pub fn gte(value: impl Into<GraphValue>) -> Self {
        P::Gte(value.into())
    }

    pub fn lt(value: impl Into<GraphValue>) -> Self {
        P::Lt(value.into())
    }

    pub fn lte(value: impl Into<GraphValue>) -> Self {
        P::Lte(value.into())
    }

    pub fn within<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<GraphValue>,
    {
        P::Within(values.into_iter().map(Into::into).collect())
    }

    pub fn without<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<GraphValue>,
    {
        P::Without(values.into_iter().map(Into::into).collect())
    }

    pub fn between(low: impl Into<GraphValue>, high: impl Into<GraphValue>) -> Self {
        P::Between(low.into(), high.into())
    }
}

// `has(key, literal)` is sugar for `has(key, P::Eq(literal))`
macro_rules! eq_predicate_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for P {
                fn from(v: $t) -> Self {
                    P::Eq(v.into())
                }
            }
        )*
    };
}

eq_predicate_from!(bool, i32, i64, u32, f64, &str, String, GraphValue);

// ============================================================================
// Ordering
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

// ============================================================================
// Result shapes
// ============================================================================

/// What a plan's results look like, derived from its terminal step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    Vertices,
    Edges,
    /// Property values (scalars)
    Values,
    /// `valueMap()` maps
    PropertyMaps,
    /// A single non-negative integer
    Count,
    /// A single number
    Mean,
    /// A single map from group key to count
    GroupCount,
}

impl ResultShape {
    /// Whether a decoded value is acceptable for this shape
    pub fn admits(&self, value: &GraphValue) -> bool {
        match self {
            ResultShape::Vertices => matches!(value, GraphValue::Vertex(_)),
            ResultShape::Edges => matches!(value, GraphValue::Edge(_)),
            ResultShape::Values => !matches!(
                value,
                GraphValue::Vertex(_) | GraphValue::Edge(_) | GraphValue::Map(_) | GraphValue::Token(_)
            ),
            ResultShape::PropertyMaps | ResultShape::GroupCount => matches!(value, GraphValue::Map(_)),
            ResultShape::Count => matches!(value, GraphValue::Int(n) if *n >= 0),
            ResultShape::Mean => matches!(value, GraphValue::Int(_) | GraphValue::Float(_)),
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, ResultShape::Vertices | ResultShape::Edges)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultShape::Vertices => "vertices",
            ResultShape::Edges => "edges",
            ResultShape::Values => "values",
            ResultShape::PropertyMaps => "property maps",
            ResultShape::Count => "count",
            ResultShape::Mean => "mean",
            ResultShape::GroupCount => "group count",
        }
    }
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::Vertex;

    #[test]
    fn test_literal_is_equality_predicate() {
        assert_eq!(P::from("marko"), P::Eq(GraphValue::from("marko")));
        assert_eq!(P::from(29), P::Eq(GraphValue::Int(29)));
        assert_eq!(P::within(["java", "rust"]), P::Within(vec!["java".into(), "rust".into()]));
    }

    #[test]
    fn test_shape_admits() {
        let vertex = GraphValue::Vertex(Vertex::new(1, "person"));
        assert!(ResultShape::Vertices.admits(&vertex));
        assert!(!ResultShape::Values.admits(&vertex));
        assert!(ResultShape::Count.admits(&GraphValue::Int(0)));
        assert!(!ResultShape::Count.admits(&GraphValue::Int(-1)));
        assert!(!ResultShape::Count.admits(&GraphValue::Float(1.0)));
        assert!(ResultShape::Mean.admits(&GraphValue::Float(29.5)));
        assert!(ResultShape::GroupCount.admits(&GraphValue::Map(vec![])));
    }

    #[test]
    fn test_step_wire_tag() {
        let step = Step::ValueMap { include_tokens: true };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["step"], "valueMap");
        assert_eq!(json["includeTokens"], true);

        let step = Step::Order { key: Some("age".into()), order: Order::Desc };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["order"], "desc");
    }
}
