//! Graph structure as seen by the client
//!
//! Vertices and edges only ever arrive as decoded results of a submitted
//! traversal. They are immutable snapshots: there are no methods that write
//! back to the server.
//!
//! # Wire representation
//!
//! Values are adjacently tagged (`{"@type": "vertex", "@value": {...}}`) so
//! that vertices, maps and scalars can share one result list without
//! ambiguity.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Server-assigned element identifier
///
/// Opaque to the client. Servers in the wild use either integers or strings,
/// so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    Int(i64),
    Str(String),
}

impl ElementId {
    /// Extract an id from a result value (integers and strings only)
    pub fn from_value(value: &GraphValue) -> Option<Self> {
        match value {
            GraphValue::Int(i) => Some(ElementId::Int(*i)),
            GraphValue::String(s) => Some(ElementId::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Int(i) => write!(f, "{}", i),
            ElementId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i32> for ElementId {
    fn from(v: i32) -> Self {
        ElementId::Int(v as i64)
    }
}

impl From<i64> for ElementId {
    fn from(v: i64) -> Self {
        ElementId::Int(v)
    }
}

impl From<u32> for ElementId {
    fn from(v: u32) -> Self {
        ElementId::Int(v as i64)
    }
}

impl From<&str> for ElementId {
    fn from(v: &str) -> Self {
        ElementId::Str(v.to_string())
    }
}

impl From<String> for ElementId {
    fn from(v: String) -> Self {
        ElementId::Str(v)
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// Structural keys that `valueMap(true)` puts next to the property keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Token {
    Id,
    Label,
}

// ============================================================================
// Elements
// ============================================================================

/// Vertex snapshot. A key may hold several values (multi-properties).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: ElementId,
    pub label: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<GraphValue>>,
}

impl Vertex {
    pub fn new(id: impl Into<ElementId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a value under `key`, keeping any values already there
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        self.properties.entry(key.into()).or_default().push(value.into());
        self
    }

    /// First value stored under `key`
    pub fn property(&self, key: &str) -> Option<&GraphValue> {
        self.properties.get(key).and_then(|values| values.first())
    }

    /// All values stored under `key` (empty if absent)
    pub fn values(&self, key: &str) -> &[GraphValue] {
        self.properties.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v[{}]", self.id)
    }
}

/// Directed edge snapshot: `out_v -[label]-> in_v`, single-valued properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: ElementId,
    pub label: String,
    pub out_v: ElementId,
    pub in_v: ElementId,
    #[serde(default)]
    pub properties: BTreeMap<String, GraphValue>,
}

impl Edge {
    pub fn new(
        id: impl Into<ElementId>,
        label: impl Into<String>,
        out_v: impl Into<ElementId>,
        in_v: impl Into<ElementId>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            out_v: out_v.into(),
            in_v: in_v.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<GraphValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&GraphValue> {
        self.properties.get(key)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e[{}][{}-{}->{}]", self.id, self.out_v, self.label, self.in_v)
    }
}

// ============================================================================
// Values
// ============================================================================

/// A single decoded result token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", content = "@value", rename_all = "camelCase")]
pub enum GraphValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<GraphValue>),
    /// Ordered key/value pairs; keys are arbitrary values (group keys, tokens)
    Map(Vec<(GraphValue, GraphValue)>),
    Token(Token),
    Vertex(Vertex),
    Edge(Edge),
}

impl GraphValue {
    /// Short name of the variant, used in decode errors
    pub fn kind(&self) -> &'static str {
        match self {
            GraphValue::Null => "null",
            GraphValue::Bool(_) => "bool",
            GraphValue::Int(_) => "int",
            GraphValue::Float(_) => "float",
            GraphValue::String(_) => "string",
            GraphValue::List(_) => "list",
            GraphValue::Map(_) => "map",
            GraphValue::Token(_) => "token",
            GraphValue::Vertex(_) => "vertex",
            GraphValue::Edge(_) => "edge",
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, GraphValue::Vertex(_) | GraphValue::Edge(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GraphValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of ints and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            GraphValue::Int(i) => Some(*i as f64),
            GraphValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            GraphValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vertex(&self) -> Option<&Vertex> {
        match self {
            GraphValue::Vertex(v) => Some(v),
            _ => None,
        }
    }

    /// Comparison between values of the same kind (numbers compare across
    /// int/float). `None` when the values are not comparable.
    pub fn partial_compare(&self, other: &GraphValue) -> Option<Ordering> {
        match (self, other) {
            (GraphValue::Int(a), GraphValue::Int(b)) => Some(a.cmp(b)),
            (GraphValue::String(a), GraphValue::String(b)) => Some(a.cmp(b)),
            (GraphValue::Bool(a), GraphValue::Bool(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Total order used for sorting mixed result sets: values group by kind,
    /// then compare within their kind.
    pub fn total_compare(&self, other: &GraphValue) -> Ordering {
        if let Some(ord) = self.partial_compare(other) {
            return ord;
        }
        match (self.as_f64(), other.as_f64()) {
            // NaN against a number
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            GraphValue::Null => 0,
            GraphValue::Bool(_) => 1,
            GraphValue::Int(_) | GraphValue::Float(_) => 2,
            GraphValue::String(_) => 3,
            GraphValue::Token(_) => 4,
            GraphValue::List(_) => 5,
            GraphValue::Map(_) => 6,
            GraphValue::Vertex(_) => 7,
            GraphValue::Edge(_) => 8,
        }
    }
}

impl fmt::Display for GraphValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphValue::Null => f.write_str("null"),
            GraphValue::Bool(b) => write!(f, "{}", b),
            GraphValue::Int(i) => write!(f, "{}", i),
            GraphValue::Float(x) => write!(f, "{}", x),
            GraphValue::String(s) => f.write_str(s),
            GraphValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            GraphValue::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            GraphValue::Token(Token::Id) => f.write_str("T.id"),
            GraphValue::Token(Token::Label) => f.write_str("T.label"),
            GraphValue::Vertex(v) => write!(f, "{}", v),
            GraphValue::Edge(e) => write!(f, "{}", e),
        }
    }
}

impl From<bool> for GraphValue {
    fn from(v: bool) -> Self {
        GraphValue::Bool(v)
    }
}

impl From<i32> for GraphValue {
    fn from(v: i32) -> Self {
        GraphValue::Int(v as i64)
    }
}

impl From<i64> for GraphValue {
    fn from(v: i64) -> Self {
        GraphValue::Int(v)
    }
}

impl From<u32> for GraphValue {
    fn from(v: u32) -> Self {
        GraphValue::Int(v as i64)
    }
}

impl From<f64> for GraphValue {
    fn from(v: f64) -> Self {
        GraphValue::Float(v)
    }
}

impl From<&str> for GraphValue {
    fn from(v: &str) -> Self {
        GraphValue::String(v.to_string())
    }
}

impl From<String> for GraphValue {
    fn from(v: String) -> Self {
        GraphValue::String(v)
    }
}

impl From<ElementId> for GraphValue {
    fn from(id: ElementId) -> Self {
        match id {
            ElementId::Int(i) => GraphValue::Int(i),
            ElementId::Str(s) => GraphValue::String(s),
        }
    }
}

impl From<Vertex> for GraphValue {
    fn from(v: Vertex) -> Self {
        GraphValue::Vertex(v)
    }
}

impl From<Edge> for GraphValue {
    fn from(e: Edge) -> Self {
        GraphValue::Edge(e)
    }
}
