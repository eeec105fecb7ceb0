//! Unqualified helpers for traversal call sites
//!
//! `use gremlin_client::statics::*;` brings the traversal source `g()`,
//! predicate constructors (`gt(30)` instead of `P::gt(30)`), the sort
//! directions and the anonymous steps used in `repeat()` into scope. Nothing
//! here holds state.

pub use crate::process::anonymous::{
    both, both_e, dedup, has, has_label, in_, in_e, in_v, out, out_e, out_v,
};
pub use crate::process::{Order, P};

use crate::process::GraphTraversalSource;
use crate::structure::GraphValue;

pub const ASC: Order = Order::Asc;
pub const DESC: Order = Order::Desc;

/// The traversal source
pub fn g() -> GraphTraversalSource {
    GraphTraversalSource
}

pub fn eq(value: impl Into<GraphValue>) -> P {
    P::eq(value)
}

pub fn neq(value: impl Into<GraphValue>) -> P {
    P::neq(value)
}

pub fn gt(value: impl Into<GraphValue>) -> P {
    P::gt(value)
}

pub fn gte(value: impl Into<GraphValue>) -> P {
    P::gte(value)
}

pub fn lt(value: impl Into<GraphValue>) -> P {
    P::lt(value)
}

pub fn lte(value: impl Into<GraphValue>) -> P {
    P::lte(value)
}

pub fn within<I, V>(values: I) -> P
where
    I: IntoIterator<Item = V>,
    V: Into<GraphValue>,
{
    P::within(values)
}

pub fn without<I, V>(values: I) -> P
where
    I: IntoIterator<Item = V>,
    V: Into<GraphValue>,
{
    P::without(values)
}

pub fn between(low: impl Into<GraphValue>, high: impl Into<GraphValue>) -> P {
    P::between(low, high)
}
