//! gremlin-client - blocking client for remote graph-traversal servers
//!
//! Build a [`Traversal`] without touching the network, then run it through
//! a [`Connection`] with a terminal operation (`to_list`, `next`,
//! `vertex_snapshots`). Malformed step sequences are rejected while the
//! traversal is built, before any request goes out.
//!
//! ```no_run
//! use gremlin_client::statics::*;
//! use gremlin_client::{Connection, Vertex};
//!
//! let mut conn = Connection::open("ws://localhost:8182/gremlin", "g")?;
//! let friends: Vec<String> = g().v(1).out("knows").values("name").to_list(&mut conn)?;
//! let people: Vec<Vertex> = g().v(()).has_label("person").vertex_snapshots(&mut conn)?;
//! conn.close();
//! # Ok::<(), gremlin_client::ClientError>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod materialize;
pub mod memory;
pub mod process;
pub mod protocol;
pub mod statics;
pub mod structure;
pub mod transport;

pub use config::{ConnectionConfig, Endpoint};
pub use connection::{Connection, RawResponse, ServerInfo, Submission, SubmissionState};
pub use error::{ClientError, Result};
pub use materialize::{FromGraphValue, GroupCounts, Materializer, PropertyMap};
pub use memory::MemoryGraph;
pub use process::anonymous as __;
pub use process::{GraphTraversalSource, Order, ResultShape, Step, Traversal, TraversalPlan, P};
pub use structure::{Edge, ElementId, GraphValue, Token, Vertex};
