//! Getting-started tour of the client
//!
//! Runs the tutorial queries against the in-memory "modern" graph, or
//! against a live server when an endpoint is given:
//!
//!   cargo run --example tutorial
//!   cargo run --example tutorial -- ws://localhost:8182/gremlin
//!
//! Set RUST_LOG=gremlin_client=debug to see the requests go out.

use std::sync::Arc;

use anyhow::Context;
use gremlin_client::statics::*;
use gremlin_client::{Connection, GroupCounts, MemoryGraph, PropertyMap, Vertex};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("gremlin_client=info".parse()?),
        )
        .init();

    let mut conn = match std::env::args().nth(1) {
        Some(endpoint) => {
            Connection::open(&endpoint, "g").with_context(|| format!("connecting to {}", endpoint))?
        }
        None => Arc::new(MemoryGraph::modern()).connect()?,
    };

    let count: u64 = g().v(()).count().next(&mut conn)?;
    println!("Number of vertices in the graph: {}", count);

    // Full property maps come back with the vertices, in one request
    println!("\nAll vertices and their properties");
    for vertex in g().v(()).vertex_snapshots(&mut conn)? {
        println!("V[id, label]: {}, {}", vertex.id, vertex.label);
        for (key, values) in &vertex.properties {
            println!("\t{}: {:?}", key, values);
        }
    }

    println!("\nAll values of vertex 1");
    let marko: PropertyMap = g().v(1).value_map(true).next(&mut conn)?;
    println!("{:?}", marko);

    println!("\nHow many people does marko know?");
    let known: u64 = g().v(()).has("name", "marko").out("knows").count().next(&mut conn)?;
    println!("{}", known);

    println!("\nNames of the people marko knows, via knows edges");
    let names: Vec<String> = g().v(1).out_e("knows").in_v().values("name").to_list(&mut conn)?;
    println!("{:?}", names);

    println!("\nSame, stepping straight to the adjacent vertices");
    let names: Vec<String> = g().v(1).out("knows").values("name").to_list(&mut conn)?;
    println!("{:?}", names);

    println!("\nWho does marko know that is older than 30?");
    let names: Vec<String> = g().v(1).out("knows").has("age", gt(30)).values("name").to_list(&mut conn)?;
    println!("{:?}", names);

    println!("\nPeople older than 30, oldest first");
    let names: Vec<String> = g()
        .v(())
        .has_label("person")
        .has("age", gt(30))
        .order()
        .by(("age", DESC))?
        .values("name")
        .to_list(&mut conn)?;
    println!("{:?}", names);

    println!("\nAverage age of the friends of the people who created lop");
    let mean: f64 = g()
        .v(())
        .has("name", "lop")
        .in_("created")
        .out("knows")
        .dedup()
        .values("age")
        .mean()
        .next(&mut conn)?;
    println!("{}", mean);

    println!("\nPeople ranked by centrality in the knows-subgraph");
    let ranks: GroupCounts = g()
        .v(())
        .has_label("person")
        .repeat(both("knows"))
        .times(5)?
        .group_count()
        .by("name")?
        .next(&mut conn)?;
    for (name, n) in &ranks.0 {
        println!("\t{}: {}", name, n);
    }

    println!("\nSoftware, as plain vertices");
    let software: Vec<Vertex> = g().v(()).has_label("software").to_list(&mut conn)?;
    for v in &software {
        println!("\t{} {}", v, v.property("name").map(|n| n.to_string()).unwrap_or_default());
    }

    conn.close();
    Ok(())
}
