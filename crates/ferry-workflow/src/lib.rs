//! Workflow conversion library for Ferry.
//!
//! Turns a visual node-graph document (nodes plus a link table, possibly with
//! named binder/reader indirection nodes) into the flat, execution-ready graph
//! consumed by the execution engine:
//! external bridge -> alias resolution -> flattening -> integrity check.
//!
//! Every conversion is a one-shot transform. Nothing is cached across calls
//! and no process-wide state is kept, so independent calls may run
//! concurrently.

pub mod alias;
pub mod bridge;
pub mod config;
pub mod environment;
pub mod errors;
pub mod flatten;
pub mod graph;
pub mod integrity;
pub mod links;
pub mod pipeline;
pub mod process;

pub use alias::*;
pub use bridge::*;
pub use config::*;
pub use environment::*;
pub use errors::*;
pub use flatten::*;
pub use graph::*;
pub use integrity::*;
pub use links::*;
pub use pipeline::*;
pub use process::*;
