//! Process execution runtime
//!
//! Builds per-instance graphs from definitions and runs them: every
//! dispatched node's handler executes as its own task, and completion
//! signals drive the walk forward through successors and join barriers.

mod dispatcher;
mod engine;
mod graph;
mod handler;
mod instance;
mod node;
mod registry;

pub use engine::{Engine, RuntimeConfig};
pub use graph::{GraphBuilder, ProcessGraph, Vertex, VertexLinks};
pub use handler::{HandlerMetadata, NodeHandler};
pub use instance::{InstanceStatus, OutputPolicy, ProcessInstance};
pub use node::{NodeState, ProcessNode};
pub use registry::HandlerRegistry;
