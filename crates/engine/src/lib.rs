//! `engine` crate — task-graph definitions, compilation/validation, the task
//! engine walk, and the execution-log model.

pub mod error;
pub mod executor;
pub mod fragments;
pub mod graph;
pub mod log;
pub mod models;

pub use error::GraphError;
pub use executor::{TaskEngine, TaskResult, TaskStatus};
pub use fragments::{FragmentTask, FragmentsEngine};
pub use graph::{Graph, Node, NodeId, NodeKind};
pub use log::{ExecutionLog, NodeRecord, NodeStatus};
pub use models::{
    BreakerDefinition, CombinationPolicy, NodeDefinition, NodeKindDefinition, TaskDefinition,
};
