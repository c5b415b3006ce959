//! Node implementations.
//!
//! Nodes are the building blocks of workflows. The Mintlify node drives the
//! documentation agent; the template module renders `{{ ... }}` parameters
//! per input item before the node sees them.

mod mintlify;
mod registry;
pub mod template;
mod types;

pub use mintlify::{
    build_request, failure_error, failure_record, substitute_project_id, FailureKind,
    MintlifyNode, MintlifyNodeConfig, Operation, QueryParameter, RunSettings,
};
pub use registry::NodeRegistry;
pub use types::{Node, NodeContext, NodeResult};
