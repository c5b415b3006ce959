//! Node trait and context types.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::credentials::MintlifyCredentials;
use crate::error::Result;

/// Result of node execution.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Output data from the node
    pub data: Value,
    /// Metadata (timing, item counts, etc.)
    pub metadata: Value,
}

impl NodeResult {
    /// Create a result with data and metadata.
    pub fn with_metadata(data: Value, metadata: Value) -> Self {
        Self { data, metadata }
    }
}

/// Context passed to a node during execution.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Input data (from previous nodes or workflow input)
    pub input: Value,

    /// All node outputs so far (keyed by node ID)
    pub node_outputs: HashMap<String, Value>,

    /// Credentials available to this execution, keyed by name
    pub credentials: Arc<HashMap<String, MintlifyCredentials>>,

    /// Execution ID
    pub execution_id: String,

    /// Workflow name
    pub workflow_name: String,

    /// Current item index (for per-item processing)
    pub item_index: Option<usize>,
}

impl NodeContext {
    /// Create a new context.
    pub fn new(execution_id: &str, workflow_name: &str) -> Self {
        Self {
            input: Value::Null,
            node_outputs: HashMap::new(),
            credentials: Arc::new(HashMap::new()),
            execution_id: execution_id.to_string(),
            workflow_name: workflow_name.to_string(),
            item_index: None,
        }
    }

    /// Set the input data.
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Set the available credentials.
    pub fn with_credentials(mut self, credentials: HashMap<String, MintlifyCredentials>) -> Self {
        self.credentials = Arc::new(credentials);
        self
    }

    /// Add a node output.
    pub fn add_output(&mut self, node_id: &str, output: Value) {
        self.node_outputs.insert(node_id.to_string(), output);
    }

    /// Look up a credential by name.
    pub fn get_credential(&self, name: &str) -> Option<&MintlifyCredentials> {
        self.credentials.get(name)
    }

    /// Clone context for a specific item.
    pub fn for_item(&self, item: Value, index: usize) -> Self {
        Self {
            input: item,
            node_outputs: self.node_outputs.clone(),
            credentials: Arc::clone(&self.credentials),
            execution_id: self.execution_id.clone(),
            workflow_name: self.workflow_name.clone(),
            item_index: Some(index),
        }
    }
}

/// Trait that all node types must implement.
#[async_trait]
pub trait Node: Send + Sync {
    /// Get the node type name (e.g., "mintlify").
    fn node_type(&self) -> &str;

    /// Execute the node with the given configuration and context.
    ///
    /// # Arguments
    /// * `config` - Node-specific configuration from the workflow
    /// * `ctx` - Execution context with input data and previous outputs
    ///
    /// # Returns
    /// The node's output data wrapped in NodeResult
    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeResult>;

    /// Get a description of this node type.
    fn description(&self) -> &str {
        "A workflow node"
    }

    /// JSON schema of the node configuration, if the node publishes one.
    fn config_schema(&self) -> Option<Value> {
        None
    }
}
