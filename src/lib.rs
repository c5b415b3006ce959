//! r8r-mintlify - Mintlify documentation agent node for r8r workflows
//!
//! Drives the Mintlify AI agent over its REST API: start documentation
//! jobs on a branch, poll job status, or issue any authenticated request
//! under the API base. Every input item produces exactly one output item.
//!
//! ## Key Features
//!
//! - **Three Operations**: `update_docs`, `get_job` and `custom_request`
//! - **Named Credentials**: API key and project id stored per credential name
//! - **Per-Item Templates**: `{{ input.field }}` rendered for each item
//! - **Classified Failures**: aborted streams, timeouts, API errors and the rest,
//!   either recorded per item (`continue_on_fail`) or raised with the item index
//!
//! ## Example
//!
//! ```yaml
//! nodes:
//!   - id: update-docs
//!     type: mintlify
//!     config:
//!       credential: mintlify
//!       operation: update_docs
//!       branch: "{{ input.branch }}"
//!       prompt: "Document the changes in {{ input.pr_title }}"
//!
//!   - id: job-status
//!     type: mintlify
//!     config:
//!       operation: get_job
//!       job_id: "{{ nodes.update-docs.output.0.job_id }}"
//!     depends_on: [update-docs]
//! ```

pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod nodes;
pub mod telemetry;

pub use error::{Error, Result};
