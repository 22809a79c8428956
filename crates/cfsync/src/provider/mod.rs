//! Provider gateway
//!
//! [StackProvider] is the minimal contract the orchestrator needs from the cloud provider's stack
//! service. Implementations wrap the SDK and translate its failures into [ProviderError]s with the
//! matching [ProviderErrorKind](crate::error::ProviderErrorKind).
mod retry;
pub mod status;

pub use retry::{RetryPolicy, Retrying};

use crate::error::ProviderError;
use crate::stack::Stack;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Resource type of events that describe the stack itself
pub const STACK_RESOURCE_TYPE: &str = "AWS::CloudFormation::Stack";

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// stack name -> output key -> output value
pub type OutputsSnapshot = HashMap<String, HashMap<String, String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct StackEvent {
    pub event_id: String,
    pub stack_name: String,
    pub logical_resource_id: String,
    pub resource_type: String,
    pub resource_status: String,
    pub resource_status_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StackEvent {
    /// Events about the stack itself, as opposed to one of its resources
    pub fn is_stack_root(&self) -> bool {
        self.resource_type == STACK_RESOURCE_TYPE && self.logical_resource_id == self.stack_name
    }
}

/// One page of events, newest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<StackEvent>,
    pub next_token: Option<String>,
}

#[async_trait::async_trait]
pub trait StackProvider: Send + Sync {
    async fn stack_exists(&self, name: &str) -> ProviderResult<bool>;

    /// Outputs of all stacks in the region
    async fn stacks_outputs(&self) -> ProviderResult<OutputsSnapshot>;

    async fn stack_parameters(&self, name: &str) -> ProviderResult<IndexMap<String, String>>;

    async fn stack_status(&self, name: &str) -> ProviderResult<String>;

    async fn stack_events(&self, name: &str, page_token: Option<&str>)
        -> ProviderResult<EventPage>;

    async fn create_stack(&self, stack: &Stack) -> ProviderResult<()>;

    /// Fails with `NoUpdateRequired` when nothing would change
    async fn update_stack(&self, stack: &Stack) -> ProviderResult<()>;

    async fn delete_stack(&self, name: &str) -> ProviderResult<()>;

    async fn validate_template(&self, template_body: &str) -> ProviderResult<()>;

    /// Current time according to the provider
    async fn server_time(&self) -> ProviderResult<DateTime<Utc>>;
}
