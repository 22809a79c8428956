//! The value handed to the provider for create and update
use crate::config::{FailureAction, StackSettings};
use indexmap::IndexMap;
use std::time::Duration;

/// A fully resolved stack. Built right before an action and never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    name: String,
    region: String,
    template_body: String,
    parameters: Vec<(String, String)>,
    tags: Vec<(String, String)>,
    timeout: Duration,
    on_failure: FailureAction,
    disable_rollback: bool,
    termination_protection: bool,
    service_role: Option<String>,
    stack_policy_url: Option<String>,
}

impl Stack {
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        template_body: impl Into<String>,
        parameters: IndexMap<String, String>,
        settings: StackSettings,
    ) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            template_body: template_body.into(),
            parameters: parameters.into_iter().collect(),
            tags: settings.tags.into_iter().collect(),
            timeout: settings.timeout,
            on_failure: settings.on_failure,
            disable_rollback: settings.disable_rollback,
            termination_protection: settings.termination_protection,
            service_role: settings.service_role,
            stack_policy_url: settings.stack_policy_url,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn template_body(&self) -> &str {
        &self.template_body
    }

    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn on_failure(&self) -> FailureAction {
        self.on_failure
    }

    pub fn disable_rollback(&self) -> bool {
        self.disable_rollback
    }

    pub fn termination_protection(&self) -> bool {
        self.termination_protection
    }

    pub fn service_role(&self) -> Option<&str> {
        self.service_role.as_deref()
    }

    pub fn stack_policy_url(&self) -> Option<&str> {
        self.stack_policy_url.as_deref()
    }
}
