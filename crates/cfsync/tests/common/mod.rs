//! In-memory collaborators for integration tests
#![allow(dead_code)]

use cfsync::error::{Error, ProviderError, ProviderErrorKind, Result};
use cfsync::provider::{
    EventPage, OutputsSnapshot, ProviderResult, StackEvent, StackProvider, STACK_RESOURCE_TYPE,
};
use cfsync::services::{
    EncryptionContext, FileLoader, Image, ImageCatalog, ImageFilter, KeyService, Services,
};
use cfsync::stack::Stack;
use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const PAGE_SIZE: usize = 3;

/// How the fake reacts to a create or update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Behavior {
    #[default]
    Succeed,
    /// A resource fails and the stack rolls back
    RollBack,
    /// The stack itself reports a failure
    Fail,
    /// No events at all
    Silent,
    /// Starts but never completes
    Hang,
}

struct FakeStack {
    status: String,
    parameters: IndexMap<String, String>,
}

#[derive(Default)]
struct State {
    stacks: IndexMap<String, FakeStack>,
    events: HashMap<String, Vec<StackEvent>>,
    behaviors: HashMap<String, Behavior>,
    outputs: HashMap<String, HashMap<String, String>>,
    unchanged: HashSet<String>,
    calls: Vec<String>,
    received: HashMap<String, Stack>,
    throttled_calls: u32,
    next_event_id: u64,
}

pub struct FakeProvider {
    state: Mutex<State>,
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            base: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            started: tokio::time::Instant::now(),
        }
    }

    /// Provider clock, follows tokio's (paused) clock
    pub fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::from_std(self.started.elapsed()).unwrap()
    }

    pub fn with_existing_stack(
        self,
        name: &str,
        status: &str,
        parameters: &[(&str, &str)],
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.stacks.insert(
                name.to_string(),
                FakeStack {
                    status: status.to_string(),
                    parameters: parameters
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
            );
        }
        // history from long before the run
        let old = self.base - chrono::Duration::hours(1);
        self.push_event(name, name, STACK_RESOURCE_TYPE, "CREATE_COMPLETE", old);
        self
    }

    /// Outputs the stack has once it exists
    pub fn with_outputs(self, name: &str, outputs: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().outputs.insert(
            name.to_string(),
            outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_behavior(self, name: &str, behavior: Behavior) -> Self {
        self.state
            .lock()
            .unwrap()
            .behaviors
            .insert(name.to_string(), behavior);
        self
    }

    /// Updates of `name` report that nothing would change
    pub fn unchanged(self, name: &str) -> Self {
        self.state.lock().unwrap().unchanged.insert(name.to_string());
        self
    }

    /// The next `count` calls fail with a throttling error
    pub fn throttle(self, count: u32) -> Self {
        self.state.lock().unwrap().throttled_calls = count;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn received(&self, name: &str) -> Option<Stack> {
        self.state.lock().unwrap().received.get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().stacks.contains_key(name)
    }

    pub fn status(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .stacks
            .get(name)
            .map(|stack| stack.status.clone())
    }

    fn push_event(
        &self,
        stack_name: &str,
        logical_resource_id: &str,
        resource_type: &str,
        status: &str,
        timestamp: DateTime<Utc>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.next_event_id += 1;
        let event = StackEvent {
            event_id: format!("event-{}", state.next_event_id),
            stack_name: stack_name.to_string(),
            logical_resource_id: logical_resource_id.to_string(),
            resource_type: resource_type.to_string(),
            resource_status: status.to_string(),
            resource_status_reason: status
                .ends_with("_FAILED")
                .then(|| "simulated failure".to_string()),
            timestamp,
        };
        state
            .events
            .entry(stack_name.to_string())
            .or_default()
            .push(event);
    }

    fn check_throttle(&self, operation: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.throttled_calls > 0 {
            state.throttled_calls -= 1;
            return Err(ProviderError::new(
                ProviderErrorKind::Throttled,
                operation,
                "Rate exceeded",
            ));
        }
        Ok(())
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    /// Emits the events of an action and settles the stack in its final status
    fn play(&self, name: &str, action: &str) {
        let behavior = self
            .state
            .lock()
            .unwrap()
            .behaviors
            .get(name)
            .copied()
            .unwrap_or_default();

        let now = self.now();
        let at = |offset: i64| now + chrono::Duration::milliseconds(offset);
        let root = |status: String, offset: i64| {
            self.push_event(name, name, STACK_RESOURCE_TYPE, &status, at(offset))
        };
        let resource = |status: String, offset: i64| {
            self.push_event(name, "Queue", "AWS::SQS::Queue", &status, at(offset))
        };

        let final_status = match behavior {
            Behavior::Succeed => {
                root(format!("{action}_IN_PROGRESS"), 0);
                resource(format!("{action}_IN_PROGRESS"), 1);
                resource(format!("{action}_COMPLETE"), 2);
                root(format!("{action}_COMPLETE"), 3);
                format!("{action}_COMPLETE")
            }
            Behavior::RollBack => {
                let rollback = if action == "CREATE" {
                    "ROLLBACK"
                } else {
                    "UPDATE_ROLLBACK"
                };
                root(format!("{action}_IN_PROGRESS"), 0);
                resource(format!("{action}_FAILED"), 1);
                root(format!("{rollback}_IN_PROGRESS"), 2);
                root(format!("{rollback}_COMPLETE"), 3);
                format!("{rollback}_COMPLETE")
            }
            Behavior::Fail => {
                root(format!("{action}_IN_PROGRESS"), 0);
                root(format!("{action}_FAILED"), 1);
                format!("{action}_FAILED")
            }
            Behavior::Silent => format!("{action}_IN_PROGRESS"),
            Behavior::Hang => {
                root(format!("{action}_IN_PROGRESS"), 0);
                format!("{action}_IN_PROGRESS")
            }
        };

        let mut state = self.state.lock().unwrap();
        if let Some(stack) = state.stacks.get_mut(name) {
            stack.status = final_status;
        }
    }

    fn not_found(operation: &str, name: &str) -> ProviderError {
        ProviderError::new(
            ProviderErrorKind::NotFound,
            operation,
            format!("Stack with id {name} does not exist"),
        )
    }
}

#[async_trait::async_trait]
impl StackProvider for FakeProvider {
    async fn stack_exists(&self, name: &str) -> ProviderResult<bool> {
        self.check_throttle("DescribeStacks")?;
        Ok(self.exists(name))
    }

    async fn stacks_outputs(&self) -> ProviderResult<OutputsSnapshot> {
        self.check_throttle("DescribeStacks")?;
        let state = self.state.lock().unwrap();
        Ok(state
            .stacks
            .keys()
            .filter_map(|name| {
                state
                    .outputs
                    .get(name)
                    .map(|outputs| (name.clone(), outputs.clone()))
            })
            .collect())
    }

    async fn stack_parameters(&self, name: &str) -> ProviderResult<IndexMap<String, String>> {
        self.check_throttle("DescribeStacks")?;
        let state = self.state.lock().unwrap();
        state
            .stacks
            .get(name)
            .map(|stack| stack.parameters.clone())
            .ok_or_else(|| Self::not_found("DescribeStacks", name))
    }

    async fn stack_status(&self, name: &str) -> ProviderResult<String> {
        self.check_throttle("DescribeStacks")?;
        self.status(name)
            .ok_or_else(|| Self::not_found("DescribeStacks", name))
    }

    async fn stack_events(
        &self,
        name: &str,
        page_token: Option<&str>,
    ) -> ProviderResult<EventPage> {
        self.check_throttle("DescribeStackEvents")?;
        let state = self.state.lock().unwrap();
        if !state.stacks.contains_key(name) {
            return Err(Self::not_found("DescribeStackEvents", name));
        }

        let newest_first: Vec<StackEvent> = state
            .events
            .get(name)
            .map(|events| events.iter().rev().cloned().collect())
            .unwrap_or_default();

        let offset: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (offset + PAGE_SIZE).min(newest_first.len());
        Ok(EventPage {
            events: newest_first[offset.min(end)..end].to_vec(),
            next_token: (end < newest_first.len()).then(|| end.to_string()),
        })
    }

    async fn create_stack(&self, stack: &Stack) -> ProviderResult<()> {
        self.check_throttle("CreateStack")?;
        {
            let mut state = self.state.lock().unwrap();
            if state.stacks.contains_key(stack.name()) {
                return Err(ProviderError::new(
                    ProviderErrorKind::Other,
                    "CreateStack",
                    format!("Stack [{}] already exists", stack.name()),
                ));
            }
            state.calls.push(format!("create {}", stack.name()));
            state.received.insert(stack.name().to_string(), stack.clone());
            state.stacks.insert(
                stack.name().to_string(),
                FakeStack {
                    status: "CREATE_IN_PROGRESS".to_string(),
                    parameters: stack.parameters().iter().cloned().collect(),
                },
            );
        }
        self.play(stack.name(), "CREATE");
        Ok(())
    }

    async fn update_stack(&self, stack: &Stack) -> ProviderResult<()> {
        self.check_throttle("UpdateStack")?;
        {
            let mut state = self.state.lock().unwrap();
            state.calls.push(format!("update {}", stack.name()));
            state.received.insert(stack.name().to_string(), stack.clone());
            if state.unchanged.contains(stack.name()) {
                return Err(ProviderError::new(
                    ProviderErrorKind::NoUpdateRequired,
                    "UpdateStack",
                    "No updates are to be performed.",
                ));
            }
            let existing = state
                .stacks
                .get_mut(stack.name())
                .ok_or_else(|| Self::not_found("UpdateStack", stack.name()))?;
            existing.parameters = stack.parameters().iter().cloned().collect();
        }
        self.play(stack.name(), "UPDATE");
        Ok(())
    }

    async fn delete_stack(&self, name: &str) -> ProviderResult<()> {
        self.check_throttle("DeleteStack")?;
        self.record(format!("delete {name}"));
        let mut state = self.state.lock().unwrap();
        match state.stacks.shift_remove(name) {
            Some(_) => Ok(()),
            None => Err(Self::not_found("DeleteStack", name)),
        }
    }

    async fn validate_template(&self, template_body: &str) -> ProviderResult<()> {
        self.check_throttle("ValidateTemplate")?;
        self.record("validate".to_string());
        serde_json::from_str::<serde_json::Value>(template_body)
            .map(|_| ())
            .map_err(|e| {
                ProviderError::new(ProviderErrorKind::Other, "ValidateTemplate", e.to_string())
            })
    }

    async fn server_time(&self) -> ProviderResult<DateTime<Utc>> {
        Ok(self.now())
    }
}

/// Reverses bytes and remembers the contexts it was called with
#[derive(Default)]
pub struct FakeKeys {
    pub contexts: Mutex<Vec<EncryptionContext>>,
}

#[async_trait::async_trait]
impl KeyService for FakeKeys {
    async fn encrypt(
        &self,
        _region: &str,
        _key_id: &str,
        plaintext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>> {
        self.contexts.lock().unwrap().push(context.clone());
        Ok(plaintext.iter().rev().copied().collect())
    }

    async fn decrypt(
        &self,
        _region: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Vec<u8>> {
        self.contexts.lock().unwrap().push(context.clone());
        Ok(ciphertext.iter().rev().copied().collect())
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub images: Vec<Image>,
}

impl FakeImages {
    pub fn with_image(mut self, image_id: &str, day: u32) -> Self {
        self.images.push(Image {
            image_id: image_id.to_string(),
            name: format!("Taupage-AMI-{day}"),
            creation_date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        });
        self
    }
}

#[async_trait::async_trait]
impl ImageCatalog for FakeImages {
    async fn images(&self, _region: &str, filter: &ImageFilter) -> Result<Vec<Image>> {
        assert_eq!(filter, &ImageFilter::taupage());
        Ok(self.images.clone())
    }
}

/// Files by url, the working directory is ignored
#[derive(Default)]
pub struct MemoryFiles {
    files: HashMap<String, String>,
}

impl MemoryFiles {
    pub fn with(mut self, url: &str, contents: &str) -> Self {
        self.files.insert(url.to_string(), contents.to_string());
        self
    }
}

#[async_trait::async_trait]
impl FileLoader for MemoryFiles {
    async fn load(&self, url: &str, _working_dir: &Path) -> Result<String> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Generic(anyhow::anyhow!("{url} not found")))
    }
}

pub const QUEUE_TEMPLATE: &str = r#"
Description: a queue
Parameters:
  VpcId:
    Type: String
  Secret:
    Type: String
    NoEcho: true
Resources:
  Queue:
    Type: AWS::SQS::Queue
    Properties:
      QueueName: "|ref|AWS::StackName"
"#;

pub fn services(provider: Arc<FakeProvider>, files: MemoryFiles) -> Services {
    Services::new(
        provider,
        Arc::new(FakeKeys::default()),
        Arc::new(files),
        Arc::new(FakeImages::default().with_image("ami-1", 1)),
    )
}
