//! Stack action orchestration
//!
//! [StackActionHandler] walks the stacks of a configuration in dependency order and brings each
//! of them to its desired state:
//!
//! 1. load and transform the template, resolve the parameters and build a [Stack]
//! 2. update the stack if it exists (after checking it is ready for an action), create it otherwise
//! 3. wait for the terminal event of the action
//! 4. run the post actions declared in the template
//!
//! In [ExecutionMode::Parallel] the stacks of one dependency wave run concurrently. A wave always
//! runs to completion, the first failure is reported after all of its stacks are done.
//!
//! Deletion walks the same order backwards.
use crate::config::Config;
use crate::dependency::DependencyGraph;
use crate::error::{Error, Result};
use crate::overrides::CliParameters;
use crate::parameters::ParameterResolver;
use crate::provider::{status, OutputsSnapshot};
use crate::services::{EncryptionContext, Services};
use crate::stack::Stack;
use crate::template::{Template, TemplateFormat};
use crate::value::Value;
use crate::waiter::{EventWaiter, StackAction, POLL_INTERVAL, START_TIMEOUT};
use futures::future::join_all;
use indexmap::IndexMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Shown in place of `NoEcho` parameter values
pub const MASK: &str = "***";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Stacks of a dependency wave run concurrently
    Parallel,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: ExecutionMode,
    /// Appended to every template description
    pub description: Option<String>,
    /// Passed to the key service for every decryption, inline contexts are merged on top
    pub encryption_context: EncryptionContext,
    pub poll_interval: Duration,
    pub start_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            description: None,
            encryption_context: EncryptionContext::new(),
            poll_interval: POLL_INTERVAL,
            start_timeout: START_TIMEOUT,
        }
    }
}

/// Runs a post action declared in a template's `PostCustomResources` section
#[async_trait::async_trait]
pub trait PostActionHandler: Send + Sync {
    /// Whether this handler runs resources of `resource_type`
    fn handles(&self, resource_type: &str) -> bool;

    async fn run(&self, stack: &Stack, name: &str, declaration: &Value) -> Result<()>;
}

pub struct StackActionHandler {
    config: Config,
    services: Services,
    cli_parameters: CliParameters,
    options: SyncOptions,
    waiter: EventWaiter,
    post_actions: Vec<Arc<dyn PostActionHandler>>,
}

impl StackActionHandler {
    pub fn new(
        config: Config,
        services: Services,
        cli_parameters: CliParameters,
        options: SyncOptions,
    ) -> Self {
        let waiter = EventWaiter::new(services.provider.clone())
            .with_poll_interval(options.poll_interval)
            .with_start_timeout(options.start_timeout);

        Self {
            config,
            services,
            cli_parameters,
            options,
            waiter,
            post_actions: vec![],
        }
    }

    pub fn with_post_action_handler(mut self, handler: Arc<dyn PostActionHandler>) -> Self {
        self.post_actions.push(handler);
        self
    }

    pub async fn create_or_update_stacks(&self) -> Result<()> {
        let graph = DependencyGraph::from_stacks(&self.config.stacks)?;

        match self.options.mode {
            ExecutionMode::Sequential => {
                for name in graph.order()? {
                    // earlier stacks of this run may have added outputs
                    let outputs = self.services.provider.stacks_outputs().await?;
                    self.sync_stack(&name, &outputs)
                        .instrument(stack_span(&name))
                        .await?;
                }
            }
            ExecutionMode::Parallel => {
                for wave in graph.waves()? {
                    let outputs = self.services.provider.stacks_outputs().await?;
                    run_wave(&wave, |name| self.sync_stack(name, &outputs)).await?;
                }
            }
        }

        Ok(())
    }

    pub async fn delete_stacks(&self) -> Result<()> {
        let graph = DependencyGraph::from_stacks(&self.config.stacks)?;

        match self.options.mode {
            ExecutionMode::Sequential => {
                for name in graph.order()?.iter().rev() {
                    self.delete_stack(name).instrument(stack_span(name)).await?;
                }
            }
            ExecutionMode::Parallel => {
                for wave in graph.waves()?.iter().rev() {
                    run_wave(wave, |name| self.delete_stack(name)).await?;
                }
            }
        }

        Ok(())
    }

    /// Builds the stack object as it would be sent to the provider
    pub async fn build_stack(
        &self,
        name: &str,
        outputs: &OutputsSnapshot,
    ) -> Result<(Stack, Template)> {
        let stack_config = self.config.stack(name)?;

        let contents = self
            .services
            .file_loader
            .load(&stack_config.template_url, &self.config.working_dir)
            .await?;
        let mut template = Template::parse(
            &contents,
            TemplateFormat::from_url(&stack_config.template_url),
        )?
        .transform()?;

        if let Some(description) = &self.options.description {
            template.extend_description(description);
        }

        let resolver = ParameterResolver::new(
            &self.services,
            &self.cli_parameters,
            &self.options.encryption_context,
            &self.config.working_dir,
        );
        let parameters = resolver
            .resolve(name, stack_config, &self.config.region, outputs)
            .await?;
        log_parameters(&template, &parameters);

        let stack = Stack::new(
            name,
            &self.config.region,
            template.to_json()?,
            parameters,
            self.config.settings(name)?,
        );

        Ok((stack, template))
    }

    async fn sync_stack(&self, name: &str, outputs: &OutputsSnapshot) -> Result<()> {
        let (stack, template) = self.build_stack(name, outputs).await?;
        self.check_post_actions(&template)?;

        let provider = &self.services.provider;
        let action = if provider.stack_exists(name).await? {
            self.ensure_ready(name, StackAction::Update).await?;
            let valid_from = self.waiter.valid_from().await?;

            tracing::info!("Updating stack {name}");
            match provider.update_stack(&stack).await {
                Ok(()) => Some((StackAction::Update, valid_from)),
                Err(err) if err.is_no_update_required() => {
                    tracing::info!("Stack {name} does not need an update");
                    None
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            let valid_from = self.waiter.valid_from().await?;

            tracing::info!("Creating stack {name}");
            provider.create_stack(&stack).await?;
            Some((StackAction::Create, valid_from))
        };

        if let Some((action, valid_from)) = action {
            self.waiter
                .wait(name, action, valid_from, stack.timeout())
                .await?;
        }

        self.run_post_actions(&stack, &template).await
    }

    async fn delete_stack(&self, name: &str) -> Result<()> {
        let provider = &self.services.provider;
        if !provider.stack_exists(name).await? {
            tracing::info!("Stack {name} does not exist, nothing to delete");
            return Ok(());
        }

        self.ensure_ready(name, StackAction::Delete).await?;
        let valid_from = self.waiter.valid_from().await?;

        tracing::info!("Deleting stack {name}");
        match provider.delete_stack(name).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                tracing::info!("Stack {name} deleted");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        let timeout = self.config.settings(name)?.timeout;
        self.waiter
            .wait(name, StackAction::Delete, valid_from, timeout)
            .await
    }

    /// Fails unless the stack is in a status that accepts a new action
    pub async fn ensure_ready(&self, name: &str, action: StackAction) -> Result<()> {
        let current = self.services.provider.stack_status(name).await?;
        if status::is_ready(&current) {
            return Ok(());
        }

        Err(Error::stack_failed(
            name,
            format!("cannot {action} while the stack is in status {current}"),
        ))
    }

    fn post_action_handler(&self, resource_type: &str) -> Option<&Arc<dyn PostActionHandler>> {
        self.post_actions
            .iter()
            .find(|handler| handler.handles(resource_type))
    }

    /// Every declared post action must have a handler before the stack is touched
    fn check_post_actions(&self, template: &Template) -> Result<()> {
        for (name, declaration) in template.post_custom_resources() {
            let resource_type = post_action_type(name, declaration)?;
            if self.post_action_handler(resource_type).is_none() {
                return Err(Error::template(format!(
                    "no handler for post action {name} of type {resource_type}"
                )));
            }
        }
        Ok(())
    }

    async fn run_post_actions(&self, stack: &Stack, template: &Template) -> Result<()> {
        for (name, declaration) in template.post_custom_resources() {
            let resource_type = post_action_type(name, declaration)?;
            let handler = self.post_action_handler(resource_type).ok_or_else(|| {
                Error::template(format!(
                    "no handler for post action {name} of type {resource_type}"
                ))
            })?;

            tracing::info!("Running post action {name} ({resource_type})");
            handler.run(stack, name, declaration).await?;
        }
        Ok(())
    }
}

fn stack_span(name: &str) -> tracing::Span {
    tracing::info_span!("stack", name = %name)
}

/// Runs `action` for every stack of the wave concurrently and waits for all of them
async fn run_wave<'w, F, Fut>(wave: &'w [String], action: F) -> Result<()>
where
    F: Fn(&'w str) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let results = join_all(wave.iter().map(|name| action(name).instrument(stack_span(name)))).await;

    let mut first_error = None;
    for (name, result) in wave.iter().zip(results) {
        if let Err(err) = result {
            tracing::error!("Stack {name} failed: {err}");
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn post_action_type<'v>(name: &str, declaration: &'v Value) -> Result<&'v str> {
    declaration
        .as_object()
        .and_then(|declaration| declaration.get("Type"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::template(format!("post action {name} is missing a Type")))
}

fn log_parameters(template: &Template, parameters: &IndexMap<String, String>) {
    let hidden = template.no_echo_parameters();
    for (key, value) in parameters {
        let shown = if hidden.contains(&key.as_str()) {
            MASK
        } else {
            value.as_str()
        };
        tracing::info!("Parameter {key}={shown}");
    }
}
