//! Waiting for a stack action to finish
//!
//! The waiter polls the event log of a stack and follows the events newer than a validity window
//! anchored to the provider's clock. It first waits (for a short time) until the action's start
//! event shows up and then (for the stack's timeout) until the completion event does.
use crate::error::{Error, Result};
use crate::provider::{status, StackEvent, StackProvider};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const START_TIMEOUT: Duration = Duration::from_secs(120);
/// Tolerated difference between the provider clock and event timestamps
pub const CLOCK_SKEW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackAction {
    Create,
    Update,
    Delete,
}

impl StackAction {
    pub fn start_status(&self) -> &'static str {
        match self {
            StackAction::Create => "CREATE_IN_PROGRESS",
            StackAction::Update => "UPDATE_IN_PROGRESS",
            StackAction::Delete => "DELETE_IN_PROGRESS",
        }
    }

    pub fn complete_status(&self) -> &'static str {
        match self {
            StackAction::Create => "CREATE_COMPLETE",
            StackAction::Update => "UPDATE_COMPLETE",
            StackAction::Delete => "DELETE_COMPLETE",
        }
    }
}

impl std::fmt::Display for StackAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StackAction::Create => "create",
            StackAction::Update => "update",
            StackAction::Delete => "delete",
        })
    }
}

/// What an event means for the action being waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Started,
    Completed,
    Failed,
    RollbackInProgress,
    RolledBack,
    ResourceFailed,
    Progress,
}

pub fn classify(event: &StackEvent, action: StackAction) -> EventKind {
    let status = event.resource_status.as_str();

    if !event.is_stack_root() {
        return if status::is_failed(status) {
            EventKind::ResourceFailed
        } else {
            EventKind::Progress
        };
    }

    if status == action.complete_status() {
        EventKind::Completed
    } else if status == action.start_status() {
        EventKind::Started
    } else if status::is_failed(status) {
        EventKind::Failed
    } else if status::is_rollback_in_progress(status) {
        EventKind::RollbackInProgress
    } else if status::is_rolled_back(status) {
        EventKind::RolledBack
    } else {
        EventKind::Progress
    }
}

pub struct EventWaiter {
    provider: Arc<dyn StackProvider>,
    poll_interval: Duration,
    start_timeout: Duration,
}

impl EventWaiter {
    pub fn new(provider: Arc<dyn StackProvider>) -> Self {
        Self {
            provider,
            poll_interval: POLL_INTERVAL,
            start_timeout: START_TIMEOUT,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_start_timeout(mut self, start_timeout: Duration) -> Self {
        self.start_timeout = start_timeout;
        self
    }

    /// Start of the validity window. Must be taken before the action is sent.
    pub async fn valid_from(&self) -> Result<DateTime<Utc>> {
        let now = self.provider.server_time().await?;
        Ok(now - chrono::Duration::seconds(CLOCK_SKEW.as_secs() as i64))
    }

    #[tracing::instrument(level = "debug", skip(self, valid_from, timeout))]
    pub async fn wait(
        &self,
        stack_name: &str,
        action: StackAction,
        valid_from: DateTime<Utc>,
        timeout: Duration,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        let start_deadline = Instant::now() + self.start_timeout;
        let mut completion_deadline: Option<Instant> = None;

        loop {
            let events = match self.new_events(stack_name, valid_from, &mut seen).await {
                Ok(events) => events,
                Err(Error::Provider(err))
                    if action == StackAction::Delete && err.is_not_found() =>
                {
                    tracing::info!("Stack {stack_name} deleted");
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            for event in &events {
                match classify(event, action) {
                    EventKind::Started => {
                        tracing::info!("Stack {stack_name}: {} started", action);
                        completion_deadline.get_or_insert_with(|| Instant::now() + timeout);
                    }
                    EventKind::Completed => {
                        tracing::info!("Stack {stack_name}: {} completed", action);
                        return Ok(());
                    }
                    EventKind::Failed => {
                        return Err(Error::stack_failed(
                            stack_name,
                            format!("{}{}", event.resource_status, reason_suffix(event)),
                        ));
                    }
                    EventKind::RollbackInProgress => {
                        tracing::error!(
                            "Stack {stack_name}: {}{}",
                            event.resource_status,
                            reason_suffix(event)
                        );
                    }
                    EventKind::RolledBack => {
                        return Err(Error::stack_failed(
                            stack_name,
                            format!("rollback occurred ({})", event.resource_status),
                        ));
                    }
                    EventKind::ResourceFailed => {
                        tracing::error!(
                            "{} {}: {}{}",
                            event.resource_type,
                            event.logical_resource_id,
                            event.resource_status,
                            reason_suffix(event)
                        );
                    }
                    EventKind::Progress => {
                        tracing::info!(
                            "{} {}: {}",
                            event.resource_type,
                            event.logical_resource_id,
                            event.resource_status
                        );
                    }
                }
            }

            let now = Instant::now();
            match completion_deadline {
                None if now >= start_deadline => {
                    return Err(Error::stack_failed(
                        stack_name,
                        format!(
                            "no {} event within {}s",
                            action.start_status(),
                            self.start_timeout.as_secs()
                        ),
                    ));
                }
                Some(deadline) if now >= deadline => {
                    return Err(Error::stack_failed(
                        stack_name,
                        format!("{action} timed out after {}s", timeout.as_secs()),
                    ));
                }
                _ => {}
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Events not seen before and not older than `valid_from`, oldest first
    async fn new_events(
        &self,
        stack_name: &str,
        valid_from: DateTime<Utc>,
        seen: &mut HashSet<String>,
    ) -> Result<Vec<StackEvent>> {
        let mut fresh = vec![];
        let mut page_token: Option<String> = None;

        'pages: loop {
            let page = self
                .provider
                .stack_events(stack_name, page_token.as_deref())
                .await?;

            // pages are newest first, everything after an old or known event was handled already
            for event in page.events {
                if event.timestamp < valid_from || seen.contains(&event.event_id) {
                    break 'pages;
                }
                seen.insert(event.event_id.clone());
                fresh.push(event);
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        fresh.reverse();
        fresh.sort_by_key(|event| event.timestamp);
        Ok(fresh)
    }
}

fn reason_suffix(event: &StackEvent) -> String {
    event
        .resource_status_reason
        .as_deref()
        .map(|reason| format!(" ({reason})"))
        .unwrap_or_default()
}
