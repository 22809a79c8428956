//! command line parameter overrides
//!
//! Overrides are given as `STACK.KEY=VALUE`. A leading `.KEY=VALUE` (no stack) applies to every
//! stack. Per-stack overrides win over the wildcard ones. Values are taken verbatim.
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliParameters {
    all_stacks: IndexMap<String, String>,
    per_stack: IndexMap<String, IndexMap<String, String>>,
}

impl CliParameters {
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut parameters = Self::default();

        for entry in entries {
            let entry = entry.as_ref();
            let (target, value) = entry.split_once('=').ok_or_else(|| {
                Error::invalid_config(format!(
                    "parameter {entry:?} must have the form stack.key=value"
                ))
            })?;

            let (stack, key) = target.trim().split_once('.').ok_or_else(|| {
                Error::invalid_config(format!(
                    "parameter {entry:?} must have the form stack.key=value"
                ))
            })?;

            let key = key.trim();
            if key.is_empty() {
                return Err(Error::invalid_config(format!(
                    "parameter {entry:?} is missing a key"
                )));
            }

            let value = value.trim().to_string();
            if stack.is_empty() {
                parameters.all_stacks.insert(key.to_string(), value);
            } else {
                parameters
                    .per_stack
                    .entry(stack.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
            }
        }

        Ok(parameters)
    }

    /// Overrides for `stack`: wildcard entries first, then the stack's own
    pub fn for_stack(&self, stack: &str) -> IndexMap<String, String> {
        let mut overrides = self.all_stacks.clone();
        if let Some(own) = self.per_stack.get(stack) {
            overrides.extend(own.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        overrides
    }

    /// Renames per-stack entries of managed stacks the same way the config was renamed
    pub fn with_suffix(&self, managed: &HashSet<String>, suffix: &str) -> Self {
        Self {
            all_stacks: self.all_stacks.clone(),
            per_stack: self
                .per_stack
                .iter()
                .map(|(stack, values)| {
                    let stack = if managed.contains(stack) {
                        format!("{stack}{suffix}")
                    } else {
                        stack.clone()
                    };
                    (stack, values.clone())
                })
                .collect(),
        }
    }
}
