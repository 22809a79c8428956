//! stack configuration document
//!
//! A configuration names a region and a set of stacks. Settings given at the root act as defaults
//! for every stack entry. Unknown keys are rejected while parsing, everything serde cannot express
//! is checked by [Config::validate].
use crate::error::{Error, Result};
use crate::reference::StackOutputReference;
use crate::util::SuffixRewriter;
use crate::visit::VisitStringsMut;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 600;

/// What the provider does when stack creation fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureAction {
    DoNothing,
    #[default]
    Rollback,
    Delete,
}

impl FailureAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureAction::DoNothing => "DO_NOTHING",
            FailureAction::Rollback => "ROLLBACK",
            FailureAction::Delete => "DELETE",
        }
    }
}

/// Root of a configuration document
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub region: String,
    pub stacks: IndexMap<String, StackConfig>,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
    #[serde(default, rename = "service-role")]
    pub service_role: Option<String>,
    #[serde(default, rename = "stack-policy-url")]
    pub stack_policy_url: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub on_failure: Option<FailureAction>,
    #[serde(default)]
    pub disable_rollback: Option<bool>,
    #[serde(default)]
    pub termination_protection: Option<bool>,

    /// Directory relative template and file urls are resolved against
    #[serde(skip)]
    pub working_dir: PathBuf,
}

/// A single stack entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(rename = "template-url")]
    pub template_url: String,
    #[serde(default)]
    pub parameters: IndexMap<String, ParameterValue>,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
    #[serde(default, rename = "service-role")]
    pub service_role: Option<String>,
    #[serde(default, rename = "stack-policy-url")]
    pub stack_policy_url: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub on_failure: Option<FailureAction>,
    #[serde(default)]
    pub disable_rollback: Option<bool>,
    #[serde(default)]
    pub termination_protection: Option<bool>,
}

impl StackConfig {
    pub fn new(template_url: impl Into<String>) -> Self {
        Self {
            template_url: template_url.into(),
            parameters: IndexMap::new(),
            tags: IndexMap::new(),
            service_role: None,
            stack_policy_url: None,
            timeout: None,
            on_failure: None,
            disable_rollback: None,
            termination_protection: None,
        }
    }

    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<ParameterValue>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// All `|ref|stack.output` references found in the parameters, list elements included
    pub fn stack_references(&self) -> Result<Vec<StackOutputReference>> {
        let mut references = vec![];
        for value in self.parameters.values() {
            for string in value.strings() {
                if let Some(reference) = StackOutputReference::parse(string)? {
                    references.push(reference);
                }
            }
        }
        Ok(references)
    }
}

/// A parameter value as written in the configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ParameterValue>),
    /// Anything else (mappings, null). Kept so resolution can report it precisely.
    Other(serde_yaml::Value),
}

impl ParameterValue {
    /// All strings in this value, recursing into lists
    pub fn strings(&self) -> Vec<&str> {
        match self {
            ParameterValue::String(s) => vec![s.as_str()],
            ParameterValue::List(items) => items.iter().flat_map(|item| item.strings()).collect(),
            _ => vec![],
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::String(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::String(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        ParameterValue::Bool(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl<T: Into<ParameterValue>> From<Vec<T>> for ParameterValue {
    fn from(value: Vec<T>) -> Self {
        ParameterValue::List(value.into_iter().map(Into::into).collect())
    }
}

/// Settings of one stack after inheriting root defaults
#[derive(Debug, Clone, PartialEq)]
pub struct StackSettings {
    pub timeout: Duration,
    pub on_failure: FailureAction,
    pub disable_rollback: bool,
    pub termination_protection: bool,
    pub service_role: Option<String>,
    pub stack_policy_url: Option<String>,
    pub tags: IndexMap<String, String>,
}

impl Config {
    #[tracing::instrument(level = "debug")]
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: Config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str(&contents).map_err(|e| e.to_string()),
        }
        .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?;
        config.validate()?;

        config.working_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        tracing::info!(path=%path.display(), stacks = config.stacks.len(), "loaded config");
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents)
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::invalid_config("region must not be empty"));
        }

        if self.stacks.is_empty() {
            return Err(Error::invalid_config("stacks must not be empty"));
        }

        validate_common("config", self.service_role.as_deref(), self.timeout)?;

        for (name, stack) in &self.stacks {
            if name.trim().is_empty() {
                return Err(Error::invalid_config("stack names must not be empty"));
            }

            if stack.template_url.trim().is_empty() {
                return Err(Error::invalid_config(format!(
                    "stack {name}: template-url must not be empty"
                )));
            }

            validate_common(
                &format!("stack {name}"),
                stack.service_role.as_deref(),
                stack.timeout,
            )?;

            stack
                .stack_references()
                .map_err(|e| Error::invalid_config(format!("stack {name}: {e}")))?;
        }

        Ok(())
    }

    pub fn stack(&self, name: &str) -> Result<&StackConfig> {
        self.stacks
            .get(name)
            .ok_or_else(|| Error::invalid_config(format!("unknown stack {name}")))
    }

    /// Settings of `name` with root values filled in
    pub fn settings(&self, name: &str) -> Result<StackSettings> {
        let stack = self.stack(name)?;

        let mut tags = self.tags.clone();
        tags.extend(stack.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(StackSettings {
            timeout: Duration::from_secs(
                stack
                    .timeout
                    .or(self.timeout)
                    .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            ),
            on_failure: stack.on_failure.or(self.on_failure).unwrap_or_default(),
            disable_rollback: stack
                .disable_rollback
                .or(self.disable_rollback)
                .unwrap_or(false),
            termination_protection: stack
                .termination_protection
                .or(self.termination_protection)
                .unwrap_or(false),
            service_role: stack.service_role.clone().or_else(|| self.service_role.clone()),
            stack_policy_url: stack
                .stack_policy_url
                .clone()
                .or_else(|| self.stack_policy_url.clone()),
            tags,
        })
    }

    /// Appends `suffix` to every managed stack and to every reference pointing at one
    ///
    /// References to stacks outside of this configuration are left untouched.
    pub fn with_suffix(&self, suffix: &str) -> Config {
        if suffix.is_empty() {
            return self.clone();
        }

        let managed: HashSet<String> = self.stacks.keys().cloned().collect();
        let mut rewriter = SuffixRewriter::new(&managed, suffix);

        let mut config = self.clone();
        config.stacks = self
            .stacks
            .iter()
            .map(|(name, stack)| {
                let mut stack = stack.clone();
                stack.visit_strings_mut(&mut rewriter);
                (format!("{name}{suffix}"), stack)
            })
            .collect();

        tracing::debug!(suffix, "applied stack name suffix");
        config
    }
}

fn validate_common(context: &str, service_role: Option<&str>, timeout: Option<u64>) -> Result<()> {
    if let Some(role) = service_role {
        if !role.starts_with("arn:aws:iam:") {
            return Err(Error::invalid_config(format!(
                "{context}: service-role {role:?} must be an iam role arn (arn:aws:iam:...)"
            )));
        }
    }

    if timeout == Some(0) {
        return Err(Error::invalid_config(format!(
            "{context}: timeout must be a positive number of seconds"
        )));
    }

    Ok(())
}
