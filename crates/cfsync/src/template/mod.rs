//! CloudFormation templates
//!
//! A [Template] is the parsed tree of a template file, split into the sections the provider
//! understands and the `PostCustomResources` section that is only meaningful to us. Sentinels are
//! rewritten by [transform] before a template is handed to the provider.
mod transform;
mod user_data;

pub use transform::transform;
pub use user_data::yaml_lines;

use crate::error::{Error, Result};
use crate::util::truncate_chars;
use crate::value::{Object, Value};
use std::path::Path;

/// Top-level sections accepted by the provider
pub const SECTIONS: [&str; 9] = [
    "AWSTemplateFormatVersion",
    "Description",
    "Metadata",
    "Parameters",
    "Mappings",
    "Conditions",
    "Transform",
    "Resources",
    "Outputs",
];

/// Section holding actions to run once the stack is complete. Never sent to the provider.
pub const POST_CUSTOM_RESOURCES: &str = "PostCustomResources";

pub const MAX_DESCRIPTION_LENGTH: usize = 1024;
pub const DESCRIPTION_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Json,
    Yaml,
}

impl TemplateFormat {
    /// `.json` is json, everything else is read as yaml
    pub fn from_url(url: &str) -> Self {
        let extension = Path::new(url.rsplit('/').next().unwrap_or(url))
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => TemplateFormat::Json,
            _ => TemplateFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    body: Object,
    post_custom_resources: Object,
}

impl Template {
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::template("a template must be a mapping"));
        };

        let mut body = Object::new();
        let mut post_custom_resources = Object::new();

        for (section, value) in object {
            if section == POST_CUSTOM_RESOURCES {
                let Value::Object(resources) = value else {
                    return Err(Error::template(format!(
                        "{POST_CUSTOM_RESOURCES} must be a mapping"
                    )));
                };
                post_custom_resources = resources;
            } else if SECTIONS.contains(&section.as_str()) {
                body.insert(section, value);
            } else {
                return Err(Error::template(format!("unknown template section {section:?}")));
            }
        }

        Ok(Self {
            body,
            post_custom_resources,
        })
    }

    pub fn parse(contents: &str, format: TemplateFormat) -> Result<Self> {
        let value: Value = match format {
            TemplateFormat::Json => {
                serde_json::from_str(contents).map_err(|e| Error::template(e.to_string()))?
            }
            TemplateFormat::Yaml => {
                serde_yaml::from_str(contents).map_err(|e| Error::template(e.to_string()))?
            }
        };

        Self::from_value(value)
    }

    pub fn body(&self) -> &Object {
        &self.body
    }

    pub fn post_custom_resources(&self) -> &Object {
        &self.post_custom_resources
    }

    pub fn description(&self) -> Option<&str> {
        self.body.get("Description").and_then(Value::as_str)
    }

    /// Rewrites all sentinels into provider intrinsics
    pub fn transform(&self) -> Result<Self> {
        let Value::Object(body) = transform(&Value::Object(self.body.clone()))? else {
            return Err(Error::template("transformation did not return a mapping"));
        };

        Ok(Self {
            body,
            post_custom_resources: self.post_custom_resources.clone(),
        })
    }

    /// Appends `extra` to the description, the original one is cut to stay within the provider's
    /// limit
    pub fn extend_description(&mut self, extra: &str) {
        if extra.is_empty() {
            return;
        }

        let description = match self.description() {
            Some(original) if !original.is_empty() => {
                let reserved = DESCRIPTION_SEPARATOR.chars().count() + extra.chars().count();
                let available = MAX_DESCRIPTION_LENGTH.saturating_sub(reserved);
                let combined = format!(
                    "{}{DESCRIPTION_SEPARATOR}{extra}",
                    truncate_chars(original, available)
                );
                truncate_chars(&combined, MAX_DESCRIPTION_LENGTH).to_string()
            }
            _ => truncate_chars(extra, MAX_DESCRIPTION_LENGTH).to_string(),
        };

        self.body
            .insert("Description".to_string(), Value::String(description));
    }

    /// Names of parameters declared with `NoEcho: true` (or `"true"`)
    pub fn no_echo_parameters(&self) -> Vec<&str> {
        let Some(Value::Object(parameters)) = self.body.get("Parameters") else {
            return vec![];
        };

        parameters
            .iter()
            .filter(|(_, declaration)| {
                match declaration.as_object().and_then(|d| d.get("NoEcho")) {
                    Some(Value::Boolean(no_echo)) => *no_echo,
                    Some(Value::String(no_echo)) => no_echo.eq_ignore_ascii_case("true"),
                    _ => false,
                }
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Compact json as sent to the provider
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.body).map_err(|e| Error::template(e.to_string()))
    }

    pub fn to_pretty_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.body).map_err(|e| Error::template(e.to_string()))
    }
}
