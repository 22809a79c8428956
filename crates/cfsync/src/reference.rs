//! sentinel grammar
//!
//! Strings and mapping keys that start with a sentinel (`|ref|`, `|kms|`, `@TaupageUserData@`, ...)
//! are instructions rather than literals. The sentinel itself is matched case-insensitively,
//! the payload after it is kept as written.
//!
//! There are three places a sentinel can appear, each with its own parser:
//! - stack parameter values in the configuration ([ParameterReference])
//! - leaf strings in a template ([TemplateValue])
//! - mapping keys in a template ([TemplateKey])
use crate::error::{Error, Result};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

pub const REF: &str = "|ref|";
pub const GETATT: &str = "|getatt|";
pub const JOIN: &str = "|join|";
pub const KMS: &str = "|kms|";
pub const FILE: &str = "|file|";
pub const KEEP_OR_USE: &str = "|keeporuse|";
pub const LATEST_TAUPAGE_AMI: &str = "|latesttaupageami|";
pub const TAUPAGE_USER_DATA: &str = "@taupageuserdata@";
pub const YAML_USER_DATA: &str = "@yamluserdata@";

static STACK_OUTPUT_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\|ref\|[^.]+\.[^.]+$").expect("static regex"));

/// Returns the payload after `prefix` when `value` starts with it (ignoring ASCII case)
pub(crate) fn strip_sentinel<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

/// `|ref|STACK.OUTPUT` as used in stack parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackOutputReference {
    pub stack: String,
    pub output: String,
}

impl StackOutputReference {
    /// Parses a `|ref|STACK.OUTPUT` value, `None` for anything that is not a `|ref|`
    pub fn parse(value: &str) -> Result<Option<Self>> {
        let Some(payload) = strip_sentinel(value, REF) else {
            return Ok(None);
        };

        if !STACK_OUTPUT_REFERENCE.is_match(value) {
            return Err(Error::template(format!(
                "stack reference {value:?} must have the form |ref|stack.output"
            )));
        }

        // the regex guarantees exactly one '.' with non-empty sides
        let (stack, output) = payload
            .split_once('.')
            .ok_or_else(|| Error::template(format!("malformed stack reference {value:?}")))?;

        Ok(Some(Self {
            stack: stack.to_string(),
            output: output.to_string(),
        }))
    }

    pub fn with_stack(&self, stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            output: self.output.clone(),
        }
    }
}

impl std::fmt::Display for StackOutputReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "|ref|{}.{}", self.stack, self.output)
    }
}

/// A sentinel found in a stack parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterReference {
    StackOutput(StackOutputReference),
    KeepOrUse(String),
    Kms {
        context: IndexMap<String, String>,
        ciphertext: String,
    },
    File(String),
    LatestTaupageAmi,
}

impl ParameterReference {
    /// Classify a parameter string. `Ok(None)` means the string is a literal.
    pub fn parse(value: &str) -> Result<Option<Self>> {
        if let Some(reference) = StackOutputReference::parse(value)? {
            return Ok(Some(ParameterReference::StackOutput(reference)));
        }

        if let Some(default) = strip_sentinel(value, KEEP_OR_USE) {
            return Ok(Some(ParameterReference::KeepOrUse(default.to_string())));
        }

        if let Some(payload) = strip_sentinel(value, KMS) {
            return parse_kms(value, payload).map(Some);
        }

        if let Some(url) = strip_sentinel(value, FILE) {
            if url.is_empty() {
                return Err(Error::template(format!("{value:?} is missing a file url")));
            }
            return Ok(Some(ParameterReference::File(url.to_string())));
        }

        if value.eq_ignore_ascii_case(LATEST_TAUPAGE_AMI) {
            return Ok(Some(ParameterReference::LatestTaupageAmi));
        }

        Ok(None)
    }
}

/// `|kms|CIPHERTEXT` or `|kms|k1=v1,k2=v2|CIPHERTEXT`
fn parse_kms(value: &str, payload: &str) -> Result<ParameterReference> {
    let (context, ciphertext) = match payload.split_once('|') {
        Some((context, ciphertext)) => (parse_encryption_context(context)?, ciphertext),
        None => (IndexMap::new(), payload),
    };

    if ciphertext.is_empty() {
        return Err(Error::template(format!("{value:?} is missing a ciphertext")));
    }

    Ok(ParameterReference::Kms {
        context,
        ciphertext: ciphertext.to_string(),
    })
}

/// Parses `k1=v1,k2=v2` into an encryption context
pub fn parse_encryption_context(context: &str) -> Result<IndexMap<String, String>> {
    context
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .ok_or_else(|| {
                    Error::InvalidEncryptedValue(format!(
                        "encryption context entry {pair:?} must be key=value"
                    ))
                })
        })
        .collect()
}

/// A sentinel found in a template leaf string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    Ref(String),
    GetAtt { resource: String, attribute: String },
}

impl TemplateValue {
    /// `Ok(None)` for strings that do not start with `|`
    pub fn parse(value: &str) -> Result<Option<Self>> {
        if !value.starts_with('|') {
            return Ok(None);
        }

        if let Some(name) = strip_sentinel(value, REF) {
            if name.is_empty() || name.contains('|') {
                return Err(Error::template(format!(
                    "reference {value:?} must have the form |ref|name"
                )));
            }
            return Ok(Some(TemplateValue::Ref(name.to_string())));
        }

        if strip_sentinel(value, GETATT).is_some() {
            let fields: Vec<&str> = value.split('|').collect();
            let [_, _, resource, attribute] = fields.as_slice() else {
                return Err(Error::template(format!(
                    "get-attribute {value:?} must have the form |getatt|resource|attribute"
                )));
            };
            if resource.is_empty() || attribute.is_empty() {
                return Err(Error::template(format!(
                    "get-attribute {value:?} has an empty resource or attribute"
                )));
            }
            return Ok(Some(TemplateValue::GetAtt {
                resource: resource.to_string(),
                attribute: attribute.to_string(),
            }));
        }

        Err(Error::template(format!(
            "unhandled reference value {value:?}"
        )))
    }
}

/// A sentinel found in a template mapping key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKey {
    Join(String),
    TaupageUserData,
    YamlUserData,
}

impl TemplateKey {
    pub fn is_sentinel(key: &str) -> bool {
        key.starts_with('|') || (key.len() > 1 && key.starts_with('@') && key.ends_with('@'))
    }

    /// `Ok(None)` for keys that are not sentinels
    pub fn parse(key: &str) -> Result<Option<Self>> {
        if !Self::is_sentinel(key) {
            return Ok(None);
        }

        if let Some(separator) = strip_sentinel(key, JOIN) {
            return Ok(Some(TemplateKey::Join(separator.to_string())));
        }

        if key.eq_ignore_ascii_case(TAUPAGE_USER_DATA) {
            return Ok(Some(TemplateKey::TaupageUserData));
        }

        if key.eq_ignore_ascii_case(YAML_USER_DATA) {
            return Ok(Some(TemplateKey::YamlUserData));
        }

        Err(Error::template(format!("unhandled reference key {key:?}")))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stack_output_reference() {
        let reference = StackOutputReference::parse("|Ref|vpc.VpcId").unwrap().unwrap();
        assert_eq!(reference.stack, "vpc");
        assert_eq!(reference.output, "VpcId");
        assert_eq!(reference.to_string(), "|ref|vpc.VpcId");

        assert_eq!(StackOutputReference::parse("vpc.VpcId").unwrap(), None);
        assert!(StackOutputReference::parse("|ref|vpc").is_err());
        assert!(StackOutputReference::parse("|ref|a.b.c").is_err());
        assert!(StackOutputReference::parse("|ref|.b").is_err());
    }

    #[test]
    fn parameter_sentinels_are_case_insensitive() {
        assert_eq!(
            ParameterReference::parse("|KEEPORUSE|fallback").unwrap(),
            Some(ParameterReference::KeepOrUse("fallback".into()))
        );
        assert_eq!(
            ParameterReference::parse("|LatestTaupageAmi|").unwrap(),
            Some(ParameterReference::LatestTaupageAmi)
        );
        assert_eq!(
            ParameterReference::parse("|File|templates/Data.txt").unwrap(),
            Some(ParameterReference::File("templates/Data.txt".into()))
        );
        assert_eq!(ParameterReference::parse("plain").unwrap(), None);
    }

    #[test]
    fn kms_with_and_without_context() {
        assert_eq!(
            ParameterReference::parse("|kms|Q0lQSEVS").unwrap(),
            Some(ParameterReference::Kms {
                context: IndexMap::new(),
                ciphertext: "Q0lQSEVS".into()
            })
        );

        let Some(ParameterReference::Kms { context, ciphertext }) =
            ParameterReference::parse("|kms|app=web, env=prod|Q0lQSEVS").unwrap()
        else {
            panic!("expected kms reference");
        };
        assert_eq!(ciphertext, "Q0lQSEVS");
        assert_eq!(context.get("app").map(String::as_str), Some("web"));
        assert_eq!(context.get("env").map(String::as_str), Some("prod"));

        assert!(ParameterReference::parse("|kms|").is_err());
        assert!(ParameterReference::parse("|kms|novalue|abc").is_err());
    }

    #[test]
    fn template_values() {
        assert_eq!(
            TemplateValue::parse("|Ref|Subnet").unwrap(),
            Some(TemplateValue::Ref("Subnet".into()))
        );
        assert_eq!(
            TemplateValue::parse("|GetAtt|Elb|DNSName").unwrap(),
            Some(TemplateValue::GetAtt {
                resource: "Elb".into(),
                attribute: "DNSName".into()
            })
        );
        assert_eq!(TemplateValue::parse("no sentinel").unwrap(), None);
        assert!(TemplateValue::parse("|ref|").is_err());
        assert!(TemplateValue::parse("|getatt|Elb").is_err());
        assert!(TemplateValue::parse("|getatt|Elb|DNSName|x").is_err());
        assert!(TemplateValue::parse("|unknown|x").is_err());
    }

    #[test]
    fn template_keys() {
        assert_eq!(
            TemplateKey::parse("|join|").unwrap(),
            Some(TemplateKey::Join(String::new()))
        );
        assert_eq!(
            TemplateKey::parse("|JOIN|,").unwrap(),
            Some(TemplateKey::Join(",".into()))
        );
        assert_eq!(
            TemplateKey::parse("@TaupageUserData@").unwrap(),
            Some(TemplateKey::TaupageUserData)
        );
        assert_eq!(
            TemplateKey::parse("@yamluserdata@").unwrap(),
            Some(TemplateKey::YamlUserData)
        );
        assert_eq!(TemplateKey::parse("Properties").unwrap(), None);
        assert!(TemplateKey::parse("@Other@").is_err());
        assert!(TemplateKey::parse("|foo|").is_err());
    }
}
