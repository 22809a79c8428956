//! Parameter resolution
//!
//! Turns the parameter mapping of a stack entry into the flat `name -> string` mapping the
//! provider expects. Sentinel values are resolved against the outputs snapshot, the live stack,
//! the image catalog, the key service or the file loader. Command line overrides are applied last.
use crate::config::{ParameterValue, StackConfig};
use crate::error::{Error, Result};
use crate::overrides::CliParameters;
use crate::provider::OutputsSnapshot;
use crate::reference::{ParameterReference, StackOutputReference};
use crate::services::{latest_image, EncryptionContext, ImageFilter, Services};
use base64::Engine;
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use std::path::Path;

#[derive(derive_new::new)]
pub struct ParameterResolver<'a> {
    services: &'a Services,
    cli_parameters: &'a CliParameters,
    encryption_context: &'a EncryptionContext,
    working_dir: &'a Path,
}

/// Context of a single `resolve` call
struct Scope<'a> {
    stack_name: &'a str,
    region: &'a str,
    outputs: &'a OutputsSnapshot,
}

impl<'a> ParameterResolver<'a> {
    #[tracing::instrument(level = "debug", skip_all, fields(stack = stack_name))]
    pub async fn resolve(
        &self,
        stack_name: &str,
        stack: &StackConfig,
        region: &str,
        outputs: &OutputsSnapshot,
    ) -> Result<IndexMap<String, String>> {
        let scope = Scope {
            stack_name,
            region,
            outputs,
        };

        let mut resolved = IndexMap::with_capacity(stack.parameters.len());
        for (key, value) in &stack.parameters {
            let text = self.resolve_value(&scope, key, value).await?;
            resolved.insert(key.clone(), text);
        }

        for (key, value) in self.cli_parameters.for_stack(stack_name) {
            tracing::debug!(key, "parameter overridden on the command line");
            resolved.insert(key, value);
        }

        Ok(resolved)
    }

    fn resolve_value<'s>(
        &'s self,
        scope: &'s Scope<'s>,
        key: &'s str,
        value: &'s ParameterValue,
    ) -> BoxFuture<'s, Result<String>> {
        async move {
            let text: Result<String> = match value {
                ParameterValue::List(items) => {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in items {
                        parts.push(self.resolve_value(scope, key, item).await?);
                    }
                    Ok(parts.join(","))
                }
                ParameterValue::String(text) => self.resolve_string(scope, key, text).await,
                other => render_scalar(other).ok_or_else(|| {
                    Error::invalid_config(format!(
                        "stack {}: parameter {key} has an unsupported value {other:?}",
                        scope.stack_name
                    ))
                }),
            };
            text
        }
        .boxed()
    }

    async fn resolve_string(&self, scope: &Scope<'_>, key: &str, text: &str) -> Result<String> {
        let Some(reference) = ParameterReference::parse(text)? else {
            return Ok(text.to_string());
        };

        match reference {
            ParameterReference::StackOutput(reference) => stack_output(scope, &reference),
            ParameterReference::KeepOrUse(default) => {
                self.keep_or_use(scope.stack_name, key, default).await
            }
            ParameterReference::LatestTaupageAmi => self.latest_taupage_ami(scope.region).await,
            ParameterReference::Kms {
                context,
                ciphertext,
            } => self.decrypt(scope.region, &context, &ciphertext).await,
            ParameterReference::File(url) => {
                self.services.file_loader.load(&url, self.working_dir).await
            }
        }
    }

    async fn keep_or_use(&self, stack_name: &str, key: &str, default: String) -> Result<String> {
        let provider = &self.services.provider;
        if !provider.stack_exists(stack_name).await? {
            return Ok(default);
        }

        match provider.stack_parameters(stack_name).await?.shift_remove(key) {
            Some(current) => {
                tracing::debug!(key, "keeping current parameter value");
                Ok(current)
            }
            None => Ok(default),
        }
    }

    async fn latest_taupage_ami(&self, region: &str) -> Result<String> {
        let images = self
            .services
            .image_catalog
            .images(region, &ImageFilter::taupage())
            .await?;

        let image = latest_image(&images).ok_or_else(|| {
            Error::invalid_config(format!("no Taupage AMI found in region {region}"))
        })?;

        tracing::debug!(image_id = %image.image_id, name = %image.name, "latest Taupage AMI");
        Ok(image.image_id.clone())
    }

    async fn decrypt(
        &self,
        region: &str,
        inline_context: &EncryptionContext,
        ciphertext: &str,
    ) -> Result<String> {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| Error::InvalidEncryptedValue(format!("ciphertext is not base64: {e}")))?;

        let mut context = self.encryption_context.clone();
        context.extend(inline_context.iter().map(|(k, v)| (k.clone(), v.clone())));

        let plaintext = self
            .services
            .key_service
            .decrypt(region, &blob, &context)
            .await?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::InvalidEncryptedValue("plaintext is not valid utf-8".to_string()))
    }
}

fn stack_output(scope: &Scope<'_>, reference: &StackOutputReference) -> Result<String> {
    scope
        .outputs
        .get(&reference.stack)
        .and_then(|outputs| outputs.get(&reference.output))
        .cloned()
        .ok_or_else(|| {
            Error::stack_failed(
                scope.stack_name,
                format!("{reference} does not point to an existing stack output"),
            )
        })
}

/// Text for booleans and numbers, `None` for anything that is not a scalar
pub fn render_scalar(value: &ParameterValue) -> Option<String> {
    match value {
        ParameterValue::Bool(b) => Some(b.to_string()),
        ParameterValue::Int(i) => Some(i.to_string()),
        ParameterValue::Float(f) => Some(f.to_string()),
        ParameterValue::String(s) => Some(s.clone()),
        ParameterValue::List(_) | ParameterValue::Other(_) => None,
    }
}
