//! Entry points used by command line frontends
use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestrator::{StackActionHandler, SyncOptions};
use crate::overrides::CliParameters;
use crate::services::{EncryptionContext, FileLoader, KeyService, Services};
use crate::template::{Template, TemplateFormat};
use crate::value::Value;
use base64::Engine;
use std::collections::HashSet;
use std::path::Path;

/// Creates or updates every stack of `config`
pub async fn sync(
    services: Services,
    config: Config,
    cli_parameters: CliParameters,
    suffix: Option<&str>,
    options: SyncOptions,
) -> Result<()> {
    let (config, cli_parameters) = apply_suffix(config, cli_parameters, suffix);
    StackActionHandler::new(config, services, cli_parameters, options)
        .create_or_update_stacks()
        .await
}

/// Deletes every stack of `config`, dependents first
pub async fn delete(
    services: Services,
    config: Config,
    suffix: Option<&str>,
    options: SyncOptions,
) -> Result<()> {
    let (config, cli_parameters) = apply_suffix(config, CliParameters::default(), suffix);
    StackActionHandler::new(config, services, cli_parameters, options)
        .delete_stacks()
        .await
}

pub fn apply_suffix(
    config: Config,
    cli_parameters: CliParameters,
    suffix: Option<&str>,
) -> (Config, CliParameters) {
    match suffix.filter(|suffix| !suffix.is_empty()) {
        Some(suffix) => {
            let managed: HashSet<String> = config.stacks.keys().cloned().collect();
            (
                config.with_suffix(suffix),
                cli_parameters.with_suffix(&managed, suffix),
            )
        }
        None => (config, cli_parameters),
    }
}

/// Converts a yaml file to json and a json file to yaml
pub fn convert(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("yml" | "yaml") => {
            let value: Value = serde_yaml::from_str(&contents)
                .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?;
            serde_json::to_string_pretty(&value).map_err(|e| Error::Generic(e.into()))
        }
        Some("json") => {
            let value: Value = serde_json::from_str(&contents)
                .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?;
            serde_yaml::to_string(&value).map_err(|e| Error::Generic(e.into()))
        }
        _ => Err(Error::invalid_config(format!(
            "{}: only .yml, .yaml and .json files can be converted",
            path.display()
        ))),
    }
}

/// Loads a template and returns it transformed, as pretty printed json
pub async fn render_template(
    loader: &dyn FileLoader,
    url: &str,
    working_dir: &Path,
) -> Result<String> {
    load_template(loader, url, working_dir).await?.to_pretty_json()
}

/// Transforms a template and lets the provider validate the result
pub async fn validate_template(services: &Services, url: &str, working_dir: &Path) -> Result<()> {
    let template = load_template(services.file_loader.as_ref(), url, working_dir).await?;
    services
        .provider
        .validate_template(&template.to_json()?)
        .await?;

    tracing::info!("Template {url} is valid");
    Ok(())
}

async fn load_template(loader: &dyn FileLoader, url: &str, working_dir: &Path) -> Result<Template> {
    let contents = loader.load(url, working_dir).await?;
    Template::parse(&contents, TemplateFormat::from_url(url))?.transform()
}

/// Encrypts `plaintext`, returns the base64 encoded ciphertext
pub async fn encrypt(
    key_service: &dyn KeyService,
    region: &str,
    key_id: &str,
    plaintext: &str,
    context: &EncryptionContext,
) -> Result<String> {
    let ciphertext = key_service
        .encrypt(region, key_id, plaintext.as_bytes(), context)
        .await?;
    Ok(base64::engine::general_purpose::STANDARD.encode(ciphertext))
}

pub async fn decrypt(
    key_service: &dyn KeyService,
    region: &str,
    ciphertext: &str,
    context: &EncryptionContext,
) -> Result<String> {
    let blob = base64::engine::general_purpose::STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| Error::InvalidEncryptedValue(format!("ciphertext is not base64: {e}")))?;

    let plaintext = key_service.decrypt(region, &blob, context).await?;
    String::from_utf8(plaintext)
        .map_err(|_| Error::InvalidEncryptedValue("plaintext is not valid utf-8".to_string()))
}
